use super::Context;
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;

pub async fn run_validate(ctx: &Context, output: &Output) -> Result<()> {
    let config = ctx.load_config()?;
    output.success(format!("Configuration OK: {}", ctx.paths().config_file().display()));

    let orchestrator = ctx.orchestrator(&config)?;
    let report = orchestrator.validate().await;

    for check in &report.checks {
        match &check.error {
            None => output.success(format!("{} ({}): connected", check.service, check.role)),
            Some(error) => output.error(format!("{} ({}): {}", check.service, check.role, error)),
        }
    }
    output.report(&report);

    if !report.all_ok() {
        return Err(eyre!("Credential check failed"));
    }
    Ok(())
}
