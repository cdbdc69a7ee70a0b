use super::progress::Spinner;
use super::{interruptible, Context};
use crate::output::Output;
use color_eyre::Result;

pub async fn run_clear(ctx: &Context, yes: bool, output: &Output) -> Result<()> {
    if !yes {
        output.warn("This removes every watched movie and show from your Trakt history.");
        output.info("Re-run with --yes to confirm: emby-sync clear --yes");
        return Ok(());
    }

    let config = ctx.load_config()?;
    let orchestrator = ctx.orchestrator(&config)?;

    let spinner = Spinner::start("Clearing Trakt watch history", output);
    let result = interruptible(orchestrator.clear_destination()).await;
    spinner.finish();
    let summary = result?;

    output.success(format!(
        "Removed {} movie(s) and {} episode(s) from Trakt history",
        summary.movies_removed, summary.episodes_removed
    ));
    output.report(&summary);
    Ok(())
}
