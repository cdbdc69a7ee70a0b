use super::progress::Spinner;
use super::{interruptible, Context};
use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use owo_colors::OwoColorize;
use watch_sync_core::{PushOutcomeKind, PushReport, PushRequest};
use watch_sync_models::{ContentFilter, PushMode};

pub async fn run_push(
    ctx: &Context,
    mode: Option<PushMode>,
    content: ContentFilter,
    dry_run: bool,
    pending_only: bool,
    output: &Output,
) -> Result<()> {
    tracing::debug!("Push command started");
    let config = ctx.load_config()?;
    let orchestrator = ctx.orchestrator(&config)?;
    let request = PushRequest {
        mode: mode.unwrap_or(config.sync.push_mode),
        filter: content,
        dry_run,
        pending_only,
    };

    let spinner = Spinner::start(format!("Pushing to Trakt ({})", request.mode), output);
    let result = interruptible(orchestrator.push(request)).await;
    spinner.finish();
    let report = result?;

    render(&report, ctx, output);
    output.report(&report);
    finish(&report)
}

/// Fails the command when any item failed, after everything else was reported.
pub(crate) fn finish(report: &PushReport) -> Result<()> {
    let failed = report.count(PushOutcomeKind::FailedTransient) + report.count(PushOutcomeKind::FailedPermanent);
    if failed > 0 {
        return Err(eyre!("{} item(s) could not be pushed", failed));
    }
    Ok(())
}

fn label(kind: PushOutcomeKind) -> String {
    let text = kind.as_str().replace('_', " ");
    match kind {
        PushOutcomeKind::Pushed => text.green().to_string(),
        PushOutcomeKind::SkippedAlreadyPresent => text.dimmed().to_string(),
        PushOutcomeKind::SkippedAmbiguousMatch | PushOutcomeKind::SkippedUnmatched => text.yellow().to_string(),
        PushOutcomeKind::FailedTransient | PushOutcomeKind::FailedPermanent => text.red().to_string(),
    }
}

pub(crate) fn render(report: &PushReport, ctx: &Context, output: &Output) {
    if !output.is_human() {
        return;
    }
    if report.dry_run {
        output.info("Dry run: nothing was sent to Trakt and no local state was changed");
    }

    for outcome in report.outcomes.iter().filter(|o| o.kind.is_failure()) {
        output.warn(format!(
            "{} [{}]: {}",
            outcome.title,
            label(outcome.kind),
            outcome.detail.as_deref().unwrap_or("-")
        ));
    }

    if report.outcomes.is_empty() {
        output.success("Nothing to push");
        return;
    }
    let summary = report
        .summary()
        .iter()
        .map(|(kind, n)| format!("{} {}", n, label(*kind)))
        .collect::<Vec<_>>()
        .join(", ");
    output.success(format!("{} items processed ({}): {}", report.outcomes.len(), report.mode, summary));

    let unmatched = report.count(PushOutcomeKind::SkippedUnmatched) + report.count(PushOutcomeKind::SkippedAmbiguousMatch);
    if unmatched > 0 && !report.dry_run {
        output.info(format!(
            "{} unmatched item(s) listed in {}",
            unmatched,
            ctx.paths().unmatched_file().display()
        ));
    }
}
