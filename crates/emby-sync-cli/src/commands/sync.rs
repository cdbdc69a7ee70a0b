use super::progress::Spinner;
use super::{download, interruptible, push, Context};
use crate::output::Output;
use color_eyre::Result;
use watch_sync_core::PushRequest;
use watch_sync_models::{ContentFilter, PushMode, SyncMode};

pub async fn run_sync(
    ctx: &Context,
    mode: Option<SyncMode>,
    push_mode: Option<PushMode>,
    content: ContentFilter,
    dry_run: bool,
    output: &Output,
) -> Result<()> {
    tracing::debug!("Sync command started");
    let config = ctx.load_config()?;
    let orchestrator = ctx.orchestrator(&config)?;
    let mode = mode.unwrap_or(config.sync.mode);
    let request = PushRequest {
        mode: push_mode.unwrap_or(config.sync.push_mode),
        filter: content,
        dry_run,
        pending_only: true,
    };

    let spinner = Spinner::start(format!("Syncing Emby to Trakt ({} download, {} push)", mode, request.mode), output);
    let result = interruptible(orchestrator.sync(mode, request)).await;
    spinner.finish();
    let report = result?;

    download::render(&report.download, output);
    push::render(&report.push, ctx, output);
    output.report(&report);
    push::finish(&report.push)
}
