use super::progress::Spinner;
use super::{interruptible, Context};
use crate::output::Output;
use color_eyre::Result;
use watch_sync_core::DownloadReport;
use watch_sync_models::{ContentFilter, SyncMode};

pub async fn run_download(ctx: &Context, mode: Option<SyncMode>, content: ContentFilter, output: &Output) -> Result<()> {
    tracing::debug!("Download command started");
    let config = ctx.load_config()?;
    let orchestrator = ctx.orchestrator(&config)?;
    let mode = mode.unwrap_or(config.sync.mode);

    let spinner = Spinner::start(format!("Downloading watch history from Emby ({})", mode), output);
    let result = interruptible(orchestrator.download(mode, content)).await;
    spinner.finish();
    let report = result?;

    render(&report, output);
    output.report(&report);
    Ok(())
}

pub(crate) fn render(report: &DownloadReport, output: &Output) {
    if !output.is_human() {
        return;
    }
    if let Some(since) = report.since {
        output.info(format!("Changes since {}", since.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    output.success(format!(
        "Downloaded {} items: {} new, {} updated ({} in snapshot)",
        report.fetched, report.new_items, report.updated_items, report.snapshot_size
    ));
}
