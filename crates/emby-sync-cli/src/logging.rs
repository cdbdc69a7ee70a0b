use anyhow::Result;
use std::io;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter directive for a verbosity level.
///
/// 0 = info, 1 = debug with hyper connection chatter suppressed, 2+ = trace.
fn default_directive(verbose_level: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose_level {
        0 => "info",
        1 => "debug,hyper::proto::h1=warn,hyper::client::pool=warn,rustls=info",
        _ => "trace",
    }
}

/// Splits `logs/emby-sync.log` into the directory and the rotation prefix `emby-sync`.
fn rotation_parts(log_path: &Path) -> Result<(PathBuf, String)> {
    let dir = match log_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = log_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid log filename: {}", log_path.display()))?;
    let prefix = file_name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file_name);
    Ok((dir, prefix.to_string()))
}

pub fn init_logging(verbose_level: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    // Quiet always wins; otherwise RUST_LOG overrides the -v default.
    let directive = default_directive(verbose_level, quiet);
    let filter = if quiet {
        EnvFilter::new(directive)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive))
    };

    let json = std::env::var("RUST_LOG_JSON")
        .map(|v| v == "true")
        .unwrap_or_else(|_| !io::stdout().is_terminal());

    let registry = Registry::default().with(filter);

    if let Some(log_path) = log_file {
        let (log_dir, prefix) = rotation_parts(&log_path)?;
        std::fs::create_dir_all(&log_dir)?;
        // emby-sync.2026-01-17 etc.
        let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, prefix);

        if json {
            let json_layer = fmt::layer()
                .json()
                .with_timer(ChronoUtc::rfc_3339())
                .with_writer(file_appender);
            registry.with(json_layer).try_init()?;
        } else {
            let fmt_layer = fmt::layer()
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false)
                .with_writer(file_appender);
            registry.with(fmt_layer).try_init()?;
        }
    } else if json {
        let json_layer = fmt::layer()
            .json()
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(io::stderr);
        registry.with(json_layer).try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(io::stderr);
        registry.with(fmt_layer).try_init()?;
    }

    Ok(())
}
