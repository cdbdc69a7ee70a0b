pub mod clear;
pub mod config;
pub mod download;
pub mod progress;
pub mod push;
pub mod status;
pub mod sync;
pub mod validate;

use color_eyre::eyre::{eyre, Report};
use color_eyre::Result;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use watch_sync_config::{Config, PathManager};
use watch_sync_core::{LedgerStore, PushSettings, SnapshotStore, SyncError, SyncOrchestrator};
use watch_sync_sources::{EmbyClient, TraktClient};

/// Paths and config shared by every command.
pub struct Context {
    paths: PathManager,
}

impl Context {
    pub fn new(data_dir: Option<PathBuf>) -> Result<Self> {
        let paths = match data_dir {
            Some(dir) => PathManager::from_base(dir),
            None => PathManager::new().map_err(|e| eyre!("{}", e))?,
        };
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &PathManager {
        &self.paths
    }

    pub fn snapshot_store(&self) -> SnapshotStore {
        SnapshotStore::new(self.paths.snapshot_file())
    }

    pub fn ledger_store(&self) -> LedgerStore {
        LedgerStore::new(self.paths.unmatched_file())
    }

    /// Reads config.toml without checking it.
    pub fn read_config(&self) -> Result<Config> {
        let path = self.paths.config_file();
        if !path.exists() {
            return Err(eyre!(
                "No configuration found at {}. Create it with your Emby and Trakt credentials.",
                path.display()
            ));
        }
        Config::load_from_file(&path).map_err(|e| eyre!("Failed to load config from {}: {:#}", path.display(), e))
    }

    pub fn load_config(&self) -> Result<Config> {
        let config = self.read_config()?;
        config
            .validate()
            .map_err(|e| eyre!("Invalid configuration in {}: {}", self.paths.config_file().display(), e))?;
        Ok(config)
    }

    pub fn orchestrator(&self, config: &Config) -> Result<SyncOrchestrator> {
        self.paths
            .ensure_directories()
            .map_err(|e| eyre!("Failed to create data directory {}: {}", self.paths.data_dir().display(), e))?;

        let timeout = config.push.request_timeout();
        let source = EmbyClient::new(&config.emby, config.sync.include_partial, timeout)
            .map_err(|e| eyre!("Failed to create Emby client: {}", e))?;
        let destination =
            TraktClient::new(&config.trakt, timeout).map_err(|e| eyre!("Failed to create Trakt client: {}", e))?;

        Ok(SyncOrchestrator::new(
            Arc::new(source),
            Arc::new(destination),
            self.snapshot_store(),
            self.ledger_store(),
            PushSettings::from_options(&config.push),
        ))
    }
}

/// Runs `operation` until it finishes or Ctrl-C is pressed.
///
/// State files are only replaced at the end of an operation, so an interrupted
/// run leaves the last saved snapshot in place.
pub async fn interruptible<T>(operation: impl Future<Output = watch_sync_core::Result<T>>) -> Result<T> {
    tokio::select! {
        result = operation => result.map_err(explain),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(operation = "interrupt", "Interrupted by user");
            Err(eyre!("Interrupted; local state is unchanged since the last completed step"))
        }
    }
}

fn explain(err: SyncError) -> Report {
    match err {
        SyncError::Auth { .. } => Report::new(err).wrap_err("Authentication failed; check the tokens in config.toml"),
        SyncError::Storage { .. } => Report::new(err).wrap_err("Local state could not be read or written"),
        SyncError::Remote { .. } => Report::new(err),
    }
}
