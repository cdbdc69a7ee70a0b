use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use watch_sync_models::{SyncSnapshot, UnmatchedLedger};

use crate::error::{Result, SyncError};

/// Serializes `value` as pretty JSON and replaces `path` atomically.
///
/// The data is written to a sibling temp file and flushed before the rename, so
/// readers see either the old or the new content.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SyncError::storage(parent, e))?;
    }
    let json = serde_json::to_vec_pretty(value).map_err(|e| SyncError::storage(path, e))?;

    let tmp_path = path.with_extension("json.tmp");
    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    };
    if let Err(e) = write() {
        let _ = fs::remove_file(&tmp_path);
        return Err(SyncError::storage(path, e));
    }
    debug!(path = %path.display(), bytes = json.len(), "Saved state file");
    Ok(())
}

enum ReadError {
    Io(std::io::Error),
    Corrupt(serde_json::Error),
}

fn read_json<T: DeserializeOwned>(path: &Path) -> std::result::Result<Option<T>, ReadError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ReadError::Io(e)),
    };
    serde_json::from_str(&content).map(Some).map_err(ReadError::Corrupt)
}

/// Persists the watch-history snapshot.
///
/// There is no cross-process locking: concurrent invocations against the same
/// data directory must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empty snapshot when none exists yet. A present but unreadable file is an
    /// error and is left untouched.
    pub fn load(&self) -> Result<SyncSnapshot> {
        match read_json(&self.path) {
            Ok(snapshot) => Ok(snapshot.unwrap_or_default()),
            Err(ReadError::Io(e)) => Err(SyncError::storage(&self.path, e)),
            Err(ReadError::Corrupt(e)) => Err(SyncError::storage(&self.path, format!("unreadable snapshot: {}", e))),
        }
    }

    pub fn save(&self, snapshot: &SyncSnapshot) -> Result<()> {
        write_json_atomic(&self.path, snapshot)
    }
}

/// Persists the unmatched-items report.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last written ledger. A corrupt file reads as absent since the
    /// ledger is rebuilt by every push run anyway.
    pub fn load(&self) -> Result<Option<UnmatchedLedger>> {
        match read_json(&self.path) {
            Ok(ledger) => Ok(ledger),
            Err(ReadError::Io(e)) => Err(SyncError::storage(&self.path, e)),
            Err(ReadError::Corrupt(e)) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt unmatched ledger");
                Ok(None)
            }
        }
    }

    pub fn save(&self, ledger: &UnmatchedLedger) -> Result<()> {
        write_json_atomic(&self.path, ledger)
    }
}
