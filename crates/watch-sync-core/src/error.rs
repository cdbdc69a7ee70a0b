use std::path::PathBuf;
use thiserror::Error;
use watch_sync_sources::SourceError;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Credentials were refused. Aborts the run.
    #[error("{service} rejected the configured credentials: {message}")]
    Auth { service: String, message: String },

    /// Snapshot or ledger could not be read or written. Aborts the run.
    #[error("local storage error at {}: {message}", path.display())]
    Storage { path: PathBuf, message: String },

    #[error("{service} request failed: {source}")]
    Remote {
        service: String,
        #[source]
        source: SourceError,
    },
}

impl SyncError {
    pub fn storage(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        SyncError::Storage {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Wraps a client error, promoting authentication failures.
    pub fn remote(service: &str, err: SourceError) -> Self {
        match err {
            SourceError::Auth(message) => SyncError::Auth {
                service: service.to_string(),
                message,
            },
            source => SyncError::Remote {
                service: service.to_string(),
                source,
            },
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, SyncError::Auth { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
