use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a download compares against the stored snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Fetch everything and treat every item as changed.
    Full,
    /// Fetch items modified since the last checkpoint and keep only newer ones.
    #[default]
    Incremental,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Full => f.write_str("full"),
            SyncMode::Incremental => f.write_str("incremental"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(SyncMode::Full),
            "incremental" => Ok(SyncMode::Incremental),
            other => Err(format!("unknown sync mode '{}'", other)),
        }
    }
}

/// Conflict policy applied when the destination may already hold a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PushMode {
    /// Leave any existing destination record untouched.
    #[default]
    Skip,
    /// Replace the destination record with local state.
    Overwrite,
    /// Add the local watch event unless that timestamp is already recorded.
    Merge,
}

impl fmt::Display for PushMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushMode::Skip => f.write_str("skip"),
            PushMode::Overwrite => f.write_str("overwrite"),
            PushMode::Merge => f.write_str("merge"),
        }
    }
}

impl FromStr for PushMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(PushMode::Skip),
            "overwrite" => Ok(PushMode::Overwrite),
            "merge" => Ok(PushMode::Merge),
            other => Err(format!("unknown push mode '{}'", other)),
        }
    }
}
