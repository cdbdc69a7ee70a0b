use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    Movie,
    Show,
    Episode,
}

/// A destination-side catalogue entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Identity {
    pub kind: IdentityKind,
    /// Destination-native numeric id.
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<u32>,
}

impl Identity {
    pub fn new(kind: IdentityKind, id: u64) -> Self {
        Self {
            kind,
            id,
            title: None,
            year: None,
        }
    }

    pub fn titled(mut self, title: impl Into<String>, year: Option<u32>) -> Self {
        self.title = Some(title.into());
        self.year = year;
        self
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            IdentityKind::Movie => "movie",
            IdentityKind::Show => "show",
            IdentityKind::Episode => "episode",
        };
        write!(f, "{}#{}", kind, self.id)
    }
}

/// Watched state the destination already holds for one identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WatchedRecord {
    pub plays: u32,
    /// Individual watch timestamps, second precision.
    pub watched_at: Vec<DateTime<Utc>>,
}

impl WatchedRecord {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let secs = at.timestamp();
        self.watched_at.iter().any(|t| t.timestamp() == secs)
    }
}

/// One watch event to submit to the destination.
///
/// `plays > 1` submits that many events at the same timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub identity: Identity,
    pub watched_at: Option<DateTime<Utc>>,
    pub plays: u32,
}

/// Result of a history submission. Anything not listed was accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AddWatchedResult {
    pub added: usize,
    #[serde(default)]
    pub not_found: Vec<Identity>,
}

/// Result of a destination history wipe.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClearSummary {
    pub movies_removed: usize,
    pub episodes_removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_contains_compares_whole_seconds() {
        let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let record = WatchedRecord {
            plays: 1,
            watched_at: vec![base],
        };
        assert!(record.contains(Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap()));
        assert!(!record.contains(Utc.timestamp_opt(1_700_000_001, 0).unwrap()));
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::new(IdentityKind::Show, 1388).to_string(), "show#1388");
    }
}
