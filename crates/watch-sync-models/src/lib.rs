pub mod external_ids;
pub mod identity;
pub mod media;
pub mod modes;
pub mod snapshot;
pub mod unmatched;
pub mod watch_history;

pub use external_ids::{ExternalIds, IdNamespace};
pub use identity::{AddWatchedResult, ClearSummary, HistoryEntry, Identity, IdentityKind, WatchedRecord};
pub use media::{ContentFilter, ItemKind};
pub use modes::{PushMode, SyncMode};
pub use snapshot::{SnapshotEntry, SyncSnapshot, UpsertOutcome};
pub use unmatched::{UnmatchReason, UnmatchedEntry, UnmatchedLedger};
pub use watch_history::WatchedItem;
