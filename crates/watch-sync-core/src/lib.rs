pub mod detect;
pub mod error;
pub mod push;
pub mod resolver;
pub mod retry;
pub mod status;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use detect::{detect_changes, ChangeSet};
pub use error::{Result, SyncError};
pub use push::{PushEngine, PushOutcome, PushOutcomeKind, PushReport, PushRun, PushSettings};
pub use resolver::{IdentityResolver, MatchResult};
pub use retry::RetryPolicy;
pub use status::{load_status, KindCounts, StatusSummary};
pub use store::{LedgerStore, SnapshotStore};
pub use sync::{DownloadReport, PushRequest, ServiceCheck, SyncOrchestrator, SyncReport, ValidationReport};
