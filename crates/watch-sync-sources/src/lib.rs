pub mod emby;
pub mod error;
pub mod traits;
pub mod trakt;

pub use emby::EmbyClient;
pub use error::SourceError;
pub use traits::{WatchDestination, WatchSource};
pub use trakt::TraktClient;
