pub mod config;
pub mod paths;

pub use config::{Config, EmbyConfig, PushOptions, SyncOptions, TraktConfig};
pub use paths::PathManager;
