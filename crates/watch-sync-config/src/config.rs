use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use watch_sync_models::{PushMode, SyncMode};

const PLACEHOLDERS: [&str; 4] = ["YOUR_CLIENT_ID", "YOUR_CLIENT_SECRET", "YOUR_ACCESS_TOKEN", "YOUR_API_KEY"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub emby: EmbyConfig,
    pub trakt: TraktConfig,
    #[serde(default)]
    pub sync: SyncOptions,
    #[serde(default)]
    pub push: PushOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbyConfig {
    pub server_url: String,
    pub user_id: String,
    pub access_token: String,
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraktConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub access_token: String,
    #[serde(default = "default_trakt_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOptions {
    #[serde(default)]
    pub mode: SyncMode,
    #[serde(default)]
    pub push_mode: PushMode,
    /// Also download items that are only partially watched.
    #[serde(default)]
    pub include_partial: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            mode: SyncMode::Incremental,
            push_mode: PushMode::Skip,
            include_partial: false,
        }
    }
}

/// Destination write tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushOptions {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Minimum gap between write requests when the destination takes one item per call.
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_lookup_concurrency")]
    pub lookup_concurrency: usize,
    /// Rate-limit pauses allowed per request. A request still rate limited
    /// after this many pauses fails its items as transient, to be retried on
    /// the next run.
    #[serde(default = "default_max_rate_limit_pauses")]
    pub max_rate_limit_pauses: u32,
    #[serde(default = "default_year_tolerance")]
    pub year_tolerance: u32,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_interval_ms: default_request_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            lookup_concurrency: default_lookup_concurrency(),
            max_rate_limit_pauses: default_max_rate_limit_pauses(),
            year_tolerance: default_year_tolerance(),
        }
    }
}

impl PushOptions {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_device_id() -> String {
    "emby-sync".to_string()
}

fn default_trakt_base_url() -> String {
    "https://api.trakt.tv".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_request_interval_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_lookup_concurrency() -> usize {
    4
}

fn default_max_rate_limit_pauses() -> u32 {
    10
}

fn default_year_tolerance() -> u32 {
    1
}

fn is_unset(value: &str) -> bool {
    value.trim().is_empty() || PLACEHOLDERS.contains(&value)
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if is_unset(&self.emby.server_url) {
            return Err(anyhow::anyhow!("emby.server_url is not configured"));
        }
        if !self.emby.server_url.starts_with("http://") && !self.emby.server_url.starts_with("https://") {
            return Err(anyhow::anyhow!("emby.server_url must start with http:// or https://"));
        }
        if is_unset(&self.emby.user_id) {
            return Err(anyhow::anyhow!("emby.user_id is not configured"));
        }
        if is_unset(&self.emby.access_token) {
            return Err(anyhow::anyhow!("emby.access_token is not configured"));
        }
        if is_unset(&self.trakt.client_id) {
            return Err(anyhow::anyhow!("trakt.client_id is not configured"));
        }
        if is_unset(&self.trakt.access_token) {
            return Err(anyhow::anyhow!("trakt.access_token is not configured"));
        }

        let push = &self.push;
        if push.batch_size == 0 {
            return Err(anyhow::anyhow!("push.batch_size must be at least 1"));
        }
        if push.max_attempts == 0 {
            return Err(anyhow::anyhow!("push.max_attempts must be at least 1"));
        }
        if push.lookup_concurrency == 0 {
            return Err(anyhow::anyhow!("push.lookup_concurrency must be at least 1"));
        }
        if push.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("push.request_timeout_secs must be at least 1"));
        }
        if push.max_backoff_ms < push.initial_backoff_ms {
            return Err(anyhow::anyhow!("push.max_backoff_ms must not be below push.initial_backoff_ms"));
        }

        Ok(())
    }

    /// Copy of the config with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.emby.access_token = mask(&copy.emby.access_token);
        copy.trakt.client_secret = mask(&copy.trakt.client_secret);
        copy.trakt.access_token = mask(&copy.trakt.access_token);
        copy
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}
