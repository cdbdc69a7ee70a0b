use anyhow::Result;
use std::path::{Path, PathBuf};

pub struct PathManager {
    config_dir: PathBuf,
    data_dir: PathBuf,
    log_dir: PathBuf,
}

impl PathManager {
    /// Platform default, e.g. `~/.config/emby-sync` on Linux.
    pub fn new() -> Result<Self> {
        let base_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("emby-sync");
        Ok(Self::from_base(base_dir))
    }

    /// Everything under one directory: config at the top, logs in a subdirectory.
    pub fn from_base(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            config_dir: base.clone(),
            data_dir: base.clone(),
            log_dir: base.join("logs"),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn snapshot_file(&self) -> PathBuf {
        self.data_dir.join("watched.json")
    }

    pub fn unmatched_file(&self) -> PathBuf {
        self.data_dir.join("unmatched.json")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join("emby-sync.log")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}
