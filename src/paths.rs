// src/paths.rs

//! Well-known file locations

use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

pub const PACMAN_LOG: &str = "/var/log/pacman.log";
pub const PACMAN_CACHE: &str = "/var/cache/pacman/pkg";

/// Every path sysman reads or writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub pipeline_file: PathBuf,
    pub checkpoint_file: PathBuf,
    pub package_list: PathBuf,
    pub service_list: PathBuf,
    /// Service list as of the last successful service sync
    pub service_list_synced: PathBuf,
    pub pacman_log: PathBuf,
    pub pacman_cache: PathBuf,
    pub aur_cache: PathBuf,
    /// Parent of the per-run caches used by `cache_rebuild` steps
    pub aur_rebuild_cache: PathBuf,
}

impl Paths {
    /// Locations for the current user
    pub fn discover() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| Error::ConfigMissing {
            path: PathBuf::from("$HOME"),
            hint: "Cannot determine the home directory".to_string(),
        })?;
        Ok(Self::from_home(&home))
    }

    /// Locations relative to `home`
    pub fn from_home(home: &Path) -> Self {
        let config_dir = home.join(".config").join("sysman");
        let cache_dir = home.join(".cache");
        Self {
            pipeline_file: config_dir.join("update_pipeline.json"),
            checkpoint_file: config_dir.join("tmp").join("timestamp"),
            package_list: config_dir.join("packages.json"),
            service_list: config_dir.join("services.json"),
            service_list_synced: config_dir.join("services.json.old"),
            config_dir,
            pacman_log: PathBuf::from(PACMAN_LOG),
            pacman_cache: PathBuf::from(PACMAN_CACHE),
            aur_cache: cache_dir.join("yay"),
            aur_rebuild_cache: cache_dir.join("yay-rebuild"),
        }
    }

    /// Move every configuration file under `dir`
    pub fn with_config_dir(self, dir: impl Into<PathBuf>) -> Self {
        let config_dir = dir.into();
        Self {
            pipeline_file: config_dir.join("update_pipeline.json"),
            checkpoint_file: config_dir.join("tmp").join("timestamp"),
            package_list: config_dir.join("packages.json"),
            service_list: config_dir.join("services.json"),
            service_list_synced: config_dir.join("services.json.old"),
            config_dir,
            ..self
        }
    }

    /// Rebuild cache of the run that started at `checkpoint`
    pub fn rebuild_cache_for(&self, checkpoint: &Checkpoint) -> PathBuf {
        self.aur_rebuild_cache.join(checkpoint.to_string())
    }
}
