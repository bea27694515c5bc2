// src/checkpoint.rs

//! Update checkpoint
//!
//! A single timestamp marking the start of the last update run (or the end
//! of the last rollback). Everything the pacman log records at or after it is
//! what a rollback undoes.

use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, Local, SecondsFormat, SubsecRound};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::debug;

/// A point in time with second precision and a UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checkpoint(DateTime<FixedOffset>);

impl Checkpoint {
    /// The current local time, sub-second part discarded
    pub fn now() -> Self {
        Self(Local::now().trunc_subsecs(0).into())
    }

    pub fn from_datetime(instant: DateTime<FixedOffset>) -> Self {
        Self(instant.trunc_subsecs(0))
    }

    pub fn instant(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Secs, false))
    }
}

impl FromStr for Checkpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(s.trim())
            .map(Self::from_datetime)
            .map_err(|e| Error::InvalidCheckpoint(format!("'{}': {}", s.trim(), e)))
    }
}

/// File-backed checkpoint storage
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the stored checkpoint
    pub fn read(&self) -> Result<Checkpoint> {
        if !self.exists() {
            return Err(Error::ConfigMissing {
                path: self.path.clone(),
                hint: "No update performed on this system yet".to_string(),
            });
        }

        let content = fs::read_to_string(&self.path)?;
        let first_line = content.lines().next().unwrap_or_default();
        let checkpoint: Checkpoint = first_line.parse()?;
        debug!("Read checkpoint {} from {}", checkpoint, self.path.display());
        Ok(checkpoint)
    }

    /// Replace the stored checkpoint atomically
    pub fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(checkpoint.to_string().as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        debug!("Wrote checkpoint {} to {}", checkpoint, self.path.display());
        Ok(())
    }

    /// Write and return a fresh checkpoint
    pub fn mark_now(&self) -> Result<Checkpoint> {
        let checkpoint = Checkpoint::now();
        self.write(&checkpoint)?;
        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_display_has_second_precision_and_offset() {
        let checkpoint: Checkpoint = "2024-05-01T10:00:00.987654+02:00".parse().unwrap();
        assert_eq!(checkpoint.to_string(), "2024-05-01T10:00:00+02:00");

        let utc: Checkpoint = "2024-05-01T08:00:00Z".parse().unwrap();
        assert_eq!(utc.to_string(), "2024-05-01T08:00:00+00:00");
    }

    #[test]
    fn test_now_is_truncated() {
        let now = Checkpoint::now();
        assert_eq!(now.instant().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_round_trip_discards_subseconds() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("tmp/timestamp"));

        let instant = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.999+02:00").unwrap();
        store.write(&Checkpoint::from_datetime(instant)).unwrap();

        let read = store.read().unwrap();
        assert_eq!(
            read.instant(),
            DateTime::parse_from_rfc3339("2024-05-01T10:00:00+02:00").unwrap()
        );
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "2024-05-01T10:00:00+02:00"
        );
    }

    #[test]
    fn test_write_replaces_previous_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("timestamp"));

        store.write(&"2024-01-01T00:00:00+00:00".parse().unwrap()).unwrap();
        let written = store.mark_now().unwrap();
        assert_eq!(store.read().unwrap(), written);
    }

    #[test]
    fn test_read_missing_checkpoint() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("timestamp"));
        assert!(matches!(store.read(), Err(Error::ConfigMissing { .. })));
    }

    #[test]
    fn test_read_garbage_checkpoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("timestamp");
        fs::write(&path, "yesterday\n").unwrap();
        assert!(matches!(
            CheckpointStore::new(path).read(),
            Err(Error::InvalidCheckpoint(_))
        ));
    }
}
