// src/update.rs

//! System update and rollback
//!
//! `run` marks a checkpoint and executes the configured pipeline. `rollback`
//! reads the checkpoint, reconstructs what pacman did since then, undoes it
//! and marks a fresh checkpoint.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::Result;
use crate::paths::Paths;
use crate::pipeline::{self, PipelineConfig};
use crate::rollback::{CacheRoot, CacheSet, ResolvedRollback, RollbackCommands, RollbackPlan};
use crate::transaction::{self, NetTally};
use tracing::info;

/// Run the configured update pipeline
///
/// The pipeline is validated before the checkpoint is written, so a missing
/// or broken pipeline file leaves the previous checkpoint in place.
pub fn run(paths: &Paths) -> Result<Checkpoint> {
    let config = PipelineConfig::load(&paths.pipeline_file)?;

    let checkpoint = Checkpoint::now();
    let steps = config.to_steps(&paths.rebuild_cache_for(&checkpoint))?;

    CheckpointStore::new(&paths.checkpoint_file).write(&checkpoint)?;
    info!("Starting update at {} ({} step(s))", checkpoint, steps.len());

    pipeline::run(&steps)?;
    Ok(checkpoint)
}

/// A computed but not yet executed rollback
#[derive(Debug, Clone)]
pub struct RollbackPreview {
    pub checkpoint: Checkpoint,
    pub plan: RollbackPlan,
    pub resolved: ResolvedRollback,
}

impl RollbackPreview {
    /// Targets with no cached package, which the rollback cannot restore
    pub fn unresolved(&self) -> usize {
        let wanted = self.plan.to_downgrade.len()
            + self.plan.to_reinstall_removed.len()
            + self.plan.to_rebuild.len();
        let found = self.resolved.downgrade.len()
            + self.resolved.reinstall_removed.len()
            + self.resolved.rebuild.len();
        wanted.saturating_sub(found)
    }
}

/// Compute what a rollback to the last checkpoint would do
///
/// Read-only: nothing is executed and no checkpoint is written.
pub fn plan_rollback(paths: &Paths) -> Result<RollbackPreview> {
    let checkpoint = CheckpointStore::new(&paths.checkpoint_file).read()?;
    info!("Planning rollback to {}", checkpoint);

    let events = transaction::read_events(&paths.pacman_log, checkpoint.instant())?;
    let tally = NetTally::from_events(&events);
    let plan = RollbackPlan::build(&events, &tally);

    // The AUR helper keeps one build directory per package
    let caches = CacheSet::scan(&[
        CacheRoot::flat(&paths.pacman_cache),
        CacheRoot::nested(&paths.aur_cache, 1),
    ])?;
    let rebuild_root = paths.rebuild_cache_for(&checkpoint);
    let rebuild_cache = CacheSet::scan(&[CacheRoot::recursive(&rebuild_root)])?;
    let resolved = plan.resolve(&caches, &rebuild_cache);

    Ok(RollbackPreview {
        checkpoint,
        plan,
        resolved,
    })
}

/// Execute a previewed rollback, then mark a fresh checkpoint
///
/// A failing step aborts before the checkpoint is touched, so the rollback
/// can be retried from the same boundary.
pub fn execute_rollback(
    paths: &Paths,
    preview: RollbackPreview,
    commands: &RollbackCommands,
) -> Result<Checkpoint> {
    let steps = preview.resolved.into_steps(commands);
    info!("Rolling back to {} ({} step(s))", preview.checkpoint, steps.len());

    pipeline::run(&steps)?;

    let checkpoint = CheckpointStore::new(&paths.checkpoint_file).mark_now()?;
    info!("Rollback complete, new checkpoint {}", checkpoint);
    Ok(checkpoint)
}

/// Plan and execute a rollback in one go
pub fn rollback(paths: &Paths, commands: &RollbackCommands) -> Result<Checkpoint> {
    let preview = plan_rollback(paths)?;
    execute_rollback(paths, preview, commands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::fs;
    use tempfile::tempdir;

    fn test_paths(root: &std::path::Path) -> Paths {
        let mut paths = Paths::from_home(root);
        paths.pacman_log = root.join("pacman.log");
        paths.pacman_cache = root.join("pacman-cache");
        paths
    }

    #[test]
    fn test_run_without_pipeline_writes_no_checkpoint() {
        let dir = tempdir().unwrap();
        let paths = test_paths(dir.path());

        assert!(matches!(run(&paths), Err(Error::ConfigMissing { .. })));
        assert!(!paths.checkpoint_file.exists());
    }

    #[test]
    fn test_run_with_invalid_pipeline_writes_no_checkpoint() {
        let dir = tempdir().unwrap();
        let paths = test_paths(dir.path());
        pipeline::config::generate(&paths.pipeline_file).unwrap();

        assert!(matches!(run(&paths), Err(Error::InvalidStep(_))));
        assert!(!paths.checkpoint_file.exists());
    }

    #[test]
    fn test_run_marks_checkpoint_before_steps() {
        let dir = tempdir().unwrap();
        let paths = test_paths(dir.path());
        fs::create_dir_all(&paths.config_dir).unwrap();
        fs::write(
            &paths.pipeline_file,
            r#"[{"command": "true", "special_env": ""}, {"command": "false", "special_env": ""}]"#,
        )
        .unwrap();

        assert!(matches!(run(&paths), Err(Error::StepFailed { .. })));
        assert!(paths.checkpoint_file.exists());
    }

    #[test]
    fn test_preview_counts_uncached_targets() {
        let dir = tempdir().unwrap();
        let paths = test_paths(dir.path());
        fs::write(
            &paths.pacman_log,
            "[2024-05-01T10:01:00+0000] [ALPM] upgraded a (1.0-1 -> 2.0-1)\n\
             [2024-05-01T10:01:01+0000] [ALPM] removed c (3.0-1)\n",
        )
        .unwrap();
        CheckpointStore::new(&paths.checkpoint_file)
            .write(&"2024-05-01T10:00:00+00:00".parse().unwrap())
            .unwrap();

        let preview = plan_rollback(&paths).unwrap();
        assert!(!preview.plan.is_empty());
        assert!(preview.resolved.is_empty());
        assert_eq!(preview.unresolved(), 2);
    }

    #[test]
    fn test_rollback_without_checkpoint() {
        let dir = tempdir().unwrap();
        let paths = test_paths(dir.path());
        assert!(matches!(
            rollback(&paths, &RollbackCommands::default()),
            Err(Error::ConfigMissing { .. })
        ));
    }
}
