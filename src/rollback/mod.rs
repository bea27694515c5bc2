// src/rollback/mod.rs

//! Rollback planning
//!
//! Reconstructs what changed since the last checkpoint from the pacman log
//! and derives the commands that undo it. The plan has four buckets which are
//! always executed in this order:
//!
//! 1. reinstall the pre-upgrade version of every upgraded package
//! 2. remove packages that were freshly installed
//! 3. reinstall packages that were genuinely removed
//! 4. reinstall the artifacts produced by rebuilds during the run
//!
//! Old binaries go back first so removals do not leave dependents broken,
//! removals precede reinstalls to avoid version conflicts, and rebuilt
//! packages come last once the rest of the tree is consistent again.

pub mod cache;

pub use cache::{CacheRoot, CacheSet};

use crate::pipeline::PipelineStep;
use crate::transaction::{Change, NetTally, TransactionEvent};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

/// A package and the version it should be restored to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackTarget {
    pub package: String,
    pub version: String,
}

impl RollbackTarget {
    pub fn new(package: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for RollbackTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.package, self.version)
    }
}

/// Undo operations derived from the log window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackPlan {
    /// Upgraded packages, with their pre-upgrade version
    pub to_downgrade: Vec<RollbackTarget>,
    /// Net freshly installed packages, with the installed version
    pub to_remove: Vec<RollbackTarget>,
    /// Genuinely removed packages, with the version they had
    pub to_reinstall_removed: Vec<RollbackTarget>,
    /// Packages rebuilt during the run, with the rebuilt version
    pub to_rebuild: Vec<RollbackTarget>,
}

impl RollbackPlan {
    /// Derive the plan from chronologically ordered events
    ///
    /// Every bucket keeps one entry per package; the earliest event decides
    /// the recorded version.
    pub fn build(events: &[TransactionEvent], tally: &NetTally) -> Self {
        let to_downgrade = first_per_package(events, |event| match &event.change {
            Change::Upgraded { .. } => event.change.previous_version(),
            _ => None,
        });

        let to_remove = first_per_package(events, |event| match &event.change {
            Change::Installed { .. } if tally.is_net_installed(&event.package) => {
                event.change.resulting_version()
            }
            _ => None,
        });

        // A removal cancelled by a later install, or one that is part of an
        // upgrade replacement, is not undone here.
        let downgraded: HashSet<&str> = to_downgrade.iter().map(|t| t.package.as_str()).collect();
        let to_reinstall_removed = first_per_package(events, |event| match &event.change {
            Change::Removed { .. }
                if tally.is_net_removed(&event.package)
                    && !downgraded.contains(event.package.as_str()) =>
            {
                event.change.previous_version()
            }
            _ => None,
        });

        let to_rebuild = first_per_package(events, |event| match &event.change {
            Change::Reinstalled { .. } => event.change.previous_version(),
            _ => None,
        });

        let plan = Self {
            to_downgrade,
            to_remove,
            to_reinstall_removed,
            to_rebuild,
        };
        debug!("Rollback plan: {:?}", plan);
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.to_downgrade.is_empty()
            && self.to_remove.is_empty()
            && self.to_reinstall_removed.is_empty()
            && self.to_rebuild.is_empty()
    }

    /// Turn targets into concrete package files
    ///
    /// Downgrades and removed packages are looked up in `caches`, rebuilt
    /// packages only in `rebuild_cache`. Removals need bare names only.
    pub fn resolve(&self, caches: &CacheSet, rebuild_cache: &CacheSet) -> ResolvedRollback {
        let resolved = ResolvedRollback {
            downgrade: caches.resolve_all(&self.to_downgrade),
            remove: self.to_remove.iter().map(|t| t.package.clone()).collect(),
            reinstall_removed: caches.resolve_all(&self.to_reinstall_removed),
            rebuild: rebuild_cache.resolve_all(&self.to_rebuild),
        };
        info!(
            "Resolved rollback: {} downgrade(s), {} removal(s), {} reinstall(s), {} rebuild(s)",
            resolved.downgrade.len(),
            resolved.remove.len(),
            resolved.reinstall_removed.len(),
            resolved.rebuild.len()
        );
        resolved
    }
}

/// Collect one target per package from the events `select` accepts
fn first_per_package<'a, F>(events: &'a [TransactionEvent], mut select: F) -> Vec<RollbackTarget>
where
    F: FnMut(&'a TransactionEvent) -> Option<&'a str>,
{
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for event in events {
        let Some(version) = select(event) else {
            continue;
        };
        if seen.insert(event.package.as_str()) {
            targets.push(RollbackTarget::new(event.package.as_str(), version));
        }
    }
    targets
}

/// Command prefixes used to undo changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackCommands {
    /// Installs package files given as trailing arguments
    pub install: Vec<String>,
    /// Removes packages given by name as trailing arguments
    pub remove: Vec<String>,
}

impl Default for RollbackCommands {
    fn default() -> Self {
        let argv = |args: &[&str]| args.iter().map(|s| s.to_string()).collect();
        Self {
            install: argv(&["sudo", "pacman", "-U", "--noconfirm"]),
            remove: argv(&["sudo", "pacman", "-R", "--noconfirm"]),
        }
    }
}

/// A rollback plan with every target mapped to a command argument
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedRollback {
    pub downgrade: Vec<PathBuf>,
    pub remove: Vec<String>,
    pub reinstall_removed: Vec<PathBuf>,
    pub rebuild: Vec<PathBuf>,
}

impl ResolvedRollback {
    pub fn is_empty(&self) -> bool {
        self.downgrade.is_empty()
            && self.remove.is_empty()
            && self.reinstall_removed.is_empty()
            && self.rebuild.is_empty()
    }

    /// Pipeline steps in execution order; empty buckets produce no step
    pub fn into_steps(self, commands: &RollbackCommands) -> Vec<PipelineStep> {
        let paths = |paths: Vec<PathBuf>| -> Vec<String> {
            paths
                .into_iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect()
        };

        [
            (&commands.install, paths(self.downgrade)),
            (&commands.remove, self.remove),
            (&commands.install, paths(self.reinstall_removed)),
            (&commands.install, paths(self.rebuild)),
        ]
        .into_iter()
        .filter(|(_, targets)| !targets.is_empty())
        .map(|(prefix, targets)| {
            let mut argv = prefix.clone();
            argv.extend(targets);
            PipelineStep::new(argv)
        })
        .collect()
    }
}

impl fmt::Display for ResolvedRollback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections: [(&str, Vec<String>); 4] = [
            (
                "Restore previous versions",
                self.downgrade.iter().map(|p| p.display().to_string()).collect(),
            ),
            ("Remove installed packages", self.remove.clone()),
            (
                "Reinstall removed packages",
                self.reinstall_removed.iter().map(|p| p.display().to_string()).collect(),
            ),
            (
                "Reinstall pre-rebuild packages",
                self.rebuild.iter().map(|p| p.display().to_string()).collect(),
            ),
        ];

        for (title, items) in sections.iter().filter(|(_, items)| !items.is_empty()) {
            writeln!(f, "{} ({}):", title, items.len())?;
            for item in items {
                writeln!(f, "  {}", item)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn event(package: &str, change: Change) -> TransactionEvent {
        TransactionEvent {
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T10:00:00+02:00").unwrap(),
            package: package.to_string(),
            change,
        }
    }

    fn upgraded(package: &str, from: &str, to: &str) -> TransactionEvent {
        event(
            package,
            Change::Upgraded {
                from: from.to_string(),
                to: to.to_string(),
            },
        )
    }

    fn installed(package: &str, version: &str) -> TransactionEvent {
        event(package, Change::Installed { version: version.to_string() })
    }

    fn removed(package: &str, version: &str) -> TransactionEvent {
        event(package, Change::Removed { version: version.to_string() })
    }

    fn reinstalled(package: &str, version: &str) -> TransactionEvent {
        event(package, Change::Reinstalled { version: version.to_string() })
    }

    fn plan(events: &[TransactionEvent]) -> RollbackPlan {
        RollbackPlan::build(events, &NetTally::from_events(events))
    }

    #[test]
    fn test_transient_removal_is_not_undone() {
        let events = vec![
            upgraded("A", "1.0", "2.0"),
            removed("B", "1.0"),
            installed("B", "1.0"),
        ];
        let plan = plan(&events);
        assert_eq!(plan.to_downgrade, vec![RollbackTarget::new("A", "1.0")]);
        assert!(plan.to_reinstall_removed.is_empty());
        assert!(plan.to_remove.is_empty());
    }

    #[test]
    fn test_genuine_removal_is_reinstalled() {
        let plan = plan(&[removed("C", "3.0")]);
        assert_eq!(plan.to_reinstall_removed, vec![RollbackTarget::new("C", "3.0")]);
    }

    #[test]
    fn test_fresh_install_is_removed() {
        let plan = plan(&[installed("D", "1.0"), installed("E", "2.0"), removed("E", "2.0")]);
        assert_eq!(plan.to_remove, vec![RollbackTarget::new("D", "1.0")]);
        assert!(plan.to_reinstall_removed.is_empty());
    }

    #[test]
    fn test_first_upgrade_wins() {
        let plan = plan(&[upgraded("A", "1.0", "2.0"), upgraded("A", "2.0", "3.0")]);
        assert_eq!(plan.to_downgrade, vec![RollbackTarget::new("A", "1.0")]);
    }

    #[test]
    fn test_removed_after_upgrade_is_left_to_downgrade() {
        let plan = plan(&[upgraded("A", "1.0", "2.0"), removed("A", "2.0")]);
        assert_eq!(plan.to_downgrade, vec![RollbackTarget::new("A", "1.0")]);
        assert!(plan.to_reinstall_removed.is_empty());
    }

    #[test]
    fn test_upgrade_after_removal_still_excludes_reinstall() {
        let plan = plan(&[
            removed("A", "1.0"),
            removed("A", "1.0"),
            installed("A", "1.0"),
            upgraded("A", "1.0", "2.0"),
        ]);
        assert_eq!(plan.to_downgrade, vec![RollbackTarget::new("A", "1.0")]);
        assert!(plan.to_reinstall_removed.is_empty());
    }

    #[test]
    fn test_removed_once_recorded_once() {
        let plan = plan(&[removed("F", "1.0"), installed("F", "1.1"), removed("F", "1.1"), removed("F", "1.2")]);
        assert_eq!(plan.to_reinstall_removed, vec![RollbackTarget::new("F", "1.0")]);
    }

    #[test]
    fn test_rebuilds_are_collected() {
        let plan = plan(&[reinstalled("yay-bin", "12.3.5-1"), reinstalled("yay-bin", "12.3.5-1")]);
        assert_eq!(plan.to_rebuild, vec![RollbackTarget::new("yay-bin", "12.3.5-1")]);
    }

    #[test]
    fn test_empty_window_produces_empty_plan() {
        assert!(plan(&[]).is_empty());
    }

    #[test]
    fn test_resolve_uses_separate_rebuild_cache() {
        let plan = plan(&[
            upgraded("a", "1-1", "2-1"),
            reinstalled("b", "1-1"),
            installed("c", "1-1"),
        ]);
        let caches = CacheSet::new(vec![vec![
            PathBuf::from("/pkg/a-1-1-any.pkg.tar.zst"),
            PathBuf::from("/pkg/b-1-1-any.pkg.tar.zst"),
        ]]);
        let rebuild = CacheSet::new(vec![vec![PathBuf::from("/rebuild/b/b-1-1-any.pkg.tar.zst")]]);

        let resolved = plan.resolve(&caches, &rebuild);
        assert_eq!(resolved.downgrade, vec![PathBuf::from("/pkg/a-1-1-any.pkg.tar.zst")]);
        assert_eq!(resolved.remove, vec!["c".to_string()]);
        assert_eq!(resolved.rebuild, vec![PathBuf::from("/rebuild/b/b-1-1-any.pkg.tar.zst")]);
    }

    #[test]
    fn test_steps_follow_fixed_order_and_skip_empty_buckets() {
        let resolved = ResolvedRollback {
            downgrade: vec![PathBuf::from("/pkg/a-1-1-any.pkg.tar.zst")],
            remove: vec!["c".to_string()],
            reinstall_removed: vec![],
            rebuild: vec![PathBuf::from("/rebuild/b-1-1-any.pkg.tar.zst")],
        };
        let steps = resolved.into_steps(&RollbackCommands::default());

        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps[0].argv,
            vec!["sudo", "pacman", "-U", "--noconfirm", "/pkg/a-1-1-any.pkg.tar.zst"]
        );
        assert_eq!(steps[1].argv, vec!["sudo", "pacman", "-R", "--noconfirm", "c"]);
        assert_eq!(
            steps[2].argv,
            vec!["sudo", "pacman", "-U", "--noconfirm", "/rebuild/b-1-1-any.pkg.tar.zst"]
        );
        assert!(steps.iter().all(|s| s.env.is_none()));
    }

    #[test]
    fn test_fully_missed_plan_has_no_steps() {
        let plan = plan(&[upgraded("a", "1-1", "2-1")]);
        let resolved = plan.resolve(&CacheSet::default(), &CacheSet::default());
        assert!(resolved.is_empty());
        assert!(resolved.into_steps(&RollbackCommands::default()).is_empty());
    }
}
