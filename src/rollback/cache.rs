// src/rollback/cache.rs

//! Package cache lookup
//!
//! Maps a `(name, version)` rollback target to a package file sitting in one
//! of the local caches. Caches are searched as ordered tiers; the first tier
//! holding a match wins. A miss drops the target.

use super::RollbackTarget;
use crate::error::Result;
use globset::{Glob, GlobMatcher};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Filename pattern of built pacman packages
const ARTIFACT_GLOB: &str = "*.pkg.tar.*";

/// A cache directory and how deep below it packages are looked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRoot<'a> {
    pub path: &'a Path,
    /// Directory levels below `path` to descend into; `None` for no limit
    pub max_depth: Option<usize>,
}

impl<'a> CacheRoot<'a> {
    /// Packages directly inside `path`, like the pacman cache
    pub fn flat(path: &'a Path) -> Self {
        Self {
            path,
            max_depth: Some(0),
        }
    }

    /// Packages at most `depth` directories below `path`
    pub fn nested(path: &'a Path, depth: usize) -> Self {
        Self {
            path,
            max_depth: Some(depth),
        }
    }

    /// Packages anywhere below `path`
    pub fn recursive(path: &'a Path) -> Self {
        Self { path, max_depth: None }
    }
}

/// Ordered cache listings, highest priority first
#[derive(Debug, Clone, Default)]
pub struct CacheSet {
    tiers: Vec<Vec<PathBuf>>,
}

impl CacheSet {
    /// Build from pre-listed artifact paths
    pub fn new(tiers: Vec<Vec<PathBuf>>) -> Self {
        Self { tiers }
    }

    /// List every cache root, keeping the order of `roots`
    ///
    /// Listing is best effort: unreadable directories are skipped with a
    /// warning.
    pub fn scan(roots: &[CacheRoot<'_>]) -> Result<Self> {
        let matcher = Glob::new(ARTIFACT_GLOB)?.compile_matcher();
        let tiers = roots.iter().map(|root| list_artifacts(root, &matcher)).collect();
        Ok(Self { tiers })
    }

    /// Total number of artifacts across tiers
    pub fn len(&self) -> usize {
        self.tiers.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First artifact matching `target`, searching tiers in order
    pub fn resolve(&self, target: &RollbackTarget) -> Option<&Path> {
        self.tiers
            .iter()
            .find_map(|tier| tier.iter().find(|path| is_artifact_of(path, target)))
            .map(PathBuf::as_path)
    }

    /// Resolve every target, dropping the ones with no cached artifact
    pub fn resolve_all(&self, targets: &[RollbackTarget]) -> Vec<PathBuf> {
        targets
            .iter()
            .filter_map(|target| match self.resolve(target) {
                Some(path) => {
                    debug!("{} resolved to {}", target, path.display());
                    Some(path.to_path_buf())
                }
                None => {
                    warn!("No cached package for {}, skipping it", target);
                    None
                }
            })
            .collect()
    }
}

/// Whether the file at `path` is the package file for `target`
///
/// Pacman names packages `{name}-{pkgver}-{pkgrel}-{arch}.pkg.tar.*` and the
/// log records `{pkgver}-{pkgrel}`, so the file name must start with
/// `{name}-{version}` and continue with a `-` separator.
fn is_artifact_of(path: &Path, target: &RollbackTarget) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let prefix = format!("{}-{}", target.package, target.version);
    match file_name.strip_prefix(&prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('-'),
        None => false,
    }
}

/// List package files under `root`, skipping signatures
fn list_artifacts(root: &CacheRoot<'_>, matcher: &GlobMatcher) -> Vec<PathBuf> {
    let mut artifacts = Vec::new();
    if root.path.is_dir() {
        walk(root.path, root.max_depth, matcher, &mut artifacts);
    } else {
        debug!("Cache {} does not exist", root.path.display());
    }
    artifacts.sort();
    debug!("Found {} packages in {}", artifacts.len(), root.path.display());
    artifacts
}

fn walk(dir: &Path, depth_left: Option<usize>, matcher: &GlobMatcher, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Skipping unreadable cache directory {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries {
        let (path, file_type) = match entry.and_then(|e| Ok((e.path(), e.file_type()?))) {
            Ok(found) => found,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };

        if file_type.is_dir() {
            match depth_left {
                Some(0) => {}
                Some(n) => walk(&path, Some(n - 1), matcher, out),
                None => walk(&path, None, matcher, out),
            }
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if matcher.is_match(name) && !name.ends_with(".sig") {
            out.push(path);
        }
    }
}
