// src/packages/mod.rs

//! Declarative package list
//!
//! The explicitly installed packages of the system are declared in a JSON
//! file grouped by purpose:
//!
//! ```json
//! [
//!     {
//!         "group_name": "editors",
//!         "packages": [
//!             { "name": "neovim", "comment": "" }
//!         ]
//!     }
//! ]
//! ```
//!
//! `sync` reconciles that file with what pacman reports as explicitly
//! installed.

pub mod sync;

pub use sync::{Interaction, PackageCommands, SyncPlan};

use crate::error::Result;
use crate::pipeline::config::to_pretty_json;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::debug;

/// A declared package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub group: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub comment: String,
}

/// Accept `null` where a string is expected, as left behind by hand edits
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Package {
    /// An ungrouped package without comment
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: String::new(),
            comment: String::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GroupEntry {
    group_name: String,
    packages: Vec<PackageEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PackageEntry {
    name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    comment: String,
}

/// Declared packages keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageList {
    packages: BTreeMap<String, Package>,
}

impl PackageList {
    /// Load the list file; a missing file is an empty list
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No package list at {}", path.display());
            return Ok(Self::default());
        }
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let groups: Vec<GroupEntry> = serde_json::from_str(content)?;
        let packages = groups
            .into_iter()
            .flat_map(|group| {
                let group_name = group.group_name;
                group.packages.into_iter().map(move |entry| Package {
                    name: entry.name,
                    group: group_name.clone(),
                    comment: entry.comment,
                })
            })
            .collect();
        Ok(Self::from_packages(packages))
    }

    /// Build from packages; later duplicates replace earlier ones
    pub fn from_packages(packages: Vec<Package>) -> Self {
        Self {
            packages: packages.into_iter().map(|p| (p.name.clone(), p)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn names(&self) -> BTreeSet<&str> {
        self.packages.keys().map(String::as_str).collect()
    }

    /// Add packages, replacing entries with the same name
    pub fn extend(&mut self, packages: impl IntoIterator<Item = Package>) {
        for package in packages {
            self.packages.insert(package.name.clone(), package);
        }
    }

    pub fn remove_all<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            self.packages.remove(name);
        }
    }

    /// Serialize grouped and sorted case-insensitively, ungrouped first
    pub fn to_json(&self) -> Result<String> {
        let mut groups: BTreeMap<(bool, String, String), Vec<PackageEntry>> = BTreeMap::new();
        for package in self.packages.values() {
            let key = (
                !package.group.is_empty(),
                package.group.to_lowercase(),
                package.group.clone(),
            );
            groups.entry(key).or_default().push(PackageEntry {
                name: package.name.clone(),
                comment: package.comment.clone(),
            });
        }

        let groups: Vec<GroupEntry> = groups
            .into_iter()
            .map(|((_, _, group_name), mut packages)| {
                packages.sort_by_key(|p| p.name.to_lowercase());
                GroupEntry {
                    group_name,
                    packages,
                }
            })
            .collect();

        to_pretty_json(&groups)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        debug!("Saved {} package(s) to {}", self.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const LIST: &str = r#"[
        {"group_name": "", "packages": [{"name": "base", "comment": ""}]},
        {"group_name": "editors", "packages": [
            {"name": "vim", "comment": "fallback"},
            {"name": "Neovim", "comment": ""}
        ]},
        {"group_name": "Desktop", "packages": [{"name": "sway"}]}
    ]"#;

    #[test]
    fn test_from_json_flattens_groups() {
        let list = PackageList::from_json(LIST).unwrap();
        assert_eq!(list.len(), 4);
        assert!(list.contains("sway"));
        assert_eq!(list.packages["vim"].group, "editors");
        assert_eq!(list.packages["vim"].comment, "fallback");
        assert_eq!(list.packages["sway"].comment, "");
    }

    #[test]
    fn test_to_json_orders_groups_and_packages() {
        let list = PackageList::from_json(LIST).unwrap();
        let value: serde_json::Value = serde_json::from_str(&list.to_json().unwrap()).unwrap();

        let groups: Vec<&str> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["group_name"].as_str().unwrap())
            .collect();
        assert_eq!(groups, vec!["", "Desktop", "editors"]);

        let editors: Vec<&str> = value[2]["packages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(editors, vec!["Neovim", "vim"]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sysman/packages.json");

        let mut list = PackageList::default();
        list.extend(vec![Package::bare("git"), Package::bare("base")]);
        list.save(&path).unwrap();

        let loaded = PackageList::load(&path).unwrap();
        assert_eq!(loaded, list);
        assert!(fs::read_to_string(&path).unwrap().contains("\n    {\n"));
    }

    #[test]
    fn test_null_group_and_comment_are_empty() {
        let packages: Vec<Package> = serde_json::from_str(
            r#"[
                {"name": "git", "group": null, "comment": null},
                {"name": "vim", "group": "editors"}
            ]"#,
        )
        .unwrap();
        assert_eq!(packages[0], Package::bare("git"));
        assert_eq!(packages[1].group, "editors");
        assert_eq!(packages[1].comment, "");

        let list = PackageList::from_json(r#"[{"group_name": "", "packages": [{"name": "a", "comment": null}]}]"#)
            .unwrap();
        assert!(list.contains("a"));
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempdir().unwrap();
        assert!(PackageList::load(&dir.path().join("packages.json")).unwrap().is_empty());
    }
}
