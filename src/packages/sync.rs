// src/packages/sync.rs

//! Reconciling the package list with the system

use super::{Package, PackageList};
use crate::editor;
use crate::error::Result;
use crate::pipeline::config::to_pretty_json;
use crate::pipeline::{self, PipelineStep};
use crate::prompt;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::info;

/// Commands used to query and change installed packages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCommands {
    /// Prints explicitly installed package names, one per line
    pub query: Vec<String>,
    /// Installs packages named as trailing arguments
    pub install: Vec<String>,
    /// Uninstalls packages named as trailing arguments
    pub uninstall: Vec<String>,
}

impl Default for PackageCommands {
    fn default() -> Self {
        let argv = |args: &[&str]| args.iter().map(|s| s.to_string()).collect();
        Self {
            query: argv(&["pacman", "-Qqe"]),
            install: argv(&["yay", "-S"]),
            uninstall: argv(&["sudo", "pacman", "-Rs"]),
        }
    }
}

impl PackageCommands {
    /// Explicitly installed packages
    pub fn installed(&self) -> Result<BTreeSet<String>> {
        let output = pipeline::capture(&PipelineStep::new(self.query.clone()))?;
        Ok(String::from_utf8_lossy(&output)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn install(&self, names: &[String]) -> Result<()> {
        run_with(&self.install, names)
    }

    pub fn uninstall(&self, names: &[String]) -> Result<()> {
        run_with(&self.uninstall, names)
    }
}

fn run_with(prefix: &[String], names: &[String]) -> Result<()> {
    let mut argv = prefix.to_vec();
    argv.extend_from_slice(names);
    pipeline::run_step(&PipelineStep::new(argv))
}

/// Differences between the declared list and the system
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Declared but not installed
    pub missing_from_system: Vec<String>,
    /// Installed but not declared
    pub missing_from_list: Vec<String>,
}

impl SyncPlan {
    pub fn compute(list: &PackageList, installed: &BTreeSet<String>) -> Self {
        let declared = list.names();
        let installed: BTreeSet<&str> = installed.iter().map(String::as_str).collect();

        Self {
            missing_from_system: sorted_names(declared.difference(&installed)),
            missing_from_list: sorted_names(installed.difference(&declared)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.missing_from_system.is_empty() && self.missing_from_list.is_empty()
    }
}

fn sorted_names<'a>(names: impl Iterator<Item = &'a &'a str>) -> Vec<String> {
    let mut names: Vec<String> = names.map(|n| n.to_string()).collect();
    names.sort_by_key(|n| n.to_lowercase());
    names
}

/// The user side of a sync
pub trait Interaction {
    /// Show a message
    fn report(&mut self, message: &str);

    /// Ask a yes/no question
    fn confirm(&mut self, question: &str) -> Result<bool>;

    /// Let the user assign groups and comments to new packages
    fn edit_packages(&mut self, packages: Vec<Package>) -> Result<Vec<Package>>;
}

/// Interaction on the controlling terminal
#[derive(Debug, Default)]
pub struct Terminal;

impl Interaction for Terminal {
    fn report(&mut self, message: &str) {
        println!("{}", message);
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        prompt::confirm(question)
    }

    fn edit_packages(&mut self, packages: Vec<Package>) -> Result<Vec<Package>> {
        let file = tempfile::Builder::new()
            .prefix("sysman-packages-")
            .suffix(".json")
            .tempfile()?;
        fs::write(file.path(), to_pretty_json(&packages)?)?;

        editor::open(file.path())?;

        let edited: Vec<Package> = serde_json::from_str(&fs::read_to_string(file.path())?)?;
        Ok(edited)
    }
}

/// Reconcile the list at `list_path` with the system, asking before each change
pub fn sync(list_path: &Path, commands: &PackageCommands, ui: &mut dyn Interaction) -> Result<SyncPlan> {
    let mut list = PackageList::load(list_path)?;
    let installed = commands.installed()?;
    let plan = SyncPlan::compute(&list, &installed);
    info!(
        "{} package(s) missing from the system, {} missing from the list",
        plan.missing_from_system.len(),
        plan.missing_from_list.len()
    );

    if !plan.missing_from_system.is_empty() {
        ui.report(&format!(
            "There are {} packages missing from the system:\n{}",
            plan.missing_from_system.len(),
            plan.missing_from_system.join(", ")
        ));

        if ui.confirm("Install them?")? {
            commands.install(&plan.missing_from_system)?;
        } else if ui.confirm("Remove these packages from the list?")? {
            list.remove_all(plan.missing_from_system.iter().map(String::as_str));
            list.save(list_path)?;
        }
    }

    if !plan.missing_from_list.is_empty() {
        ui.report(&format!(
            "There are {} packages missing from the list:\n{}",
            plan.missing_from_list.len(),
            plan.missing_from_list.join(", ")
        ));

        if ui.confirm("Add them to the list?")? {
            let new_packages = plan.missing_from_list.iter().map(Package::bare).collect();
            let edited = ui.edit_packages(new_packages)?;
            list.extend(edited);
            list.save(list_path)?;
        } else if ui.confirm("Remove these packages from the system?")? {
            commands.uninstall(&plan.missing_from_list)?;
        }
    }

    Ok(plan)
}
