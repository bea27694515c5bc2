// src/services/sync.rs

//! Bringing systemd in line with the service list
//!
//! A sync first retires services dropped since the last sync (disabling
//! them and removing installed unit files), then installs and enables every
//! declared service that is not enabled yet. The list is copied aside after
//! a successful sync so the next one can tell what was dropped.

use super::{Scope, Service, ServiceList};
use crate::error::{Error, Result};
use crate::pipeline::{self, PipelineStep};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What `systemctl is-enabled` reports for a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitState {
    Enabled,
    Disabled,
    NotFound,
    /// static, masked, indirect and the like
    Other(String),
}

impl UnitState {
    /// Interpret `is-enabled` output; no output means the unit is unknown
    pub fn parse(output: &str) -> Self {
        match output.lines().next().map(str::trim).unwrap_or("") {
            "enabled" => UnitState::Enabled,
            "disabled" => UnitState::Disabled,
            "" | "not-found" => UnitState::NotFound,
            other => UnitState::Other(other.to_string()),
        }
    }
}

/// A change to one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAction {
    Disable(Service),
    Uninstall(Service),
    Install(Service),
    Enable(Service),
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (verb, service) = match self {
            ServiceAction::Disable(s) => ("disable", s),
            ServiceAction::Uninstall(s) => ("uninstall", s),
            ServiceAction::Install(s) => ("install", s),
            ServiceAction::Enable(s) => ("enable", s),
        };
        write!(f, "{} {} ({})", verb, service.name, service.scope)
    }
}

/// Commands and locations used to manage services
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCommands {
    /// Changes system units
    pub system_ctl: Vec<String>,
    /// Reads system unit state
    pub system_query: Vec<String>,
    /// Changes user units
    pub user_ctl: Vec<String>,
    /// Reads user unit state
    pub user_query: Vec<String>,
    /// Copies a file given as `src dst`
    pub copy: Vec<String>,
    /// Removes files, tolerating missing ones
    pub remove: Vec<String>,
    pub system_unit_dir: PathBuf,
    pub user_unit_dir: PathBuf,
    pub script_dir: PathBuf,
}

impl Default for ServiceCommands {
    fn default() -> Self {
        let argv = |args: &[&str]| args.iter().map(|s| s.to_string()).collect();
        Self {
            system_ctl: argv(&["sudo", "systemctl"]),
            system_query: argv(&["systemctl"]),
            user_ctl: argv(&["systemctl", "--user"]),
            user_query: argv(&["systemctl", "--user"]),
            copy: argv(&["sudo", "cp"]),
            remove: argv(&["sudo", "rm", "-f"]),
            system_unit_dir: PathBuf::from("/etc/systemd/system"),
            user_unit_dir: PathBuf::from("/etc/systemd/user"),
            script_dir: PathBuf::from("/usr/bin"),
        }
    }
}

impl ServiceCommands {
    /// Current state of `service`
    pub fn state(&self, service: &Service) -> Result<UnitState> {
        let prefix = match service.scope {
            Scope::System => &self.system_query,
            Scope::User => &self.user_query,
        };
        let argv = with_args(prefix, ["is-enabled", service.name.as_str()]);
        let output = pipeline::query(&PipelineStep::new(argv))?;
        let state = UnitState::parse(&String::from_utf8_lossy(&output));
        debug!("{} ({}) is {:?}", service.name, service.scope, state);
        Ok(state)
    }

    fn ctl(&self, scope: Scope) -> &[String] {
        match scope {
            Scope::System => &self.system_ctl,
            Scope::User => &self.user_ctl,
        }
    }

    fn unit_dir(&self, scope: Scope) -> &Path {
        match scope {
            Scope::System => &self.system_unit_dir,
            Scope::User => &self.user_unit_dir,
        }
    }

    /// Steps carrying out `action`
    ///
    /// Installing checks that the source files exist so nothing runs for a
    /// broken declaration.
    pub fn steps(&self, action: &ServiceAction) -> Result<Vec<PipelineStep>> {
        let steps = match action {
            ServiceAction::Enable(service) => vec![with_args(
                self.ctl(service.scope),
                ["enable", "--now", service.name.as_str()],
            )],
            ServiceAction::Disable(service) => vec![with_args(
                self.ctl(service.scope),
                ["disable", service.name.as_str()],
            )],
            ServiceAction::Install(service) => {
                let Some(unit) = &service.local else {
                    return Ok(Vec::new());
                };
                let mut steps = Vec::new();
                if let Some(script) = &unit.script_file {
                    steps.push(self.copy_step(service, script, &self.script_dir)?);
                }
                steps.push(self.copy_step(service, &unit.service_file, self.unit_dir(service.scope))?);
                steps
            }
            ServiceAction::Uninstall(service) => {
                let Some(unit) = &service.local else {
                    return Ok(Vec::new());
                };
                let mut targets = vec![installed_path(&unit.service_file, self.unit_dir(service.scope))?];
                if let Some(script) = &unit.script_file {
                    targets.push(installed_path(script, &self.script_dir)?);
                }
                let mut argv = self.remove.clone();
                argv.extend(targets.iter().map(|p| p.to_string_lossy().into_owned()));
                vec![argv]
            }
        };
        Ok(steps.into_iter().map(PipelineStep::new).collect())
    }

    fn copy_step(&self, service: &Service, source: &Path, dir: &Path) -> Result<Vec<String>> {
        if !source.is_file() {
            return Err(Error::ConfigMissing {
                path: source.to_path_buf(),
                hint: format!("File for service '{}' does not exist", service.name),
            });
        }
        let target = installed_path(source, dir)?;
        let mut argv = self.copy.clone();
        argv.push(source.to_string_lossy().into_owned());
        argv.push(target.to_string_lossy().into_owned());
        Ok(argv)
    }
}

fn with_args<'a>(prefix: &[String], args: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut argv = prefix.to_vec();
    argv.extend(args.into_iter().map(str::to_string));
    argv
}

/// Where `source` lands when installed into `dir`
fn installed_path(source: &Path, dir: &Path) -> Result<PathBuf> {
    source
        .file_name()
        .map(|name| dir.join(name))
        .ok_or_else(|| Error::InvalidStep(format!("'{}' does not name a file", source.display())))
}

/// Ordered service changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceSyncPlan {
    pub actions: Vec<ServiceAction>,
}

impl ServiceSyncPlan {
    /// Plan a sync of `current` against the list of the last sync
    ///
    /// `state_of` reports the live state of a unit. Retired services are
    /// handled first, and their new state is what later declarations of the
    /// same unit see.
    pub fn compute<F>(current: &ServiceList, previous: Option<&ServiceList>, mut state_of: F) -> Result<Self>
    where
        F: FnMut(&Service) -> Result<UnitState>,
    {
        let mut actions = Vec::new();
        let mut changed: HashMap<(String, Scope), UnitState> = HashMap::new();

        let retired = previous
            .map(|prev| prev.services().iter().filter(|s| !current.declares(s)).collect::<Vec<_>>())
            .unwrap_or_default();

        for service in retired {
            let state = state_of(service)?;
            match &service.local {
                None if state == UnitState::Enabled => {
                    actions.push(ServiceAction::Disable(service.clone()));
                    changed.insert((service.name.clone(), service.scope), UnitState::Disabled);
                }
                Some(_) if state != UnitState::NotFound => {
                    if state == UnitState::Enabled {
                        actions.push(ServiceAction::Disable(service.clone()));
                    }
                    actions.push(ServiceAction::Uninstall(service.clone()));
                    changed.insert((service.name.clone(), service.scope), UnitState::NotFound);
                }
                _ => {}
            }
        }

        for service in current.services() {
            let state = match changed.get(&(service.name.clone(), service.scope)) {
                Some(state) => state.clone(),
                None => state_of(service)?,
            };
            if state == UnitState::Enabled {
                continue;
            }
            if state == UnitState::NotFound {
                if service.local.is_none() {
                    return Err(Error::ServiceNotFound(service.name.clone()));
                }
                actions.push(ServiceAction::Install(service.clone()));
            }
            actions.push(ServiceAction::Enable(service.clone()));
        }

        Ok(Self { actions })
    }

    /// Plan reinstalling `name`, replacing the files installed by the last sync
    pub fn reinstall<F>(name: &str, current: &ServiceList, previous: &ServiceList, mut state_of: F) -> Result<Self>
    where
        F: FnMut(&Service) -> Result<UnitState>,
    {
        let not_found = || Error::ServiceNotFound(name.to_string());
        let service = current.find(name).ok_or_else(not_found)?;
        let installed = previous.find(name).ok_or_else(not_found)?;

        let mut actions = Vec::new();
        if state_of(service)? == UnitState::Enabled {
            actions.push(ServiceAction::Disable(service.clone()));
        }
        if service.local.is_some() {
            actions.push(ServiceAction::Uninstall(installed.clone()));
            actions.push(ServiceAction::Install(service.clone()));
        }
        actions.push(ServiceAction::Enable(service.clone()));

        Ok(Self { actions })
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn to_steps(&self, commands: &ServiceCommands) -> Result<Vec<PipelineStep>> {
        let mut steps = Vec::new();
        for action in &self.actions {
            steps.extend(commands.steps(action)?);
        }
        Ok(steps)
    }
}

impl fmt::Display for ServiceSyncPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for action in &self.actions {
            writeln!(f, "  {}", action)?;
        }
        Ok(())
    }
}

/// Sync systemd with the list at `list`, then record it at `synced`
pub fn sync(list: &Path, synced: &Path, commands: &ServiceCommands) -> Result<ServiceSyncPlan> {
    let current = ServiceList::load(list)?;
    let previous = if synced.exists() {
        Some(ServiceList::load(synced)?)
    } else {
        None
    };

    let plan = ServiceSyncPlan::compute(&current, previous.as_ref(), |s| commands.state(s))?;
    info!("Service sync: {} action(s)", plan.actions.len());
    pipeline::run(&plan.to_steps(commands)?)?;

    record(list, synced)?;
    Ok(plan)
}

/// Reinstall and restart one service
pub fn reinstall(name: &str, list: &Path, synced: &Path, commands: &ServiceCommands) -> Result<ServiceSyncPlan> {
    let current = ServiceList::load(list)?;
    if !synced.exists() {
        return Err(Error::ConfigMissing {
            path: synced.to_path_buf(),
            hint: "Sync services with 'sysman service sync' first".to_string(),
        });
    }
    let previous = ServiceList::load(synced)?;

    let plan = ServiceSyncPlan::reinstall(name, &current, &previous, |s| commands.state(s))?;
    info!("Reinstalling {}: {} action(s)", name, plan.actions.len());
    pipeline::run(&plan.to_steps(commands)?)?;

    record(list, synced)?;
    Ok(plan)
}

fn record(list: &Path, synced: &Path) -> Result<()> {
    fs::copy(list, synced)?;
    debug!("Recorded {} as {}", list.display(), synced.display());
    Ok(())
}
