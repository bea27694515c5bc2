// src/services/mod.rs

//! Declarative service list
//!
//! Services the system should run are declared in a JSON file split by
//! systemd scope. Local services also carry the unit file (and optionally a
//! script) that has to be installed before they can be enabled:
//!
//! ```json
//! {
//!     "system_services": [{ "name": "sshd", "comment": "" }],
//!     "local_system_services": [],
//!     "user_services": [],
//!     "local_user_services": [{
//!         "name": "backup.timer",
//!         "comment": "",
//!         "service_file": "~/units/backup.timer",
//!         "service_script_file": ""
//!     }]
//! }
//! ```

pub mod sync;

pub use sync::{ServiceAction, ServiceCommands, ServiceSyncPlan, UnitState};

use crate::error::{Error, Result};
use crate::pipeline::config::to_pretty_json;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// systemd instance a service belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    System,
    User,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::System => write!(f, "system"),
            Scope::User => write!(f, "user"),
        }
    }
}

/// Files installed for a locally defined service
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalUnit {
    pub service_file: PathBuf,
    pub script_file: Option<PathBuf>,
}

/// A declared service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub comment: String,
    pub scope: Scope,
    pub local: Option<LocalUnit>,
}

impl Service {
    pub fn new(name: impl Into<String>, scope: Scope) -> Self {
        Self {
            name: name.into(),
            comment: String::new(),
            scope,
            local: None,
        }
    }

    pub fn local(name: impl Into<String>, scope: Scope, unit: LocalUnit) -> Self {
        Self {
            local: Some(unit),
            ..Self::new(name, scope)
        }
    }

    /// Whether two declarations describe the same service; comments do not count
    pub fn same_as(&self, other: &Service) -> bool {
        self.name == other.name && self.scope == other.scope && self.local == other.local
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ServiceFile {
    #[serde(default)]
    system_services: Vec<ServiceEntry>,
    #[serde(default)]
    local_system_services: Vec<LocalServiceEntry>,
    #[serde(default)]
    user_services: Vec<ServiceEntry>,
    #[serde(default)]
    local_user_services: Vec<LocalServiceEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ServiceEntry {
    name: String,
    #[serde(default)]
    comment: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct LocalServiceEntry {
    name: String,
    #[serde(default)]
    comment: String,
    service_file: String,
    #[serde(default)]
    service_script_file: String,
}

impl ServiceEntry {
    fn into_service(self, scope: Scope) -> Service {
        Service {
            comment: self.comment,
            ..Service::new(self.name, scope)
        }
    }
}

impl LocalServiceEntry {
    fn into_service(self, scope: Scope) -> Service {
        let script_file = match self.service_script_file.trim() {
            "" => None,
            script => Some(expand_home(script)),
        };
        let unit = LocalUnit {
            service_file: expand_home(&self.service_file),
            script_file,
        };
        Service {
            comment: self.comment,
            ..Service::local(self.name, scope, unit)
        }
    }
}

/// Resolve a leading `~/` against the home directory
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Declared services in file order: system, local system, user, local user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceList {
    services: Vec<Service>,
}

impl ServiceList {
    pub fn new(services: Vec<Service>) -> Self {
        Self { services }
    }

    /// Load the list at `path`; unlike the package list it must exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigMissing {
                path: path.to_path_buf(),
                hint: "No service list defined. Generate one with 'sysman service generate'"
                    .to_string(),
            });
        }
        let list = Self::from_json(&fs::read_to_string(path)?)?;
        debug!("Loaded {} service(s) from {}", list.len(), path.display());
        Ok(list)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: ServiceFile = serde_json::from_str(content)?;

        let mut services = Vec::new();
        services.extend(file.system_services.into_iter().map(|e| e.into_service(Scope::System)));
        services.extend(
            file.local_system_services
                .into_iter()
                .map(|e| e.into_service(Scope::System)),
        );
        services.extend(file.user_services.into_iter().map(|e| e.into_service(Scope::User)));
        services.extend(
            file.local_user_services
                .into_iter()
                .map(|e| e.into_service(Scope::User)),
        );
        Ok(Self { services })
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// First service declared under `name`, in any scope
    pub fn find(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Whether an equivalent declaration is in the list
    pub fn declares(&self, service: &Service) -> bool {
        self.services.iter().any(|s| s.same_as(service))
    }
}

fn stub() -> ServiceFile {
    let service = || ServiceEntry {
        name: "name of the service".to_string(),
        comment: "comment for the service".to_string(),
    };
    let local = || LocalServiceEntry {
        name: "name of the service".to_string(),
        comment: "comment for the service".to_string(),
        service_file: "absolute path to the .service file".to_string(),
        service_script_file: "(optional) absolute path to the script used in the .service file, \
                              if unused put empty string here"
            .to_string(),
    };
    ServiceFile {
        system_services: vec![service()],
        local_system_services: vec![local()],
        user_services: vec![service()],
        local_user_services: vec![local()],
    }
}

/// Write a stub service list, refusing to overwrite an existing one
pub fn generate(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Err(Error::ConfigExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, to_pretty_json(&stub())?)?;

    info!("Generated stub service list at {}", path.display());
    Ok(path.to_path_buf())
}
