// src/pipeline/config.rs

//! Update pipeline file
//!
//! The user's update procedure lives in a JSON array:
//!
//! ```json
//! [
//!     { "command": "sudo pacman -Syu", "special_env": "" },
//!     { "command": "yay -Sua --rebuildall", "special_env": "cache_rebuild" }
//! ]
//! ```

use super::PipelineStep;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Variable redirected by the `cache_rebuild` environment
pub const CACHE_HOME_VAR: &str = "XDG_CACHE_HOME";

/// Named environment overrides a step can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialEnv {
    /// Ambient environment
    None,
    /// AUR helper builds land in a per-run rebuild cache
    CacheRebuild,
}

impl SpecialEnv {
    pub fn as_str(&self) -> &str {
        match self {
            SpecialEnv::None => "",
            SpecialEnv::CacheRebuild => "cache_rebuild",
        }
    }
}

impl FromStr for SpecialEnv {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" => Ok(SpecialEnv::None),
            "cache_rebuild" => Ok(SpecialEnv::CacheRebuild),
            _ => Err(format!("Unknown special_env '{}' (valid: \"\", \"cache_rebuild\")", s)),
        }
    }
}

/// A step as written in the pipeline file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepConfig {
    pub command: String,
    #[serde(default)]
    pub special_env: String,
}

impl StepConfig {
    pub fn new(command: impl Into<String>, special_env: SpecialEnv) -> Self {
        Self {
            command: command.into(),
            special_env: special_env.as_str().to_string(),
        }
    }
}

/// The configured forward pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    steps: Vec<StepConfig>,
}

impl PipelineConfig {
    pub fn new(steps: Vec<StepConfig>) -> Self {
        Self { steps }
    }

    /// Load the pipeline file at `path`
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigMissing {
                path: path.to_path_buf(),
                hint: "No update pipeline defined. Generate one with 'sysman update generate'"
                    .to_string(),
            });
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        debug!("Loaded {} pipeline step(s) from {}", config.steps.len(), path.display());
        Ok(config)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let steps: Vec<StepConfig> = serde_json::from_str(content)?;
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[StepConfig] {
        &self.steps
    }

    /// Build executable steps
    ///
    /// `rebuild_cache` is the run-scoped directory `cache_rebuild` steps use
    /// as their cache home.
    pub fn to_steps(&self, rebuild_cache: &Path) -> Result<Vec<PipelineStep>> {
        self.steps
            .iter()
            .map(|config| -> Result<PipelineStep> {
                let special_env = config
                    .special_env
                    .parse::<SpecialEnv>()
                    .map_err(Error::InvalidStep)?;

                let step = PipelineStep::parse(&config.command);
                step.stages()?;

                Ok(match special_env {
                    SpecialEnv::None => step,
                    SpecialEnv::CacheRebuild => {
                        let mut env = BTreeMap::new();
                        env.insert(
                            CACHE_HOME_VAR.to_string(),
                            rebuild_cache.to_string_lossy().into_owned(),
                        );
                        step.with_env(env)
                    }
                })
            })
            .collect()
    }
}

/// Stub written by `update generate`
fn stub() -> PipelineConfig {
    PipelineConfig::new(vec![
        StepConfig {
            command: "put your update command here".to_string(),
            special_env: "put a (case sensitive) keyword here to use a special environment, \
                          leave this field empty to not use it; valid keywords are explained below"
                .to_string(),
        },
        StepConfig {
            command: "commands defined here run sequentially".to_string(),
            special_env: "cache_rebuild -> modifies XDG_CACHE_HOME, use this keyword when \
                          rebuilding AUR packages"
                .to_string(),
        },
    ])
}

/// Write a stub pipeline file, refusing to overwrite an existing one
pub fn generate(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Err(Error::ConfigExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = to_pretty_json(&stub().steps)?;
    fs::write(path, json)?;

    info!("Generated stub pipeline at {}", path.display());
    Ok(path.to_path_buf())
}

/// Pretty-print with the 4-space indent used by every sysman JSON file
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_steps_from_json() {
        let config = PipelineConfig::from_json(
            r#"[
                {"command": "sudo pacman -Syu", "special_env": ""},
                {"command": "yay -Sua", "special_env": "cache_rebuild"},
                {"command": "pacman -Qqdt | sudo pacman -Rns -"}
            ]"#,
        )
        .unwrap();

        let rebuild = Path::new("/home/u/.cache/yay-rebuild/2024-05-01T10:00:00+02:00");
        let steps = config.to_steps(rebuild).unwrap();

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].argv, vec!["sudo", "pacman", "-Syu"]);
        assert!(steps[0].env.is_none());

        let env = steps[1].env.as_ref().unwrap();
        assert_eq!(
            env.get(CACHE_HOME_VAR).map(String::as_str),
            Some("/home/u/.cache/yay-rebuild/2024-05-01T10:00:00+02:00")
        );
        assert_eq!(steps[2].stages().unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_special_env_is_rejected() {
        let config = PipelineConfig::from_json(
            r#"[{"command": "yay", "special_env": "Cache_Rebuild"}]"#,
        )
        .unwrap();
        assert!(matches!(
            config.to_steps(Path::new("/tmp")),
            Err(Error::InvalidStep(_))
        ));
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let config = PipelineConfig::new(vec![StepConfig::new("   ", SpecialEnv::None)]);
        assert!(matches!(
            config.to_steps(Path::new("/tmp")),
            Err(Error::InvalidStep(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let result = PipelineConfig::load(&dir.path().join("update_pipeline.json"));
        assert!(matches!(result, Err(Error::ConfigMissing { .. })));
    }

    #[test]
    fn test_generate_writes_stub_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/update_pipeline.json");

        generate(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("[\n    {\n        \"command\""));

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.steps().len(), 2);
        // The stub must be edited before it can run
        assert!(loaded.to_steps(Path::new("/tmp")).is_err());

        assert!(matches!(generate(&path), Err(Error::ConfigExists(_))));
    }
}
