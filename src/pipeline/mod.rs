// src/pipeline/mod.rs

//! Ordered command pipelines
//!
//! A pipeline is a list of steps executed one after another. A step is an
//! argument vector that may contain literal `|` tokens; each `|` starts a new
//! stage whose standard input is the output of the previous stage. Commands
//! are spawned directly, never through a shell.

pub mod config;
pub mod executor;

pub use config::{PipelineConfig, SpecialEnv, StepConfig};
pub use executor::{capture, query, run, run_step};

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Token separating the stages of a step
pub const PIPE: &str = "|";

/// One unit of pipeline execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStep {
    pub argv: Vec<String>,
    /// Variables layered over the ambient environment for every stage
    pub env: Option<BTreeMap<String, String>>,
}

impl PipelineStep {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv, env: None }
    }

    /// Split a command line on whitespace
    pub fn parse(command: &str) -> Self {
        Self::new(command.split_whitespace().map(str::to_string).collect())
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    /// Argument vectors of the individual stages
    pub fn stages(&self) -> Result<Vec<&[String]>> {
        if self.argv.is_empty() {
            return Err(Error::InvalidStep("empty command".to_string()));
        }

        let stages: Vec<&[String]> = self.argv.split(|arg| arg == PIPE).collect();
        if stages.iter().any(|stage| stage.is_empty()) {
            return Err(Error::InvalidStep(format!(
                "'{}' has an empty pipe stage",
                self
            )));
        }
        Ok(stages)
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.argv.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_whitespace() {
        let step = PipelineStep::parse("  yay -Syu   --noconfirm ");
        assert_eq!(step.argv, vec!["yay", "-Syu", "--noconfirm"]);
        assert!(step.env.is_none());
    }

    #[test]
    fn test_stages_split_on_pipe_tokens() {
        let step = PipelineStep::parse("pacman -Qqdt | sudo pacman -Rns -");
        let stages = step.stages().unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0], ["pacman", "-Qqdt"]);
        assert_eq!(stages[1], ["sudo", "pacman", "-Rns", "-"]);

        // Only standalone tokens separate stages
        let step = PipelineStep::parse("grep a|b file");
        assert_eq!(step.stages().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_stages_are_rejected() {
        for command in ["", "| wc -l", "echo hi |", "echo hi | | wc -l"] {
            let step = PipelineStep::parse(command);
            assert!(
                matches!(step.stages(), Err(Error::InvalidStep(_))),
                "accepted '{}'",
                command
            );
        }
    }
}
