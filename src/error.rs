// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for sysman
#[derive(Error, Debug)]
pub enum Error {
    /// A required configuration or state file does not exist
    #[error("{hint} (expected at {path})")]
    ConfigMissing { path: PathBuf, hint: String },

    /// Refusing to overwrite an existing configuration file
    #[error("File already exists at {0}. Move it or delete it, then run this command again.")]
    ConfigExists(PathBuf),

    /// A transaction-tagged pacman log line could not be split into its fields
    #[error("Unsupported pacman log format at line {line}: {reason}: {content}")]
    LogFormat {
        line: usize,
        content: String,
        reason: String,
    },

    /// Checkpoint file content is not a timestamp
    #[error("Invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    /// Pipeline step that cannot be executed as written
    #[error("Invalid pipeline step: {0}")]
    InvalidStep(String),

    /// A command could not be started
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A command exited unsuccessfully; the pipeline was aborted
    #[error("Pipeline aborted: '{command}' {}", describe_exit(.code))]
    StepFailed { command: String, code: Option<i32> },

    /// A declared service is unknown to systemd or missing from the service list
    #[error("Service '{0}' not found")]
    ServiceNotFound(String),

    /// $EDITOR is not set
    #[error("EDITOR environment variable is not set")]
    EditorNotSet,

    /// Interactive prompt could not be shown or answered
    #[error("Prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Artifact filename pattern errors
    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {}", code),
        None => "was terminated by a signal".to_string(),
    }
}

/// Result type alias using sysman's Error type
pub type Result<T> = std::result::Result<T, Error>;
