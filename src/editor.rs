// src/editor.rs

//! Opening files in the user's editor

use crate::error::{Error, Result};
use crate::pipeline::{self, PipelineStep};
use std::path::Path;
use tracing::debug;

/// Open `path` in `$EDITOR` and wait for it to exit
///
/// `$EDITOR` may carry arguments (`code --wait`).
pub fn open(path: &Path) -> Result<()> {
    let editor = std::env::var("EDITOR")
        .ok()
        .filter(|e| !e.trim().is_empty())
        .ok_or(Error::EditorNotSet)?;

    let mut argv: Vec<String> = editor.split_whitespace().map(str::to_string).collect();
    argv.push(path.to_string_lossy().into_owned());

    debug!("Editing {} with {}", path.display(), editor);
    pipeline::run_step(&PipelineStep::new(argv))
}

/// Open an existing file, reporting `hint` when it is absent
pub fn open_existing(path: &Path, hint: &str) -> Result<()> {
    if !path.exists() {
        return Err(Error::ConfigMissing {
            path: path.to_path_buf(),
            hint: hint.to_string(),
        });
    }
    open(path)
}
