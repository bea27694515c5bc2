// src/prompt.rs

//! Yes/no questions on the terminal

use crate::error::Result;
use dialoguer::Confirm;

/// Ask `question`, defaulting to no
pub fn confirm(question: &str) -> Result<bool> {
    let answer = Confirm::new()
        .with_prompt(question)
        .default(false)
        .interact()?;
    Ok(answer)
}
