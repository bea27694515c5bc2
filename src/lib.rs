// src/lib.rs

//! Sysman
//!
//! Pipeline-driven system updates for Arch Linux with rollback reconstructed
//! from the pacman log.
//!
//! # Architecture
//!
//! - Pipeline: an ordered list of shell-like commands run for every update
//! - Checkpoint: the instant the last update started, kept in a file
//! - Rollback: pacman log events since the checkpoint are folded into a plan
//!   that downgrades, removes, reinstalls and rebuilds packages from local caches
//! - Package list: a declarative JSON list reconciled with the installed set
//! - Service list: declared systemd services enabled, installed and retired on sync

pub mod checkpoint;
pub mod editor;
mod error;
pub mod packages;
pub mod paths;
pub mod pipeline;
pub mod prompt;
pub mod rollback;
pub mod services;
pub mod transaction;
pub mod update;

pub use error::{Error, Result};
