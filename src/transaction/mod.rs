// src/transaction/mod.rs

//! Pacman transaction history
//!
//! Turns `/var/log/pacman.log` into a chronological stream of package
//! lifecycle events and tallies their net effect per package.

pub mod parser;
pub mod tally;

pub use parser::{Events, read_events};
pub use tally::NetTally;

use chrono::{DateTime, FixedOffset};
use std::fmt;
use std::str::FromStr;

/// Package lifecycle operation recorded by pacman
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Installed,
    Upgraded,
    Removed,
    Reinstalled,
}

impl Operation {
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Installed => "installed",
            Operation::Upgraded => "upgraded",
            Operation::Removed => "removed",
            Operation::Reinstalled => "reinstalled",
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "installed" => Ok(Operation::Installed),
            "upgraded" => Ok(Operation::Upgraded),
            "removed" => Ok(Operation::Removed),
            "reinstalled" => Ok(Operation::Reinstalled),
            _ => Err(format!("Unknown transaction verb: {}", s)),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version information attached to an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Installed { version: String },
    Upgraded { from: String, to: String },
    Removed { version: String },
    Reinstalled { version: String },
}

impl Change {
    pub fn operation(&self) -> Operation {
        match self {
            Change::Installed { .. } => Operation::Installed,
            Change::Upgraded { .. } => Operation::Upgraded,
            Change::Removed { .. } => Operation::Removed,
            Change::Reinstalled { .. } => Operation::Reinstalled,
        }
    }

    /// The version that was on the system before this event, if any
    pub fn previous_version(&self) -> Option<&str> {
        match self {
            Change::Upgraded { from, .. } => Some(from),
            Change::Removed { version } | Change::Reinstalled { version } => Some(version),
            Change::Installed { .. } => None,
        }
    }

    /// The version left on the system by this event, if any
    pub fn resulting_version(&self) -> Option<&str> {
        match self {
            Change::Installed { version } | Change::Reinstalled { version } => Some(version),
            Change::Upgraded { to, .. } => Some(to),
            Change::Removed { .. } => None,
        }
    }
}

/// A single package lifecycle event parsed from the pacman log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEvent {
    pub timestamp: DateTime<FixedOffset>,
    pub package: String,
    pub change: Change,
}

impl TransactionEvent {
    pub fn operation(&self) -> Operation {
        self.change.operation()
    }
}

impl fmt::Display for TransactionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.change {
            Change::Upgraded { from, to } => {
                write!(f, "upgraded {} ({} -> {})", self.package, from, to)
            }
            Change::Installed { version }
            | Change::Removed { version }
            | Change::Reinstalled { version } => {
                write!(f, "{} {} ({})", self.operation(), self.package, version)
            }
        }
    }
}
