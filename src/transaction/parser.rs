// src/transaction/parser.rs

//! Pacman log line parser
//!
//! Lines look like
//!
//! ```text
//! [2024-05-01T10:02:11+0200] [ALPM] upgraded linux (6.8.8.arch1-1 -> 6.8.9.arch1-1)
//! ```
//!
//! Only `[ALPM]` lines with one of the four lifecycle verbs become events.
//! Everything else (hook output, scriptlets, warnings, `transaction started`)
//! is noise and skipped. A lifecycle line inside the window whose body cannot
//! be split into name and version aborts the parse.

use super::{Change, Operation, TransactionEvent};
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::debug;

/// Facility marker pacman uses for package transactions
pub const TRANSACTION_FACILITY: &str = "ALPM";

/// Lazy iterator over the transaction events of a pacman log
///
/// Yields events in log order. Stops after the first error.
pub struct Events<R> {
    reader: R,
    cutoff: DateTime<FixedOffset>,
    line_no: usize,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> Events<R> {
    /// Iterate over events at or after `cutoff`
    pub fn new(reader: R, cutoff: DateTime<FixedOffset>) -> Self {
        Self {
            reader,
            cutoff,
            line_no: 0,
            buf: Vec::new(),
            done: false,
        }
    }
}

impl Events<BufReader<File>> {
    /// Open a log file for iteration
    pub fn open(path: &Path, cutoff: DateTime<FixedOffset>) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::ConfigMissing {
                path: path.to_path_buf(),
                hint: "Pacman log not found".to_string(),
            },
            _ => Error::Io(e),
        })?;
        Ok(Self::new(BufReader::new(file), cutoff))
    }
}

impl<R: BufRead> Iterator for Events<R> {
    type Item = Result<TransactionEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(Error::Io(e)));
                }
            }
            self.line_no += 1;

            // Hook output is not guaranteed to be valid UTF-8
            let line = String::from_utf8_lossy(&self.buf);
            match parse_line(&line, self.cutoff) {
                Ok(Some(event)) => return Some(Ok(event)),
                Ok(None) => continue,
                Err(reason) => {
                    self.done = true;
                    return Some(Err(Error::LogFormat {
                        line: self.line_no,
                        content: line.trim_end().to_string(),
                        reason,
                    }));
                }
            }
        }
    }
}

/// Read every transaction event at or after `cutoff` from the log at `path`
pub fn read_events(path: &Path, cutoff: DateTime<FixedOffset>) -> Result<Vec<TransactionEvent>> {
    debug!("Reading pacman log {} since {}", path.display(), cutoff);
    let events = Events::open(path, cutoff)?.collect::<Result<Vec<_>>>()?;
    debug!("Found {} transaction events", events.len());
    Ok(events)
}

/// Parse a log timestamp
///
/// Pacman writes `2024-05-01T10:02:11+0200`; RFC 3339 (`+02:00`) is accepted
/// too. Timestamps without an offset are rejected.
pub fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
}

/// Split `[inner] rest` into `(inner, rest)`
fn bracketed(s: &str) -> Option<(&str, &str)> {
    let (inner, rest) = s.strip_prefix('[')?.split_once(']')?;
    Some((inner, rest.strip_prefix(' ').unwrap_or(rest)))
}

/// Parse one log line
///
/// `Ok(None)` for noise and for events before `cutoff`, `Err` with a reason
/// for a lifecycle line in the window that has an unexpected shape.
fn parse_line(
    line: &str,
    cutoff: DateTime<FixedOffset>,
) -> std::result::Result<Option<TransactionEvent>, String> {
    let line = line.trim_end();

    let Some((stamp, rest)) = bracketed(line) else {
        return Ok(None);
    };
    let Some(timestamp) = parse_timestamp(stamp) else {
        return Ok(None);
    };
    let Some((facility, body)) = bracketed(rest) else {
        return Ok(None);
    };
    if facility != TRANSACTION_FACILITY {
        return Ok(None);
    }
    let Some((verb, target)) = body.split_once(' ') else {
        return Ok(None);
    };
    let Ok(operation) = verb.parse::<Operation>() else {
        return Ok(None);
    };
    if timestamp < cutoff {
        return Ok(None);
    }

    let (package, change) = parse_target(operation, target)?;
    Ok(Some(TransactionEvent {
        timestamp,
        package,
        change,
    }))
}

/// Parse `name (version)` or `name (old -> new)`
fn parse_target(operation: Operation, target: &str) -> std::result::Result<(String, Change), String> {
    let (name, args) = target
        .split_once(" (")
        .ok_or_else(|| "missing parenthesized version".to_string())?;
    let args = args
        .strip_suffix(')')
        .ok_or_else(|| "unterminated version".to_string())?;

    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(format!("invalid package name '{}'", name));
    }

    let versions: Vec<&str> = args.split(" -> ").collect();
    let expected = if operation == Operation::Upgraded { 2 } else { 1 };
    if versions.len() != expected || versions.iter().any(|v| v.trim().is_empty()) {
        return Err(format!(
            "expected {} version(s) for '{}', found '{}'",
            expected, operation, args
        ));
    }

    let version = |i: usize| versions[i].trim().to_string();
    let change = match operation {
        Operation::Installed => Change::Installed { version: version(0) },
        Operation::Upgraded => Change::Upgraded {
            from: version(0),
            to: version(1),
        },
        Operation::Removed => Change::Removed { version: version(0) },
        Operation::Reinstalled => Change::Reinstalled { version: version(0) },
    };

    Ok((name.to_string(), change))
}
