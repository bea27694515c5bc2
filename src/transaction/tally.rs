// src/transaction/tally.rs

//! Net install/removal count per package

use super::{Operation, TransactionEvent};
use std::collections::HashMap;

/// Installs minus removals per package within the log window
///
/// Upgrades and reinstalls leave the count untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetTally {
    counts: HashMap<String, i64>,
}

impl NetTally {
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a TransactionEvent>,
    {
        let mut counts: HashMap<String, i64> = HashMap::new();
        for event in events {
            let delta = match event.operation() {
                Operation::Installed => 1,
                Operation::Removed => -1,
                Operation::Upgraded | Operation::Reinstalled => continue,
            };
            *counts.entry(event.package.clone()).or_default() += delta;
        }
        Self { counts }
    }

    /// Net count for `package`, zero when it never appeared
    pub fn get(&self, package: &str) -> i64 {
        self.counts.get(package).copied().unwrap_or(0)
    }

    /// Installed more often than removed since the checkpoint
    pub fn is_net_installed(&self, package: &str) -> bool {
        self.get(package) > 0
    }

    /// Removed more often than installed since the checkpoint
    pub fn is_net_removed(&self, package: &str) -> bool {
        self.get(package) < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Change;
    use chrono::DateTime;

    fn event(package: &str, change: Change) -> TransactionEvent {
        TransactionEvent {
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T10:00:00+02:00").unwrap(),
            package: package.to_string(),
            change,
        }
    }

    fn installed(package: &str) -> TransactionEvent {
        event(package, Change::Installed { version: "1.0-1".to_string() })
    }

    fn removed(package: &str) -> TransactionEvent {
        event(package, Change::Removed { version: "1.0-1".to_string() })
    }

    #[test]
    fn test_tally_counts_installs_minus_removals() {
        let events = vec![
            installed("a"),
            removed("b"),
            installed("a"),
            removed("a"),
            installed("c"),
            removed("c"),
        ];
        let tally = NetTally::from_events(&events);
        assert_eq!(tally.get("a"), 1);
        assert_eq!(tally.get("b"), -1);
        assert_eq!(tally.get("c"), 0);
        assert_eq!(tally.get("never-seen"), 0);

        assert!(tally.is_net_installed("a"));
        assert!(tally.is_net_removed("b"));
        assert!(!tally.is_net_installed("c") && !tally.is_net_removed("c"));
    }

    #[test]
    fn test_upgrades_and_reinstalls_do_not_count() {
        let events = vec![
            event(
                "a",
                Change::Upgraded {
                    from: "1".to_string(),
                    to: "2".to_string(),
                },
            ),
            event("a", Change::Reinstalled { version: "2".to_string() }),
        ];
        assert_eq!(NetTally::from_events(&events).get("a"), 0);
    }

    #[test]
    fn test_tally_is_order_independent() {
        let forward = vec![removed("x"), installed("x"), installed("x")];
        let backward: Vec<_> = forward.iter().rev().cloned().collect();
        assert_eq!(NetTally::from_events(&forward), NetTally::from_events(&backward));
    }
}
