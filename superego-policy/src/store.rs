//! Snapshot store for the live rule set.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::rule::RuleSet;

/// Shared handle to the current [`RuleSet`] snapshot.
///
/// Readers take an `Arc` clone under a brief read lock; the write lock is
/// held only for the pointer swap. In-flight evaluations keep their `Arc`
/// and finish against the snapshot they started with.
#[derive(Debug)]
pub struct RuleStore {
    snapshot: RwLock<Arc<RuleSet>>,
    last_error: RwLock<Option<String>>,
}

impl RuleStore {
    /// Creates a store serving the given snapshot.
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(rules)),
            last_error: RwLock::new(None),
        }
    }

    /// Creates a store with no rules loaded. The engine fails closed until
    /// a snapshot is installed.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(RuleSet::empty())
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<RuleSet> {
        Arc::clone(&self.snapshot.read().expect("rule snapshot poisoned"))
    }

    /// Atomically replaces the snapshot and clears any recorded load error.
    pub fn install(&self, rules: RuleSet) {
        let next = Arc::new(rules);
        *self.snapshot.write().expect("rule snapshot poisoned") = next;
        *self.last_error.write().expect("load error poisoned") = None;
    }

    /// Records a failed reload without touching the served snapshot.
    pub fn record_load_failure(&self, reason: impl Into<String>) {
        *self.last_error.write().expect("load error poisoned") = Some(reason.into());
    }

    /// Returns the most recent reload failure, if the previous snapshot is
    /// still serving because of one.
    #[must_use]
    pub fn last_load_error(&self) -> Option<String> {
        self.last_error.read().expect("load error poisoned").clone()
    }

    /// Returns the instant the current snapshot was built.
    #[must_use]
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.current().loaded_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_rules;

    #[test]
    fn install_swaps_snapshots_without_disturbing_held_references() {
        let store = RuleStore::empty();
        let before = store.current();
        assert!(before.is_empty());

        let set = parse_rules(
            r#"
rules:
  - id: "r1"
    priority: 1
    action: allow
    conditions: { field: "tool_name", op: "equals", value: "Read" }
"#,
        )
        .expect("valid rules");
        store.install(set);

        // The old snapshot is still intact for anyone holding it.
        assert!(before.is_empty());
        assert_eq!(store.current().len(), 1);
    }

    #[test]
    fn load_failures_are_recorded_and_cleared() {
        let store = RuleStore::empty();
        store.record_load_failure("malformed YAML");
        assert_eq!(store.last_load_error().as_deref(), Some("malformed YAML"));

        store.install(RuleSet::empty());
        assert!(store.last_load_error().is_none());
    }
}
