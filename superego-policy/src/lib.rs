//! Security rule evaluation for tool requests.
//!
//! The crate is organized around immutable [`RuleSet`] snapshots: the loader
//! compiles a declarative YAML document into a snapshot, the [`RuleStore`]
//! hands out the current snapshot to concurrent readers, the
//! [`PolicyEngine`] scans a snapshot in priority order, and the
//! [`ReloadWatcher`] swaps snapshots in response to rule-file edits without
//! disturbing in-flight evaluations.

#![warn(missing_docs, clippy::pedantic)]

mod condition;
mod engine;
mod loader;
mod rule;
mod store;
mod watcher;

pub use condition::{Condition, ConditionSpec, FieldMatch, FieldPath, MatchOp};
pub use engine::{AdvisorOutcome, PolicyEngine, SampleEvaluator};
pub use loader::{load_rules_file, parse_rules};
pub use rule::{PolicyError, PolicyResult, RuleAction, RuleSet, SecurityRule};
pub use store::RuleStore;
pub use watcher::{ReloadWatcher, WatcherConfig};
