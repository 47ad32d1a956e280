//! Security rule model and immutable rule-set snapshots.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use superego_primitives::{SuperegoError, ToolRequest};
use thiserror::Error;

use crate::condition::Condition;

/// Highest priority value a rule may carry; lower numbers win.
pub const MAX_RULE_PRIORITY: u32 = 1000;

/// Errors surfaced while loading or validating rules.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The rule document could not be read or parsed.
    #[error("invalid rule document: {reason}")]
    InvalidDocument {
        /// First failure encountered.
        reason: String,
    },

    /// A specific rule failed validation.
    #[error("invalid rule `{rule_id}`: {reason}")]
    InvalidRule {
        /// Identifier of the offending rule (or its index when unnamed).
        rule_id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// The rule file could not be read.
    #[error("failed to read rule file: {source}")]
    Io {
        /// Underlying filesystem error.
        #[from]
        source: std::io::Error,
    },
}

impl PolicyError {
    pub(crate) fn document(reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            reason: reason.into(),
        }
    }

    pub(crate) fn rule(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule_id: rule_id.into(),
            reason: reason.into(),
        }
    }
}

impl From<PolicyError> for SuperegoError {
    fn from(err: PolicyError) -> Self {
        Self::config(err.to_string())
    }
}

/// Result alias for rule loading and validation.
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Action a matched rule prescribes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Permit the request outright.
    Allow,
    /// Reject the request outright.
    Deny,
    /// Defer the verdict to the AI advisor.
    Sample,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Sample => "sample",
        })
    }
}

impl FromStr for RuleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            "sample" => Ok(Self::Sample),
            other => Err(format!(
                "unknown action `{other}`; valid: allow|deny|sample"
            )),
        }
    }
}

/// A single compiled security rule. Immutable once loaded.
#[derive(Clone, Debug)]
pub struct SecurityRule {
    id: String,
    priority: u32,
    action: RuleAction,
    reason: Option<String>,
    sample_guidance: Option<String>,
    condition: Condition,
}

impl SecurityRule {
    pub(crate) fn new(
        id: String,
        priority: u32,
        action: RuleAction,
        reason: Option<String>,
        sample_guidance: Option<String>,
        condition: Condition,
    ) -> Self {
        Self {
            id,
            priority,
            action,
            reason,
            sample_guidance,
            condition,
        }
    }

    /// Returns the unique rule identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the rule priority; lower numbers win.
    #[must_use]
    pub const fn priority(&self) -> u32 {
        self.priority
    }

    /// Returns the action this rule prescribes on match.
    #[must_use]
    pub const fn action(&self) -> RuleAction {
        self.action
    }

    /// Returns the stated justification, if any.
    ///
    /// The loader guarantees `deny` and `sample` rules always carry one.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Returns extra instruction text for the advisor on `sample` rules.
    #[must_use]
    pub fn sample_guidance(&self) -> Option<&str> {
        self.sample_guidance.as_deref()
    }

    /// Returns the compiled condition tree.
    #[must_use]
    pub const fn condition(&self) -> &Condition {
        &self.condition
    }

    /// Evaluates the rule's condition tree against a request.
    #[must_use]
    pub fn matches(&self, request: &ToolRequest) -> bool {
        self.condition.evaluate(request)
    }
}

/// Immutable snapshot of the loaded rules in evaluation order.
///
/// Rules are sorted by `(priority asc, load order asc)` at construction so
/// the engine's first-match scan needs no further bookkeeping.
#[derive(Clone, Debug)]
pub struct RuleSet {
    rules: Vec<SecurityRule>,
    loaded_at: DateTime<Utc>,
}

impl RuleSet {
    pub(crate) fn new(mut rules: Vec<SecurityRule>) -> Self {
        rules.sort_by_key(|rule| rule.priority());
        Self {
            rules,
            loaded_at: Utc::now(),
        }
    }

    /// Returns an empty snapshot. An engine serving it fails closed.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Returns the rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[SecurityRule] {
        &self.rules
    }

    /// Returns the number of loaded rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` when no rules are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns the instant this snapshot was built.
    #[must_use]
    pub const fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, FieldPath, MatchOp};

    fn rule(id: &str, priority: u32) -> SecurityRule {
        SecurityRule::new(
            id.to_owned(),
            priority,
            RuleAction::Allow,
            None,
            None,
            Condition::field(FieldPath::ToolName, MatchOp::Equals("Read".into())),
        )
    }

    #[test]
    fn rule_set_sorts_by_priority_preserving_load_order() {
        let set = RuleSet::new(vec![rule("late", 500), rule("first", 10), rule("tied", 10)]);
        let ids: Vec<&str> = set.rules().iter().map(SecurityRule::id).collect();
        assert_eq!(ids, ["first", "tied", "late"]);
    }

    #[test]
    fn action_parses_from_wire_spelling() {
        assert_eq!("allow".parse::<RuleAction>().unwrap(), RuleAction::Allow);
        assert_eq!("sample".parse::<RuleAction>().unwrap(), RuleAction::Sample);
        assert!("approve".parse::<RuleAction>().is_err());
    }
}
