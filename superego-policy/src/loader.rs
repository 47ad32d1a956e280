//! Rule file loader: YAML document in, validated [`RuleSet`] out.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::condition::ConditionSpec;
use crate::rule::{MAX_RULE_PRIORITY, PolicyError, PolicyResult, RuleAction, RuleSet, SecurityRule};

#[derive(Debug, Deserialize)]
struct RuleFileSpec {
    rules: Vec<RuleSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSpec {
    id: String,
    priority: u32,
    action: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    sample_guidance: Option<String>,
    conditions: ConditionSpec,
}

/// Parses and validates a YAML rule document.
///
/// Validation covers: unique non-empty ids, priority within
/// `[0, 1000]`, a known action, a reason on every non-`allow` rule, and
/// well-formed conditions (including regex compilation). The first failure
/// aborts the whole load so a bad document never half-applies.
///
/// # Errors
///
/// Returns [`PolicyError`] describing the first validation failure.
pub fn parse_rules(document: &str) -> PolicyResult<RuleSet> {
    let spec: RuleFileSpec = serde_yaml::from_str(document)
        .map_err(|err| PolicyError::document(format!("malformed YAML: {err}")))?;

    let mut seen_ids = HashSet::with_capacity(spec.rules.len());
    let mut rules = Vec::with_capacity(spec.rules.len());

    for (index, rule) in spec.rules.into_iter().enumerate() {
        if rule.id.trim().is_empty() {
            return Err(PolicyError::rule(format!("#{index}"), "id must be non-empty"));
        }
        if !seen_ids.insert(rule.id.clone()) {
            return Err(PolicyError::rule(&rule.id, "duplicate rule id"));
        }
        if rule.priority > MAX_RULE_PRIORITY {
            return Err(PolicyError::rule(
                &rule.id,
                format!("priority {} exceeds {MAX_RULE_PRIORITY}", rule.priority),
            ));
        }

        let action: RuleAction = rule
            .action
            .parse()
            .map_err(|reason: String| PolicyError::rule(&rule.id, reason))?;

        if action != RuleAction::Allow && rule.reason.as_deref().unwrap_or("").trim().is_empty() {
            return Err(PolicyError::rule(
                &rule.id,
                format!("`{action}` rules require a reason"),
            ));
        }

        let condition = rule.conditions.compile(&rule.id)?;
        rules.push(SecurityRule::new(
            rule.id,
            rule.priority,
            action,
            rule.reason,
            rule.sample_guidance,
            condition,
        ));
    }

    Ok(RuleSet::new(rules))
}

/// Reads and parses the rule file at `path`.
///
/// # Errors
///
/// Returns [`PolicyError::Io`] when the file cannot be read, or any
/// [`parse_rules`] validation failure.
pub async fn load_rules_file(path: impl AsRef<Path>) -> PolicyResult<RuleSet> {
    let path = path.as_ref();
    let document = tokio::fs::read_to_string(path).await?;
    let set = parse_rules(&document)?;
    info!(path = %path.display(), rules = set.len(), "loaded rule file");
    Ok(set)
}
