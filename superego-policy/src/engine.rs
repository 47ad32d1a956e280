//! The decision engine: first-match rule scan with fail-closed default.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use superego_audit::AuditSink;
use superego_primitives::{
    AdvisorVerdict, AuditEntry, Decision, DecisionAction, SuperegoError, ToolRequest,
};
use tracing::{debug, warn};

use crate::rule::{RuleAction, SecurityRule};
use crate::store::RuleStore;

/// What a sample evaluation produced, with advisor provenance.
#[derive(Clone, Debug)]
pub struct AdvisorOutcome {
    /// The advisor's structured verdict.
    pub verdict: AdvisorVerdict,
    /// Provider identifier (e.g. `claude`, `mock`).
    pub provider: String,
    /// Concrete model identifier.
    pub model: String,
}

/// Evaluates `sample` rule matches.
///
/// The engine stays advisor-agnostic behind this seam: production wires in
/// the resilient AI advisor, tests wire in a deterministic stand-in.
#[async_trait]
pub trait SampleEvaluator: Send + Sync {
    /// Produces a verdict for a request that matched a `sample` rule.
    ///
    /// # Errors
    ///
    /// Returns [`SuperegoError::AdvisorUnavailable`] when no verdict could
    /// be obtained; the engine then applies the configured failure mode.
    async fn evaluate_sample(
        &self,
        request: &ToolRequest,
        rule: &SecurityRule,
    ) -> Result<AdvisorOutcome, SuperegoError>;
}

/// Reason attached to rule-driven allows when the rule states none.
const ALLOW_FALLBACK_REASON: &str = "allowed by rule";

/// The shared policy decision engine.
///
/// Every transport calls [`PolicyEngine::evaluate`]; the engine snapshots
/// the rule set, finds the first matching rule in `(priority, load order)`
/// order, resolves `sample` actions through the advisor, applies the
/// fail-closed default when nothing matches, and writes the audit entry
/// before returning.
pub struct PolicyEngine {
    store: Arc<RuleStore>,
    sampler: Arc<dyn SampleEvaluator>,
    audit: Arc<dyn AuditSink>,
    sample_failure_mode: DecisionAction,
}

impl PolicyEngine {
    /// Wires an engine from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<RuleStore>,
        sampler: Arc<dyn SampleEvaluator>,
        audit: Arc<dyn AuditSink>,
        sample_failure_mode: DecisionAction,
    ) -> Self {
        Self {
            store,
            sampler,
            audit,
            sample_failure_mode,
        }
    }

    /// Returns the rule store backing this engine.
    #[must_use]
    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    /// Evaluates one sanitized request to a final decision.
    pub async fn evaluate(&self, request: &ToolRequest) -> Decision {
        let started = Instant::now();
        let snapshot = self.store.current();

        let matched = snapshot.rules().iter().find(|rule| rule.matches(request));

        let mut decision = match matched {
            Some(rule) => {
                debug!(
                    rule_id = rule.id(),
                    action = %rule.action(),
                    tool_name = request.tool_name(),
                    "rule matched"
                );
                match rule.action() {
                    RuleAction::Allow => Decision::rule_allow(
                        rule.id(),
                        rule.reason().unwrap_or(ALLOW_FALLBACK_REASON),
                    ),
                    RuleAction::Deny => {
                        Decision::rule_deny(rule.id(), rule.reason().unwrap_or_default())
                    }
                    RuleAction::Sample => self.sample(request, rule).await,
                }
            }
            None => Decision::default_deny(),
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        decision.set_processing_time_ms(elapsed_ms);

        let rule_matches = matched.map(|rule| rule.id().to_owned()).into_iter().collect();
        let entry = AuditEntry::new(request.clone(), decision.clone(), rule_matches);
        if let Err(err) = self.audit.append(&entry).await {
            warn!(audit_id = %entry.id(), error = %err, "audit append failed");
        }

        decision
    }

    async fn sample(&self, request: &ToolRequest, rule: &SecurityRule) -> Decision {
        match self.sampler.evaluate_sample(request, rule).await {
            Ok(outcome) => {
                Decision::from_advisor(rule.id(), outcome.verdict, outcome.provider, outcome.model)
            }
            Err(err) => {
                warn!(
                    rule_id = rule.id(),
                    tool_name = request.tool_name(),
                    error = %err,
                    fail_mode = self.sample_failure_mode.as_str(),
                    "sample evaluation failed; applying failure mode"
                );
                Decision::sample_failure(rule.id(), self.sample_failure_mode, err.to_string())
            }
        }
    }
}
