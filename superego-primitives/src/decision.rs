//! Decision types returned by the policy engine and the AI advisor.

use serde::{Deserialize, Serialize};

/// Externally visible verdict for one tool request.
///
/// `sample` is an internal rule action only; a sampled request always
/// resolves to `Allow` or `Deny` before it leaves the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    /// The host may proceed with the tool invocation.
    Allow,
    /// The host must refuse the tool invocation.
    Deny,
}

impl DecisionAction {
    /// Returns the wire spelling of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

/// Maximum number of advisor reason bytes surfaced to callers.
const MAX_ADVISOR_REASON_BYTES: usize = 1024;

/// Structured verdict returned by an AI advisor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdvisorVerdict {
    /// The advisor's allow/deny call.
    pub decision: DecisionAction,
    /// The advisor's stated justification.
    pub reason: String,
    /// Advisor-supplied confidence; clamped to `[0, 1]` on ingestion.
    pub confidence: f64,
    /// Short risk tags identified by the advisor.
    #[serde(default)]
    pub risk_factors: Vec<String>,
}

impl AdvisorVerdict {
    /// Creates a verdict, clamping confidence into `[0, 1]`.
    #[must_use]
    pub fn new(decision: DecisionAction, reason: impl Into<String>, confidence: f64) -> Self {
        Self {
            decision,
            reason: reason.into(),
            confidence: confidence.clamp(0.0, 1.0),
            risk_factors: Vec::new(),
        }
    }

    /// Attaches risk factor tags to the verdict.
    #[must_use]
    pub fn with_risk_factors<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.risk_factors = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// The engine's verdict for one evaluated request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    action: DecisionAction,
    reason: String,
    #[serde(default)]
    rule_id: String,
    confidence: f64,
    #[serde(default)]
    processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ai_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ai_model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    risk_factors: Vec<String>,
}

impl Decision {
    /// Rule-driven allow with full confidence.
    #[must_use]
    pub fn rule_allow(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::rule_driven(DecisionAction::Allow, rule_id, reason)
    }

    /// Rule-driven deny with full confidence.
    #[must_use]
    pub fn rule_deny(rule_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::rule_driven(DecisionAction::Deny, rule_id, reason)
    }

    fn rule_driven(
        action: DecisionAction,
        rule_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action,
            reason: reason.into(),
            rule_id: rule_id.into(),
            confidence: 1.0,
            processing_time_ms: 0,
            ai_provider: None,
            ai_model: None,
            risk_factors: Vec::new(),
        }
    }

    /// Fail-closed default applied when no rule matches.
    #[must_use]
    pub fn default_deny() -> Self {
        Self::rule_deny("", "no matching rule")
    }

    /// Advisor-driven decision for a `sample` rule match.
    ///
    /// The advisor's reason is surfaced verbatim, truncated at a UTF-8
    /// boundary to 1 KiB.
    #[must_use]
    pub fn from_advisor(
        rule_id: impl Into<String>,
        verdict: AdvisorVerdict,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            action: verdict.decision,
            reason: truncate_utf8(verdict.reason, MAX_ADVISOR_REASON_BYTES),
            rule_id: rule_id.into(),
            confidence: verdict.confidence.clamp(0.0, 1.0),
            processing_time_ms: 0,
            ai_provider: Some(provider.into()),
            ai_model: Some(model.into()),
            risk_factors: verdict.risk_factors,
        }
    }

    /// Decision applied when the advisor is unavailable and the configured
    /// `sample_failure_mode` kicks in. Confidence is pinned to zero.
    #[must_use]
    pub fn sample_failure(
        rule_id: impl Into<String>,
        action: DecisionAction,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            action,
            reason: reason.into(),
            rule_id: rule_id.into(),
            confidence: 0.0,
            processing_time_ms: 0,
            ai_provider: None,
            ai_model: None,
            risk_factors: Vec::new(),
        }
    }

    /// Records the wall-clock time the engine spent on this request.
    pub fn set_processing_time_ms(&mut self, elapsed_ms: u64) {
        self.processing_time_ms = elapsed_ms;
    }

    /// Returns the verdict action.
    #[must_use]
    pub const fn action(&self) -> DecisionAction {
        self.action
    }

    /// Returns `true` when the decision allows the request.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        self.action == DecisionAction::Allow
    }

    /// Returns `true` when the decision denies the request.
    #[must_use]
    pub fn is_deny(&self) -> bool {
        self.action == DecisionAction::Deny
    }

    /// Returns the justification attached to the decision.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the id of the rule that produced the verdict, or the empty
    /// string when the default policy fired.
    #[must_use]
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    /// Returns the confidence in `[0, 1]`.
    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Returns the recorded processing time in milliseconds.
    #[must_use]
    pub const fn processing_time_ms(&self) -> u64 {
        self.processing_time_ms
    }

    /// Returns the advisor provider for AI-driven decisions.
    #[must_use]
    pub fn ai_provider(&self) -> Option<&str> {
        self.ai_provider.as_deref()
    }

    /// Returns the advisor model for AI-driven decisions.
    #[must_use]
    pub fn ai_model(&self) -> Option<&str> {
        self.ai_model.as_deref()
    }

    /// Returns risk factor tags supplied by the advisor.
    #[must_use]
    pub fn risk_factors(&self) -> &[String] {
        &self.risk_factors
    }
}

fn truncate_utf8(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_driven_decisions_have_full_confidence() {
        let allow = Decision::rule_allow("allow-safe-reads", "safe read");
        assert!(allow.is_allow());
        assert!((allow.confidence() - 1.0).abs() < f64::EPSILON);
        assert_eq!(allow.rule_id(), "allow-safe-reads");

        let deny = Decision::rule_deny("deny-etc-shadow", "system password file");
        assert!(deny.is_deny());
        assert_eq!(deny.reason(), "system password file");
    }

    #[test]
    fn default_deny_is_fail_closed() {
        let decision = Decision::default_deny();
        assert!(decision.is_deny());
        assert_eq!(decision.rule_id(), "");
        assert_eq!(decision.reason(), "no matching rule");
    }

    #[test]
    fn advisor_decisions_carry_provenance() {
        let verdict = AdvisorVerdict::new(DecisionAction::Allow, "content is benign", 0.82)
            .with_risk_factors(["file-write"]);
        let decision = Decision::from_advisor("sample-writes", verdict, "claude", "sonnet");

        assert!(decision.is_allow());
        assert_eq!(decision.ai_provider(), Some("claude"));
        assert_eq!(decision.ai_model(), Some("sonnet"));
        assert_eq!(decision.risk_factors(), ["file-write"]);
    }

    #[test]
    fn advisor_confidence_is_clamped() {
        let verdict = AdvisorVerdict::new(DecisionAction::Deny, "risky", 7.5);
        assert!((verdict.confidence - 1.0).abs() < f64::EPSILON);

        let verdict = AdvisorVerdict::new(DecisionAction::Deny, "risky", -0.3);
        assert!(verdict.confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn advisor_reason_is_truncated_to_one_kib() {
        let long_reason = "é".repeat(2000);
        let verdict = AdvisorVerdict::new(DecisionAction::Deny, long_reason, 0.9);
        let decision = Decision::from_advisor("r", verdict, "claude", "sonnet");

        assert!(decision.reason().len() <= 1024);
        assert!(decision.reason().chars().all(|c| c == 'é'));
    }

    #[test]
    fn sample_failure_has_zero_confidence() {
        let decision =
            Decision::sample_failure("sample-writes", DecisionAction::Deny, "advisor timed out");
        assert!(decision.is_deny());
        assert!(decision.confidence().abs() < f64::EPSILON);
        assert_eq!(decision.rule_id(), "sample-writes");
    }

    #[test]
    fn serialization_omits_absent_advisor_fields() {
        let decision = Decision::rule_deny("r1", "nope");
        let wire = serde_json::to_value(&decision).expect("serialize");
        assert_eq!(wire["action"], "deny");
        assert!(wire.get("ai_provider").is_none());
        assert!(wire.get("risk_factors").is_none());
    }
}
