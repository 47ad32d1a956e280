//! Deterministic advisor for tests, demos, and advisor-less deployments.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use superego_primitives::{AdvisorVerdict, DecisionAction};
use superego_prompts::EvaluationPrompt;

use crate::client::{AdvisorClient, AdvisorError, AdvisorMetadata, AdvisorResult};

/// Advisor that answers from a script instead of a network.
///
/// The default verdict applies unless an override whose needle appears in
/// the prompt text matches first. A configurable number of leading calls
/// can be made to fail with transport errors, which is how the breaker and
/// retry tests drive failure sequences.
#[derive(Debug)]
pub struct MockAdvisor {
    metadata: AdvisorMetadata,
    default_verdict: AdvisorVerdict,
    overrides: Vec<(String, AdvisorVerdict)>,
    failures_remaining: Mutex<usize>,
    calls: AtomicUsize,
}

impl MockAdvisor {
    /// Creates a mock returning the supplied verdict for every prompt.
    #[must_use]
    pub fn new(default_verdict: AdvisorVerdict) -> Self {
        Self {
            metadata: AdvisorMetadata::new("mock", "scripted-v1"),
            default_verdict,
            overrides: Vec::new(),
            failures_remaining: Mutex::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Mock that allows everything with moderate confidence.
    #[must_use]
    pub fn allowing() -> Self {
        Self::new(AdvisorVerdict::new(
            DecisionAction::Allow,
            "mock advisor: no concerns identified",
            0.75,
        ))
    }

    /// Mock that denies everything with the given reason.
    #[must_use]
    pub fn denying(reason: impl Into<String>) -> Self {
        Self::new(AdvisorVerdict::new(DecisionAction::Deny, reason, 0.9))
    }

    /// Returns `verdict` whenever `needle` occurs in the prompt text.
    /// Overrides are checked in registration order.
    #[must_use]
    pub fn with_override(mut self, needle: impl Into<String>, verdict: AdvisorVerdict) -> Self {
        self.overrides.push((needle.into(), verdict));
        self
    }

    /// Makes the next `count` calls fail with a transport error.
    #[must_use]
    pub fn with_initial_failures(self, count: usize) -> Self {
        *self.failures_remaining.lock().expect("failure counter poisoned") = count;
        self
    }

    /// Re-arms transport failures at runtime.
    pub fn fail_next(&self, count: usize) {
        *self.failures_remaining.lock().expect("failure counter poisoned") = count;
    }

    /// Number of `advise` calls made so far, including failed ones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdvisorClient for MockAdvisor {
    fn metadata(&self) -> &AdvisorMetadata {
        &self.metadata
    }

    async fn advise(&self, prompt: &EvaluationPrompt) -> AdvisorResult<AdvisorVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        {
            let mut remaining = self.failures_remaining.lock().expect("failure counter poisoned");
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AdvisorError::transport("scripted transport failure"));
            }
        }

        for (needle, verdict) in &self.overrides {
            if prompt.text().contains(needle.as_str()) {
                return Ok(verdict.clone());
            }
        }
        Ok(self.default_verdict.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use superego_primitives::{RawToolRequest, ToolRequest};

    fn prompt(content: &str) -> EvaluationPrompt {
        let request = ToolRequest::normalize(RawToolRequest {
            tool_name: "Write".to_owned(),
            parameters: Some(json!({"content": content})),
            agent_id: "agent-1".to_owned(),
            session_id: "session-1".to_owned(),
            cwd: "/tmp".to_owned(),
            timestamp: None,
        })
        .expect("valid request");
        EvaluationPrompt::render(&request, "sample-writes", "writes need review", None)
    }

    #[tokio::test]
    async fn default_and_override_verdicts() {
        let advisor = MockAdvisor::allowing().with_override(
            "rm -rf",
            AdvisorVerdict::new(DecisionAction::Deny, "destructive", 0.95),
        );

        let benign = advisor.advise(&prompt("hello")).await.expect("verdict");
        assert_eq!(benign.decision, DecisionAction::Allow);

        let hostile = advisor.advise(&prompt("rm -rf /")).await.expect("verdict");
        assert_eq!(hostile.decision, DecisionAction::Deny);
        assert_eq!(advisor.call_count(), 2);
    }

    #[tokio::test]
    async fn scripted_failures_then_recovery() {
        let advisor = MockAdvisor::allowing().with_initial_failures(2);

        assert!(advisor.advise(&prompt("x")).await.is_err());
        assert!(advisor.advise(&prompt("x")).await.is_err());
        assert!(advisor.advise(&prompt("x")).await.is_ok());
    }
}
