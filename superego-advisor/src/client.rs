//! Advisor trait and shared data structures.

use std::time::Duration;

use async_trait::async_trait;
use superego_primitives::{AdvisorVerdict, SuperegoError};
use superego_prompts::EvaluationPrompt;
use thiserror::Error;

/// Result alias used by advisor implementations.
pub type AdvisorResult<T> = Result<T, AdvisorError>;

/// Error type shared by advisor implementations and the resilience layer.
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// Advisor is misconfigured or missing credentials.
    #[error("advisor not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// Transport-level failure (network, protocol).
    #[error("advisor transport error: {reason}")]
    Transport {
        /// Additional context about the error.
        reason: String,
    },

    /// The advisor returned something that is not a verdict.
    #[error("advisor response error: {reason}")]
    Response {
        /// Additional context about the response failure.
        reason: String,
    },

    /// The call exceeded its deadline.
    #[error("advisor call timed out after {after:?}")]
    Timeout {
        /// The enforced deadline.
        after: Duration,
    },

    /// The circuit breaker is open; the call was short-circuited.
    #[error("advisor circuit breaker open")]
    BreakerOpen,

    /// Too many concurrent advisor calls are queued.
    #[error("advisor call queue full")]
    Overloaded,
}

impl AdvisorError {
    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for malformed responses.
    #[must_use]
    pub fn response(reason: impl Into<String>) -> Self {
        Self::Response {
            reason: reason.into(),
        }
    }

    /// Returns `true` for failures worth retrying on a fresh connection.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

impl From<AdvisorError> for SuperegoError {
    fn from(err: AdvisorError) -> Self {
        Self::advisor_unavailable(err.to_string())
    }
}

/// Identifies an advisor instance for decision provenance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvisorMetadata {
    provider: &'static str,
    model: String,
}

impl AdvisorMetadata {
    /// Creates metadata for the supplied provider and model identifier.
    #[must_use]
    pub fn new(provider: &'static str, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Returns the provider identifier (e.g. `claude`, `mock`).
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    /// Returns the configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Trait implemented by all advisors.
///
/// Implementations perform one upstream call per `advise` invocation and
/// return a structured verdict; deadlines, retries, and caching are the
/// resilience layer's concern.
#[async_trait]
pub trait AdvisorClient: Send + Sync {
    /// Returns metadata identifying this advisor instance.
    fn metadata(&self) -> &AdvisorMetadata;

    /// Produces a verdict for the rendered evaluation prompt.
    async fn advise(&self, prompt: &EvaluationPrompt) -> AdvisorResult<AdvisorVerdict>;
}
