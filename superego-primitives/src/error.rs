//! Shared error definitions with stable, externally visible codes.

use serde::Serialize;
use thiserror::Error;

/// Result alias used throughout the Superego crates.
pub type Result<T> = std::result::Result<T, SuperegoError>;

/// Errors surfaced by the policy decision service.
///
/// Raw error strings never reach callers directly; transports translate the
/// [`ErrorCode`] into the appropriate HTTP status or JSON-RPC error object
/// and keep the detailed reason in the server log.
#[derive(Debug, Error)]
pub enum SuperegoError {
    /// The inbound request failed validation before evaluation.
    #[error("invalid tool request: {reason}")]
    Validation {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// A rule predicate raised while being evaluated.
    #[error("rule evaluation failed: {reason}")]
    RuleEval {
        /// Additional context for the failure.
        reason: String,
    },

    /// The AI advisor could not produce a verdict.
    #[error("advisor unavailable: {reason}")]
    AdvisorUnavailable {
        /// What went wrong (timeout, breaker open, retries exhausted).
        reason: String,
    },

    /// The rule file or server configuration is invalid.
    #[error("invalid configuration: {reason}")]
    Config {
        /// First validation failure encountered.
        reason: String,
    },

    /// Unexpected internal failure.
    #[error("internal error: {reason}")]
    Internal {
        /// Additional context for logging; redacted from callers.
        reason: String,
    },
}

impl SuperegoError {
    /// Convenience constructor for validation failures.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for rule evaluation failures.
    #[must_use]
    pub fn rule_eval(reason: impl Into<String>) -> Self {
        Self::RuleEval {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for advisor failures.
    #[must_use]
    pub fn advisor_unavailable(reason: impl Into<String>) -> Self {
        Self::AdvisorUnavailable {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for configuration failures.
    #[must_use]
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for internal failures.
    #[must_use]
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Returns the stable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::RuleEval { .. } => ErrorCode::RuleEval,
            Self::AdvisorUnavailable { .. } => ErrorCode::AdvisorUnavailable,
            Self::Config { .. } => ErrorCode::Config,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }
}

/// Stable error codes exposed on every external error surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request, bad field type or length.
    Validation,
    /// A predicate raised during rule evaluation.
    RuleEval,
    /// Advisor timeout, breaker open, or retries exhausted.
    AdvisorUnavailable,
    /// Rule file or server configuration invalid.
    Config,
    /// Unexpected internal error.
    Internal,
}

impl ErrorCode {
    /// Returns the wire identifier for this code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "PARAM_001",
            Self::RuleEval => "RULE_EVAL_001",
            Self::AdvisorUnavailable => "AI_SVC_001",
            Self::Config => "CONFIG_001",
            Self::Internal => "INTERNAL_001",
        }
    }
}
