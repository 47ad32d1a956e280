//! Audit sink trait and the tracing-backed reference sink.

use async_trait::async_trait;
use superego_primitives::AuditEntry;
use thiserror::Error;
use tracing::info;

/// Errors surfaced by audit sinks.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The underlying storage rejected the append.
    #[error("audit append failed: {source}")]
    Io {
        /// Underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The entry could not be encoded.
    #[error("audit entry could not be encoded: {source}")]
    Encode {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Result alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Append-only destination for decision records.
///
/// Implementations accept one append at a time; callers need no external
/// serialization.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError`] when the entry could not be persisted. The
    /// caller logs and continues: audit is attempted on every request but
    /// never blocks a decision.
    async fn append(&self, entry: &AuditEntry) -> AuditResult<()>;
}

/// Sink that emits entries as structured log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        info!(
            audit_id = %entry.id(),
            tool_name = entry.request().tool_name(),
            agent_id = entry.request().agent_id(),
            session_id = entry.request().session_id(),
            action = entry.decision().action().as_str(),
            rule_id = entry.decision().rule_id(),
            confidence = entry.decision().confidence(),
            "decision served"
        );
        Ok(())
    }
}
