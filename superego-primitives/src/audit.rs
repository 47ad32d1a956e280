//! Append-only audit record created once per served request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::Decision;
use crate::request::ToolRequest;

/// One audit record, written before the decision is returned to the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    id: Uuid,
    timestamp: DateTime<Utc>,
    request: ToolRequest,
    decision: Decision,
    rule_matches: Vec<String>,
}

impl AuditEntry {
    /// Creates an entry with a fresh id and the current wall-clock time.
    #[must_use]
    pub fn new(request: ToolRequest, decision: Decision, rule_matches: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request,
            decision,
            rule_matches,
        }
    }

    /// Returns the unique entry id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the entry creation time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the sanitized request that was evaluated.
    #[must_use]
    pub fn request(&self) -> &ToolRequest {
        &self.request
    }

    /// Returns the decision that was served.
    #[must_use]
    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    /// Returns ids of the rules that matched during evaluation.
    #[must_use]
    pub fn rule_matches(&self) -> &[String] {
        &self.rule_matches
    }
}
