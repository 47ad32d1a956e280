//! In-memory sink for tests and inspection.

use async_trait::async_trait;
use superego_primitives::AuditEntry;
use tokio::sync::Mutex;

use crate::sink::{AuditResult, AuditSink};

/// Collects audit entries in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything appended so far.
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().await.clone()
    }

    /// Removes and returns everything appended so far.
    pub async fn drain(&self) -> Vec<AuditEntry> {
        std::mem::take(&mut *self.entries.lock().await)
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, entry: &AuditEntry) -> AuditResult<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }
}
