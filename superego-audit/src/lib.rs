//! Append-only audit sinks for served decisions.
//!
//! The engine writes one [`AuditEntry`](superego_primitives::AuditEntry)
//! per request before responding. Sinks are best-effort: a failed append is
//! logged by the caller and never alters the decision.

#![warn(missing_docs, clippy::pedantic)]

mod file;
mod memory;
mod sink;

pub use file::NdjsonAuditSink;
pub use memory::InMemoryAuditSink;
pub use sink::{AuditError, AuditResult, AuditSink, TracingAuditSink};
