//! Core domain types for the Superego policy decision service.
//!
//! Every transport funnels into the same `ToolRequest` shape defined here,
//! and every caller receives the same `Decision` shape back. Keeping the
//! domain types in one dependency-light crate lets the policy engine, the
//! advisor client, and the transports agree on wire semantics without
//! depending on each other.

#![warn(missing_docs, clippy::pedantic)]

mod audit;
mod decision;
mod error;
mod request;

pub use audit::AuditEntry;
pub use decision::{AdvisorVerdict, Decision, DecisionAction};
pub use error::{ErrorCode, Result, SuperegoError};
pub use request::{RawToolRequest, ToolRequest, sanitize_parameters};
