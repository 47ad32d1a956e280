//! Superego: inline security-policy decisions for AI coding agents.
//!
//! Depend on this crate via `cargo add superego`. It bundles the service
//! crates behind feature flags so embedders can pull in only the layers
//! they need, e.g. the policy engine without the transports.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared domain types for convenience.
pub use superego_primitives as primitives;

/// Rule store, predicate evaluator, and decision engine (enabled by `policy`).
#[cfg(feature = "policy")]
pub use superego_policy as policy;

/// Deterministic advisor prompt rendering (enabled by `prompts`).
#[cfg(feature = "prompts")]
pub use superego_prompts as prompts;

/// AI advisor clients and resilience layer (enabled by `advisor`).
#[cfg(feature = "advisor")]
pub use superego_advisor as advisor;

/// Append-only audit sinks (enabled by `audit`).
#[cfg(feature = "audit")]
pub use superego_audit as audit;

/// Transports, health monitoring, and server wiring (enabled by `server`).
#[cfg(feature = "server")]
pub use superego_server as server;
