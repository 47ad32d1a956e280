//! AI advisor clients and the resilience layer around them.
//!
//! An advisor is an unreliable external service. The engine never talks to
//! one directly: the [`ResilientAdvisor`] wrapper enforces the deadline,
//! retry, circuit-breaker, cache, and fan-out policy, and plugs into the
//! policy engine as its
//! [`SampleEvaluator`](superego_policy::SampleEvaluator).

#![warn(missing_docs, clippy::pedantic)]

mod breaker;
mod cache;
mod claude;
mod client;
mod mock;
mod resilience;

pub use breaker::{BreakerSnapshot, BreakerState, CircuitBreaker};
pub use cache::VerdictCache;
pub use claude::{ClaudeAdvisor, ClaudeAdvisorConfig, ANTHROPIC_API_KEY_ENV};
pub use client::{AdvisorClient, AdvisorError, AdvisorMetadata, AdvisorResult};
pub use mock::MockAdvisor;
pub use resilience::{ResilienceConfig, ResilientAdvisor};
