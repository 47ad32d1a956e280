//! Multi-transport front-end for the Superego decision engine.
//!
//! The transports are message framers and nothing more: each one parses
//! its own framing into a [`RawToolRequest`](superego_primitives::RawToolRequest),
//! calls the shared [`EvaluationService`], and serializes the resulting
//! [`Decision`](superego_primitives::Decision) back out. The same request
//! yields the same decision regardless of transport.

#![warn(missing_docs, clippy::pedantic)]

mod config;
mod health;
mod http;
mod server;
mod service;
mod stdio;
mod ws;

pub use config::{AdvisorProvider, ServerConfig, TransportKind};
pub use health::{HealthMonitor, HealthReport, HealthState};
pub use http::{AppState, router};
pub use server::{ServerContext, run};
pub use service::{EvaluationService, ServerInfo};
pub use stdio::{MessageProcessor, run_stdio};
