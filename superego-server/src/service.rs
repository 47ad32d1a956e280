//! The one evaluation entry point shared by every transport.

use serde::Serialize;
use superego_policy::PolicyEngine;
use superego_primitives::{Decision, RawToolRequest, Result, ToolRequest};
use tracing::info;

/// Static facts about this server instance, surfaced via `get_server_info`
/// and `GET /info`.
#[derive(Clone, Debug, Serialize)]
pub struct ServerInfo {
    name: &'static str,
    version: &'static str,
    description: &'static str,
    transports: Vec<&'static str>,
    rules_file: String,
    hot_reload: bool,
}

impl ServerInfo {
    /// Describes the running instance.
    #[must_use]
    pub fn new(transports: Vec<&'static str>, rules_file: String, hot_reload: bool) -> Self {
        Self {
            name: "superego",
            version: env!("CARGO_PKG_VERSION"),
            description: "Inline security-policy decisions for AI coding agents",
            transports,
            rules_file,
            hot_reload,
        }
    }

    /// Returns the server name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the crate version.
    #[must_use]
    pub const fn version(&self) -> &'static str {
        self.version
    }
}

/// Shared evaluation service: sanitize, evaluate, respond.
///
/// Transports own framing only; everything from validation onward happens
/// here so that all front-ends produce identical decisions.
pub struct EvaluationService {
    engine: PolicyEngine,
    info: ServerInfo,
}

impl EvaluationService {
    /// Wires the service from the engine and instance facts.
    #[must_use]
    pub fn new(engine: PolicyEngine, info: ServerInfo) -> Self {
        Self { engine, info }
    }

    /// Normalizes a raw transport payload and evaluates it.
    ///
    /// # Errors
    ///
    /// Returns [`SuperegoError::Validation`](superego_primitives::SuperegoError)
    /// when the payload fails normalization. Policy and advisor failures do
    /// not surface here; the engine resolves them to a decision.
    pub async fn evaluate_raw(&self, raw: RawToolRequest) -> Result<Decision> {
        let request = ToolRequest::normalize(raw)?;
        Ok(self.evaluate(&request).await)
    }

    /// Evaluates an already-normalized request.
    pub async fn evaluate(&self, request: &ToolRequest) -> Decision {
        info!(
            tool_name = request.tool_name(),
            agent_id = request.agent_id(),
            session_id = request.session_id(),
            "evaluating tool request"
        );
        let decision = self.engine.evaluate(request).await;
        info!(
            tool_name = request.tool_name(),
            action = decision.action().as_str(),
            rule_id = decision.rule_id(),
            confidence = decision.confidence(),
            "tool request evaluated"
        );
        decision
    }

    /// Returns instance facts for the info surfaces.
    #[must_use]
    pub const fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Returns the underlying engine.
    #[must_use]
    pub const fn engine(&self) -> &PolicyEngine {
        &self.engine
    }
}
