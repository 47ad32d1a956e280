//! Claude advisor calling the Anthropic messages API over HTTPS.

use std::sync::Arc;
use std::{env, fmt};

use async_trait::async_trait;
use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Body, Client, Request, Uri};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde::{Deserialize, Serialize};
use superego_primitives::{AdvisorVerdict, DecisionAction};
use superego_prompts::EvaluationPrompt;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::client::{AdvisorClient, AdvisorError, AdvisorMetadata, AdvisorResult};

/// Environment variable used when loading credentials automatically.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// System prompt establishing the advisor's role.
const SYSTEM_PROMPT: &str = "You are a security reviewer for AI agent tool requests. \
You receive one request and must return a strict JSON verdict. \
Prefer deny when in doubt.";

/// Configuration for the Claude advisor.
#[derive(Clone, Debug)]
pub struct ClaudeAdvisorConfig {
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl ClaudeAdvisorConfig {
    /// Creates a configuration using the supplied model identifier.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            model: model.into(),
            base_url: "https://api.anthropic.com/".to_owned(),
            max_tokens: 1024,
        }
    }

    /// Loads the API key from the `ANTHROPIC_API_KEY` environment variable.
    #[must_use]
    pub fn from_env(model: impl Into<String>) -> Self {
        let mut cfg = Self::new(model);
        cfg.api_key = env::var(ANTHROPIC_API_KEY_ENV).ok();
        cfg
    }

    /// Supplies an explicit API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the base URL used for API calls.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Configuration`] if the supplied URL is invalid.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> AdvisorResult<Self> {
        let mut base = base_url.as_ref().trim().to_owned();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(AdvisorError::configuration(
                "Claude base URL must start with http:// or https://",
            ));
        }
        if !base.ends_with('/') {
            base.push('/');
        }
        base.parse::<Uri>()
            .map_err(|err| AdvisorError::configuration(format!("invalid Claude base URL: {err}")))?;
        self.base_url = base;
        Ok(self)
    }

    /// Sets the completion token budget for verdicts.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Advisor backed by the Anthropic messages API.
pub struct ClaudeAdvisor {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    endpoint: Uri,
    metadata: AdvisorMetadata,
    api_key: String,
    max_tokens: u32,
}

/// HTTPS client trusting the bundled webpki roots.
fn https_client() -> Client<HttpsConnector<HttpConnector>, Body> {
    let anchors = TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    });
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(anchors);

    let tls = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut tcp = HttpConnector::new();
    tcp.enforce_http(false);

    Client::builder().build(HttpsConnector::from((tcp, Arc::new(tls))))
}

impl fmt::Debug for ClaudeAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaudeAdvisor")
            .field("model", &self.metadata.model())
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ClaudeAdvisor {
    /// Constructs a new advisor with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Configuration`] if the API key is missing.
    pub fn new(config: ClaudeAdvisorConfig) -> AdvisorResult<Self> {
        let api_key = config
            .api_key
            .ok_or_else(|| AdvisorError::configuration("Claude advisor requires an API key"))?;

        let metadata = AdvisorMetadata::new("claude", config.model);
        let endpoint = format!("{}v1/messages", config.base_url)
            .parse::<Uri>()
            .map_err(|err| AdvisorError::configuration(format!("invalid Claude endpoint: {err}")))?;

        Ok(Self {
            client: https_client(),
            endpoint,
            metadata,
            api_key,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl AdvisorClient for ClaudeAdvisor {
    fn metadata(&self) -> &AdvisorMetadata {
        &self.metadata
    }

    async fn advise(&self, prompt: &EvaluationPrompt) -> AdvisorResult<AdvisorVerdict> {
        let payload = MessagesRequest {
            model: self.metadata.model().to_owned(),
            system: SYSTEM_PROMPT,
            messages: vec![ClaudeMessage {
                role: "user",
                content: prompt.text().to_owned(),
            }],
            max_tokens: self.max_tokens,
            temperature: 0.0,
        };
        let body = serde_json::to_vec(&payload).map_err(|err| {
            AdvisorError::response(format!("failed to encode Claude request: {err}"))
        })?;

        let mut builder = Request::post(self.endpoint.clone());
        builder = builder.header(CONTENT_TYPE, "application/json");
        builder = builder.header("x-api-key", &self.api_key);
        builder = builder.header(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let request = builder
            .body(Body::from(body))
            .map_err(|err| AdvisorError::transport(format!("failed to build Claude request: {err}")))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|err| AdvisorError::transport(format!("Claude request failed: {err}")))?;

        let status = response.status();
        let bytes = to_bytes(response.into_body())
            .await
            .map_err(|err| AdvisorError::transport(format!("failed to read Claude response: {err}")))?;

        if !status.is_success() {
            let reason = String::from_utf8_lossy(&bytes).to_string();
            return Err(AdvisorError::transport(format!(
                "Claude returned {status}: {reason}"
            )));
        }

        let response: MessagesResponse = serde_json::from_slice(&bytes)
            .map_err(|err| AdvisorError::response(format!("failed to decode Claude response: {err}")))?;

        let text = response
            .content
            .into_iter()
            .map(|block| {
                let ContentBlock::Text { text } = block;
                text
            })
            .collect::<Vec<_>>()
            .join("\n");

        parse_verdict(&text)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    system: &'static str,
    messages: Vec<ClaudeMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct VerdictPayload {
    decision: String,
    reason: String,
    confidence: f64,
    #[serde(default)]
    risk_factors: Vec<String>,
}

/// Extracts the JSON verdict object from the model's reply, tolerating
/// prose or code fences around it.
fn parse_verdict(text: &str) -> AdvisorResult<AdvisorVerdict> {
    let start = text
        .find('{')
        .ok_or_else(|| AdvisorError::response("no JSON object in advisor reply"))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| AdvisorError::response("unterminated JSON object in advisor reply"))?;
    if end < start {
        return Err(AdvisorError::response("malformed JSON object in advisor reply"));
    }

    let payload: VerdictPayload = serde_json::from_str(&text[start..=end])
        .map_err(|err| AdvisorError::response(format!("invalid verdict JSON: {err}")))?;

    let decision = match payload.decision.as_str() {
        "allow" => DecisionAction::Allow,
        "deny" => DecisionAction::Deny,
        other => {
            return Err(AdvisorError::response(format!(
                "verdict decision must be allow or deny, got `{other}`"
            )));
        }
    };

    Ok(AdvisorVerdict::new(decision, payload.reason, payload.confidence)
        .with_risk_factors(payload.risk_factors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_requires_scheme() {
        let err = ClaudeAdvisorConfig::new("claude-sonnet-4-20250514")
            .with_base_url("api.anthropic.com")
            .expect_err("missing scheme should error");
        assert!(matches!(err, AdvisorError::Configuration { .. }));
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let err = ClaudeAdvisor::new(ClaudeAdvisorConfig::new("claude-sonnet-4-20250514"))
            .expect_err("api key required");
        assert!(matches!(err, AdvisorError::Configuration { .. }));
    }

    #[test]
    fn parses_a_bare_verdict_object() {
        let verdict = parse_verdict(
            r#"{"decision": "deny", "reason": "destructive command", "confidence": 0.95, "risk_factors": ["rm-rf"]}"#,
        )
        .expect("valid verdict");

        assert_eq!(verdict.decision, DecisionAction::Deny);
        assert_eq!(verdict.reason, "destructive command");
        assert_eq!(verdict.risk_factors, ["rm-rf"]);
    }

    #[test]
    fn parses_a_verdict_wrapped_in_prose() {
        let verdict = parse_verdict(
            "Here is my assessment:\n```json\n{\"decision\": \"allow\", \"reason\": \"benign\", \"confidence\": 0.7}\n```\n",
        )
        .expect("valid verdict");
        assert_eq!(verdict.decision, DecisionAction::Allow);
    }

    #[test]
    fn rejects_unknown_decisions_and_missing_json() {
        assert!(parse_verdict("I think this is fine.").is_err());
        assert!(
            parse_verdict(r#"{"decision": "maybe", "reason": "?", "confidence": 0.5}"#).is_err()
        );
    }
}
