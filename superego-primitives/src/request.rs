//! Inbound tool request model and sanitizer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SuperegoError};

/// Maximum accepted length for a tool name.
const MAX_TOOL_NAME_LEN: usize = 128;

/// Unvalidated request body as transports receive it.
///
/// Transports deserialize into this shape and call
/// [`ToolRequest::normalize`] before anything else touches the payload.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawToolRequest {
    /// Name of the capability the agent wants to invoke.
    #[serde(default)]
    pub tool_name: String,
    /// Tool parameters as an arbitrary JSON mapping.
    #[serde(default)]
    pub parameters: Option<Value>,
    /// Correlation token identifying the calling agent.
    #[serde(default)]
    pub agent_id: String,
    /// Correlation token identifying the agent session.
    #[serde(default)]
    pub session_id: String,
    /// Working directory of the caller.
    #[serde(default)]
    pub cwd: String,
    /// Optional client-supplied ingress timestamp.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A validated, sanitized tool request.
///
/// Invariant: a `ToolRequest` that survived [`ToolRequest::normalize`] is
/// byte-safe to render into audit logs and AI prompts: no NUL bytes, no
/// carriage returns, no `..` segments in parameter keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    tool_name: String,
    parameters: Map<String, Value>,
    agent_id: String,
    session_id: String,
    cwd: String,
    timestamp: DateTime<Utc>,
}

impl ToolRequest {
    /// Validates and sanitizes a raw request.
    ///
    /// # Errors
    ///
    /// Returns [`SuperegoError::Validation`] when `tool_name`, `agent_id`,
    /// `session_id`, or `cwd` is missing or malformed, or when `parameters`
    /// is present but not a JSON mapping.
    pub fn normalize(raw: RawToolRequest) -> Result<Self> {
        if raw.tool_name.is_empty() {
            return Err(SuperegoError::validation("tool_name is required"));
        }
        if !is_valid_tool_name(&raw.tool_name) {
            return Err(SuperegoError::validation(format!(
                "tool_name `{}` must match [A-Za-z0-9_.-] and be at most {MAX_TOOL_NAME_LEN} characters",
                raw.tool_name
            )));
        }
        if raw.agent_id.trim().is_empty() {
            return Err(SuperegoError::validation("agent_id is required"));
        }
        if raw.session_id.trim().is_empty() {
            return Err(SuperegoError::validation("session_id is required"));
        }
        if raw.cwd.trim().is_empty() {
            return Err(SuperegoError::validation("cwd is required"));
        }

        let parameters = match raw.parameters {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => sanitize_map(map),
            Some(other) => {
                return Err(SuperegoError::validation(format!(
                    "parameters must be a mapping, got {}",
                    value_kind(&other)
                )));
            }
        };

        Ok(Self {
            tool_name: raw.tool_name,
            parameters,
            agent_id: raw.agent_id,
            session_id: raw.session_id,
            cwd: raw.cwd,
            timestamp: raw.timestamp.unwrap_or_else(Utc::now),
        })
    }

    /// Returns the tool name.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns the sanitized parameter mapping.
    #[must_use]
    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    /// Looks up a parameter by dotted path (e.g. `file_path` or
    /// `options.recursive`). Returns `None` when any segment is missing.
    #[must_use]
    pub fn parameter(&self, dotted_path: &str) -> Option<&Value> {
        let mut segments = dotted_path.split('.');
        let mut current = self.parameters.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Returns the calling agent's correlation token.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Returns the session correlation token.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the caller's working directory.
    #[must_use]
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Returns the ingress timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

fn is_valid_tool_name(name: &str) -> bool {
    name.len() <= MAX_TOOL_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Recursively sanitizes a parameter value.
///
/// String leaves lose NUL and CR characters; mapping keys additionally lose
/// `..` path-escape segments. List ordering is preserved because command
/// argument vectors depend on it. Sanitization is lossy and idempotent:
/// `sanitize(sanitize(x)) == sanitize(x)`.
#[must_use]
pub fn sanitize_parameters(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_text(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_parameters).collect()),
        Value::Object(map) => Value::Object(sanitize_map(map)),
        other => other,
    }
}

fn sanitize_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| (sanitize_key(&key), sanitize_parameters(value)))
        .collect()
}

fn sanitize_text(text: &str) -> String {
    text.chars().filter(|c| *c != '\0' && *c != '\r').collect()
}

fn sanitize_key(key: &str) -> String {
    let mut cleaned = sanitize_text(key);
    while cleaned.contains("../") {
        cleaned = cleaned.replace("../", "");
    }
    while cleaned.contains("..") {
        cleaned = cleaned.replace("..", "");
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(tool_name: &str, parameters: Value) -> RawToolRequest {
        RawToolRequest {
            tool_name: tool_name.to_owned(),
            parameters: Some(parameters),
            agent_id: "agent-123".to_owned(),
            session_id: "session-456".to_owned(),
            cwd: "/workspace".to_owned(),
            timestamp: None,
        }
    }

    #[test]
    fn normalize_accepts_well_formed_request() {
        let request = ToolRequest::normalize(raw("Read", json!({"file_path": "/etc/hosts"})))
            .expect("valid request");

        assert_eq!(request.tool_name(), "Read");
        assert_eq!(
            request.parameter("file_path"),
            Some(&json!("/etc/hosts"))
        );
        assert_eq!(request.agent_id(), "agent-123");
    }

    #[test]
    fn normalize_rejects_missing_identity_fields() {
        let mut missing_agent = raw("Read", json!({}));
        missing_agent.agent_id = String::new();
        let err = ToolRequest::normalize(missing_agent).expect_err("agent_id required");
        assert!(matches!(err, SuperegoError::Validation { .. }));

        let mut missing_session = raw("Read", json!({}));
        missing_session.session_id = "  ".to_owned();
        assert!(ToolRequest::normalize(missing_session).is_err());

        let mut missing_cwd = raw("Read", json!({}));
        missing_cwd.cwd = String::new();
        assert!(ToolRequest::normalize(missing_cwd).is_err());
    }

    #[test]
    fn normalize_rejects_bad_tool_names() {
        assert!(ToolRequest::normalize(raw("", json!({}))).is_err());
        assert!(ToolRequest::normalize(raw("bad tool", json!({}))).is_err());
        assert!(ToolRequest::normalize(raw("shell;rm", json!({}))).is_err());
        assert!(ToolRequest::normalize(raw(&"x".repeat(129), json!({}))).is_err());
        assert!(ToolRequest::normalize(raw("mcp__server.tool-v2", json!({}))).is_ok());
    }

    #[test]
    fn normalize_rejects_non_mapping_parameters() {
        let err = ToolRequest::normalize(raw("Read", json!(["positional"])))
            .expect_err("list parameters rejected");
        assert!(err.to_string().contains("mapping"));
    }

    #[test]
    fn sanitizer_strips_hostile_keys_and_values() {
        let request = ToolRequest::normalize(raw(
            "Write",
            json!({
                "safe_param": "value",
                "../malicious": "path",
                "null_byte\u{0}": "bad\r\nvalue",
                "nested": {"inner/../bad": "x", "list": ["item\u{0}", "clean"]}
            }),
        ))
        .expect("sanitized request");

        assert!(request.parameters().contains_key("safe_param"));
        assert!(request.parameters().contains_key("malicious"));
        assert!(request.parameters().contains_key("null_byte"));
        assert_eq!(request.parameter("null_byte"), Some(&json!("bad\nvalue")));
        assert_eq!(request.parameter("nested.inner/bad"), Some(&json!("x")));
        assert_eq!(
            request.parameter("nested.list"),
            Some(&json!(["item", "clean"]))
        );

        let rendered = serde_json::to_string(request.parameters()).expect("serialize");
        assert!(!rendered.contains("\\u0000"));
        assert!(!rendered.contains("\\r"));
    }

    #[test]
    fn sanitization_is_idempotent() {
        let dirty = json!({
            "..key\u{0}": "line\rbreak",
            "deep": {"a..b/../c": ["\u{0}"]}
        });
        let once = sanitize_parameters(dirty);
        let twice = sanitize_parameters(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn list_ordering_is_preserved() {
        let request = ToolRequest::normalize(raw(
            "Bash",
            json!({"command": ["git", "commit", "-m", "msg"]}),
        ))
        .expect("valid request");

        assert_eq!(
            request.parameter("command"),
            Some(&json!(["git", "commit", "-m", "msg"]))
        );
    }

    #[test]
    fn server_assigns_timestamp_when_absent() {
        let before = Utc::now();
        let request = ToolRequest::normalize(raw("Read", json!({}))).expect("valid request");
        assert!(request.timestamp() >= before);
    }
}
