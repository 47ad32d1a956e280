//! Evaluation prompt: request + rule context rendered in a fixed order.

use std::fmt::Write;

use superego_primitives::ToolRequest;

use crate::canonical::{canonical_parameters, evaluation_cache_key};

/// Schema instruction appended to every evaluation prompt.
const RESPONSE_SCHEMA: &str = r#"Respond with a single JSON object and nothing else:
{"decision": "allow" | "deny", "reason": "<short justification>", "confidence": <number in [0,1]>, "risk_factors": ["<short tag>", ...]}"#;

/// A rendered advisor prompt together with its cache key.
///
/// Section order is fixed (tool identity, parameters with keys sorted,
/// caller identity, working directory, the rule's stated concern, response
/// schema) so that identical inputs produce byte-identical prompts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluationPrompt {
    text: String,
    cache_key: String,
    rule_id: String,
}

impl EvaluationPrompt {
    /// Renders the prompt for a request that matched a `sample` rule.
    #[must_use]
    pub fn render(
        request: &ToolRequest,
        rule_id: &str,
        concern: &str,
        guidance: Option<&str>,
    ) -> Self {
        let mut text = String::with_capacity(512);
        text.push_str("Evaluate whether this agent tool request should proceed.\n");

        let _ = write!(text, "\n## Tool\n{}\n", request.tool_name());

        text.push_str("\n## Parameters\n");
        if request.parameters().is_empty() {
            text.push_str("(none)\n");
        } else {
            let mut entries: Vec<(&String, &serde_json::Value)> =
                request.parameters().iter().collect();
            entries.sort_unstable_by_key(|(key, _)| *key);
            for (key, value) in entries {
                let rendered = match value {
                    serde_json::Value::Object(map) => canonical_parameters(map),
                    other => other.to_string(),
                };
                let _ = writeln!(text, "{key}: {rendered}");
            }
        }

        let _ = write!(
            text,
            "\n## Caller\nagent: {}\nsession: {}\ncwd: {}\n",
            request.agent_id(),
            request.session_id(),
            request.cwd()
        );

        let _ = write!(text, "\n## Security concern\n{concern}\n");
        if let Some(guidance) = guidance {
            let _ = writeln!(text, "Guidance: {guidance}");
        }

        let _ = write!(text, "\n## Response format\n{RESPONSE_SCHEMA}\n");

        Self {
            text,
            cache_key: evaluation_cache_key(request.tool_name(), request.parameters(), rule_id),
            rule_id: rule_id.to_owned(),
        }
    }

    /// Returns the prompt text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the cache key for this evaluation.
    #[must_use]
    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Returns the id of the rule that triggered sampling.
    #[must_use]
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }
}
