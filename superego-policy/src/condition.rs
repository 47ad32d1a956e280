//! Condition tree: declarative spec and compiled, evaluatable form.
//!
//! Conditions are deserialized from the rule file as [`ConditionSpec`]
//! (a permissive shape that mirrors the YAML) and compiled into
//! [`Condition`] at load time. Compilation validates operators, pre-compiles
//! regexes, and desugars the `parameters:` shorthand, so evaluation on the
//! request path is infallible and allocation-light.

use std::borrow::Cow;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use superego_primitives::ToolRequest;

use crate::rule::{PolicyError, PolicyResult};

/// Unvalidated condition node as it appears in the rule file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionSpec {
    /// Field selector for a leaf match.
    #[serde(default)]
    pub field: Option<String>,
    /// Operator name for a leaf match.
    #[serde(default)]
    pub op: Option<String>,
    /// Operand for a leaf match.
    #[serde(default)]
    pub value: Option<Value>,
    /// Conjunction of child conditions.
    #[serde(default)]
    pub all_of: Option<Vec<ConditionSpec>>,
    /// Disjunction of child conditions.
    #[serde(default)]
    pub any_of: Option<Vec<ConditionSpec>>,
    /// Negation of a child condition.
    #[serde(default, rename = "not")]
    pub not_: Option<Box<ConditionSpec>>,
    /// Parameter-shape shorthand, desugared to an `all_of` of field matches.
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
}

impl ConditionSpec {
    /// Compiles the spec into an evaluatable condition.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidRule`] when the node mixes kinds,
    /// names an unknown field or operator, or carries a mistyped operand
    /// (including regexes that fail to compile).
    pub fn compile(&self, rule_id: &str) -> PolicyResult<Condition> {
        let mut kinds = 0;
        kinds += usize::from(self.field.is_some() || self.op.is_some() || self.value.is_some());
        kinds += usize::from(self.all_of.is_some());
        kinds += usize::from(self.any_of.is_some());
        kinds += usize::from(self.not_.is_some());
        kinds += usize::from(self.parameters.is_some());
        if kinds != 1 {
            return Err(PolicyError::rule(
                rule_id,
                "condition must be exactly one of: a field match, all_of, any_of, not, or parameters",
            ));
        }

        if let Some(children) = &self.all_of {
            return Ok(Condition::AllOf(compile_children(children, rule_id)?));
        }
        if let Some(children) = &self.any_of {
            return Ok(Condition::AnyOf(compile_children(children, rule_id)?));
        }
        if let Some(child) = &self.not_ {
            return Ok(Condition::Not(Box::new(child.compile(rule_id)?)));
        }
        if let Some(shape) = &self.parameters {
            return compile_parameter_shape(shape, rule_id);
        }

        let field = self
            .field
            .as_deref()
            .ok_or_else(|| PolicyError::rule(rule_id, "field match requires `field`"))?;
        let op = self
            .op
            .as_deref()
            .ok_or_else(|| PolicyError::rule(rule_id, "field match requires `op`"))?;
        let value = self
            .value
            .clone()
            .ok_or_else(|| PolicyError::rule(rule_id, "field match requires `value`"))?;

        Ok(Condition::Field(FieldMatch {
            field: FieldPath::parse(field, rule_id)?,
            op: MatchOp::compile(op, value, rule_id)?,
        }))
    }
}

fn compile_children(children: &[ConditionSpec], rule_id: &str) -> PolicyResult<Vec<Condition>> {
    if children.is_empty() {
        return Err(PolicyError::rule(rule_id, "composite condition is empty"));
    }
    children.iter().map(|c| c.compile(rule_id)).collect()
}

/// Desugars `parameters: { key: <match> }` into an `all_of` of field
/// matches on `parameters.<key>`. A scalar match value means `equals`; a
/// mapping with an `op` key selects the operator explicitly.
fn compile_parameter_shape(shape: &Map<String, Value>, rule_id: &str) -> PolicyResult<Condition> {
    if shape.is_empty() {
        return Err(PolicyError::rule(rule_id, "parameters shorthand is empty"));
    }

    let mut children = Vec::with_capacity(shape.len());
    for (key, matcher) in shape {
        let field = FieldPath::Parameter(key.clone());
        let op = match matcher {
            Value::Object(spec) if spec.contains_key("op") => {
                let op_name = spec
                    .get("op")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PolicyError::rule(rule_id, "parameter match `op` must be a string"))?;
                let operand = spec.get("value").cloned().ok_or_else(|| {
                    PolicyError::rule(rule_id, "parameter match requires `value`")
                })?;
                MatchOp::compile(op_name, operand, rule_id)?
            }
            scalar => MatchOp::Equals(scalar.clone()),
        };
        children.push(Condition::Field(FieldMatch { field, op }));
    }

    Ok(if children.len() == 1 {
        children.remove(0)
    } else {
        Condition::AllOf(children)
    })
}

/// Compiled, evaluatable condition tree.
#[derive(Clone, Debug)]
pub enum Condition {
    /// Leaf match against one request field.
    Field(FieldMatch),
    /// Every child must match.
    AllOf(Vec<Condition>),
    /// At least one child must match.
    AnyOf(Vec<Condition>),
    /// The child must not match.
    Not(Box<Condition>),
}

impl Condition {
    /// Builds a leaf field match. Primarily useful in tests.
    #[must_use]
    pub fn field(field: FieldPath, op: MatchOp) -> Self {
        Self::Field(FieldMatch { field, op })
    }

    /// Evaluates the tree against a request.
    #[must_use]
    pub fn evaluate(&self, request: &ToolRequest) -> bool {
        match self {
            Self::Field(leaf) => leaf.evaluate(request),
            Self::AllOf(children) => children.iter().all(|c| c.evaluate(request)),
            Self::AnyOf(children) => children.iter().any(|c| c.evaluate(request)),
            Self::Not(child) => !child.evaluate(request),
        }
    }
}

/// Leaf condition: one field, one operator, one operand.
#[derive(Clone, Debug)]
pub struct FieldMatch {
    field: FieldPath,
    op: MatchOp,
}

impl FieldMatch {
    fn evaluate(&self, request: &ToolRequest) -> bool {
        let value = self.field.resolve(request);
        match (&self.op, value) {
            // `not_equals` against a missing field is documented to match.
            (MatchOp::NotEquals(_), None) => true,
            (_, None) => false,
            (op, Some(value)) => op.evaluate(value.as_ref()),
        }
    }
}

/// Addressable request fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldPath {
    /// The request's tool name.
    ToolName,
    /// The caller's working directory.
    Cwd,
    /// The calling agent's correlation token.
    AgentId,
    /// The session correlation token.
    SessionId,
    /// A dotted path into the parameter mapping.
    Parameter(String),
}

impl FieldPath {
    fn parse(field: &str, rule_id: &str) -> PolicyResult<Self> {
        match field {
            "tool_name" => Ok(Self::ToolName),
            "cwd" => Ok(Self::Cwd),
            "agent_id" => Ok(Self::AgentId),
            "session_id" => Ok(Self::SessionId),
            other => match other.strip_prefix("parameters.") {
                Some(path) if !path.is_empty() => Ok(Self::Parameter(path.to_owned())),
                _ => Err(PolicyError::rule(
                    rule_id,
                    format!(
                        "unknown field `{other}`; valid: tool_name, cwd, agent_id, session_id, parameters.<path>"
                    ),
                )),
            },
        }
    }

    fn resolve<'a>(&self, request: &'a ToolRequest) -> Option<Cow<'a, Value>> {
        let text = match self {
            Self::ToolName => request.tool_name(),
            Self::Cwd => request.cwd(),
            Self::AgentId => request.agent_id(),
            Self::SessionId => request.session_id(),
            Self::Parameter(path) => return request.parameter(path).map(Cow::Borrowed),
        };
        Some(Cow::Owned(Value::String(text.to_owned())))
    }
}

/// Compiled match operator with its operand.
#[derive(Clone, Debug)]
pub enum MatchOp {
    /// Deep JSON equality.
    Equals(Value),
    /// Negated equality; matches when the field is absent.
    NotEquals(Value),
    /// Anchored regular expression over the field's text form.
    Matches(Regex),
    /// Substring match on strings; element membership on lists.
    Contains(Value),
    /// Prefix match over the field's text form.
    StartsWith(String),
    /// Suffix match over the field's text form.
    EndsWith(String),
    /// Membership of the field value in the operand list.
    In(Vec<Value>),
    /// Numeric greater-than; fails the node when either side is non-numeric.
    Gt(f64),
    /// Numeric less-than; fails the node when either side is non-numeric.
    Lt(f64),
}

impl MatchOp {
    fn compile(op: &str, value: Value, rule_id: &str) -> PolicyResult<Self> {
        match op {
            "equals" => Ok(Self::Equals(value)),
            "not_equals" => Ok(Self::NotEquals(value)),
            "matches" => {
                let pattern = value.as_str().ok_or_else(|| {
                    PolicyError::rule(rule_id, "`matches` requires a string pattern")
                })?;
                let anchored = format!("^(?:{pattern})$");
                let regex = Regex::new(&anchored).map_err(|err| {
                    PolicyError::rule(rule_id, format!("invalid regex `{pattern}`: {err}"))
                })?;
                Ok(Self::Matches(regex))
            }
            "contains" => Ok(Self::Contains(value)),
            "starts_with" => Ok(Self::StartsWith(require_string(op, value, rule_id)?)),
            "ends_with" => Ok(Self::EndsWith(require_string(op, value, rule_id)?)),
            "in" => match value {
                Value::Array(items) if !items.is_empty() => Ok(Self::In(items)),
                Value::Array(_) => Err(PolicyError::rule(rule_id, "`in` list is empty")),
                _ => Err(PolicyError::rule(rule_id, "`in` requires a list operand")),
            },
            "gt" => Ok(Self::Gt(require_number(op, &value, rule_id)?)),
            "lt" => Ok(Self::Lt(require_number(op, &value, rule_id)?)),
            other => Err(PolicyError::rule(
                rule_id,
                format!(
                    "unknown operator `{other}`; valid: equals, not_equals, matches, contains, starts_with, ends_with, in, gt, lt"
                ),
            )),
        }
    }

    fn evaluate(&self, value: &Value) -> bool {
        match self {
            Self::Equals(operand) => value == operand,
            Self::NotEquals(operand) => value != operand,
            Self::Matches(regex) => {
                as_text(value).is_some_and(|text| regex.is_match(text.as_ref()))
            }
            Self::Contains(operand) => match value {
                Value::String(haystack) => operand
                    .as_str()
                    .is_some_and(|needle| haystack.contains(needle)),
                Value::Array(items) => items.contains(operand),
                _ => false,
            },
            Self::StartsWith(prefix) => {
                as_text(value).is_some_and(|text| text.starts_with(prefix.as_str()))
            }
            Self::EndsWith(suffix) => {
                as_text(value).is_some_and(|text| text.ends_with(suffix.as_str()))
            }
            Self::In(items) => items.contains(value),
            Self::Gt(threshold) => as_number(value).is_some_and(|n| n > *threshold),
            Self::Lt(threshold) => as_number(value).is_some_and(|n| n < *threshold),
        }
    }
}

fn require_string(op: &str, value: Value, rule_id: &str) -> PolicyResult<String> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(PolicyError::rule(
            rule_id,
            format!("`{op}` requires a string operand"),
        )),
    }
}

fn require_number(op: &str, value: &Value, rule_id: &str) -> PolicyResult<f64> {
    as_number(value).ok_or_else(|| {
        PolicyError::rule(rule_id, format!("`{op}` requires a numeric operand"))
    })
}

/// Text form of a scalar for string operators. Lists and mappings have no
/// text form and fail positive string ops.
fn as_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s)),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        _ => None,
    }
}

/// Numeric coercion: numbers directly, numeric strings parsed.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use superego_primitives::RawToolRequest;

    fn request(tool_name: &str, parameters: Value) -> ToolRequest {
        ToolRequest::normalize(RawToolRequest {
            tool_name: tool_name.to_owned(),
            parameters: Some(parameters),
            agent_id: "agent-1".to_owned(),
            session_id: "session-1".to_owned(),
            cwd: "/workspace".to_owned(),
            timestamp: None,
        })
        .expect("valid request")
    }

    fn compile(yaml: &str) -> Condition {
        let spec: ConditionSpec = serde_yaml::from_str(yaml).expect("parse condition");
        spec.compile("test-rule").expect("compile condition")
    }

    #[test]
    fn field_match_on_tool_name() {
        let condition = compile(r#"{ field: "tool_name", op: "equals", value: "Read" }"#);
        assert!(condition.evaluate(&request("Read", json!({}))));
        assert!(!condition.evaluate(&request("Write", json!({}))));
    }

    #[test]
    fn dotted_parameter_paths_traverse_nested_mappings() {
        let condition =
            compile(r#"{ field: "parameters.options.force", op: "equals", value: true }"#);
        assert!(condition.evaluate(&request("Bash", json!({"options": {"force": true}}))));
        assert!(!condition.evaluate(&request("Bash", json!({"options": {}}))));
    }

    #[test]
    fn missing_field_fails_positive_ops_and_passes_not_equals() {
        let positive = compile(r#"{ field: "parameters.file_path", op: "contains", value: "x" }"#);
        assert!(!positive.evaluate(&request("Read", json!({}))));

        let negated = compile(r#"{ field: "parameters.file_path", op: "not_equals", value: "x" }"#);
        assert!(negated.evaluate(&request("Read", json!({}))));
    }

    #[test]
    fn regex_is_anchored() {
        let condition = compile(r#"{ field: "tool_name", op: "matches", value: "Re.*" }"#);
        assert!(condition.evaluate(&request("Read", json!({}))));
        // An unanchored engine would accept the embedded match.
        assert!(!condition.evaluate(&request("PreRead", json!({}))));
    }

    #[test]
    fn invalid_regex_fails_compilation() {
        let spec: ConditionSpec =
            serde_yaml::from_str(r#"{ field: "tool_name", op: "matches", value: "(" }"#)
                .expect("parse");
        let err = spec.compile("bad-regex").expect_err("compile should fail");
        assert!(matches!(err, PolicyError::InvalidRule { .. }));
    }

    #[test]
    fn string_ops_are_case_sensitive() {
        let condition =
            compile(r#"{ field: "parameters.file_path", op: "starts_with", value: "/etc" }"#);
        assert!(condition.evaluate(&request("Read", json!({"file_path": "/etc/shadow"}))));
        assert!(!condition.evaluate(&request("Read", json!({"file_path": "/ETC/shadow"}))));
    }

    #[test]
    fn contains_checks_substrings_and_list_membership() {
        let substring = compile(r#"{ field: "parameters.command", op: "contains", value: "rm -rf" }"#);
        assert!(substring.evaluate(&request("Bash", json!({"command": "sudo rm -rf /"}))));

        let membership = compile(r#"{ field: "parameters.argv", op: "contains", value: "--force" }"#);
        assert!(membership.evaluate(&request("Bash", json!({"argv": ["rm", "--force"]}))));
        assert!(!membership.evaluate(&request("Bash", json!({"argv": ["ls"]}))));
    }

    #[test]
    fn in_matches_list_membership() {
        let condition =
            compile(r#"{ field: "tool_name", op: "in", value: ["Read", "Edit"] }"#);
        assert!(condition.evaluate(&request("Edit", json!({}))));
        assert!(!condition.evaluate(&request("Bash", json!({}))));
    }

    #[test]
    fn numeric_ops_coerce_and_fail_closed_on_mismatch() {
        let gt = compile(r#"{ field: "parameters.timeout", op: "gt", value: 60 }"#);
        assert!(gt.evaluate(&request("Bash", json!({"timeout": 120}))));
        assert!(gt.evaluate(&request("Bash", json!({"timeout": "90"}))));
        assert!(!gt.evaluate(&request("Bash", json!({"timeout": 30}))));
        assert!(!gt.evaluate(&request("Bash", json!({"timeout": "soon"}))));

        let lt = compile(r#"{ field: "parameters.timeout", op: "lt", value: 60 }"#);
        assert!(lt.evaluate(&request("Bash", json!({"timeout": 10}))));
        assert!(!lt.evaluate(&request("Bash", json!({"timeout": [1]}))));
    }

    #[test]
    fn composites_nest() {
        let condition = compile(
            r#"
any_of:
  - all_of:
      - { field: "tool_name", op: "equals", value: "Bash" }
      - { field: "parameters.command", op: "contains", value: "sudo" }
  - not: { field: "cwd", op: "starts_with", value: "/home/" }
"#,
        );
        assert!(condition.evaluate(&request("Bash", json!({"command": "sudo id"}))));
        // cwd is /workspace, so the `not` branch also matches.
        assert!(condition.evaluate(&request("Read", json!({}))));
    }

    #[test]
    fn parameters_shorthand_desugars_to_field_matches() {
        let condition = compile(
            r#"
parameters:
  file_path: { op: "starts_with", value: "/etc/" }
  mode: "append"
"#,
        );
        assert!(condition.evaluate(&request(
            "Edit",
            json!({"file_path": "/etc/hosts", "mode": "append"})
        )));
        assert!(!condition.evaluate(&request(
            "Edit",
            json!({"file_path": "/etc/hosts", "mode": "overwrite"})
        )));
    }

    #[test]
    fn mixed_kind_nodes_are_rejected() {
        let spec: ConditionSpec = serde_yaml::from_str(
            r#"{ field: "tool_name", op: "equals", value: "Read", all_of: [] }"#,
        )
        .expect("parse");
        assert!(spec.compile("mixed").is_err());
    }
}
