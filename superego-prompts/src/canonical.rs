//! Canonical parameter encoding and cache-key derivation.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Renders a parameter mapping to a canonical string: mapping keys sorted
/// at every depth, list order preserved, scalars in `serde_json` form.
///
/// Regression tests pin this encoding; changing it silently invalidates
/// every cached advisor verdict.
#[must_use]
pub fn canonical_parameters(parameters: &Map<String, Value>) -> String {
    let mut out = String::new();
    write_object(&mut out, parameters);
    out
}

/// Derives the advisor cache key for `(tool_name, parameters, rule_id)` as
/// a SHA-256 hex digest.
#[must_use]
pub fn evaluation_cache_key(
    tool_name: &str,
    parameters: &Map<String, Value>,
    rule_id: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update([0x1f]);
    hasher.update(canonical_parameters(parameters).as_bytes());
    hasher.update([0x1f]);
    hasher.update(rule_id.as_bytes());

    let digest = hasher.finalize();
    let mut key = String::with_capacity(digest.len() * 2);
    for byte in digest {
        key.push_str(&format!("{byte:02x}"));
    }
    key
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(out, map),
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object(out: &mut String, map: &Map<String, Value>) {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_unstable_by_key(|(key, _)| *key);

    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_value(out, value);
    }
    out.push('}');
}
