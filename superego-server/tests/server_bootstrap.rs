//! Wiring the full component graph from configuration.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use superego_advisor::MockAdvisor;
use superego_primitives::RawToolRequest;
use superego_server::{ServerConfig, ServerContext, TransportKind};

const RULES: &str = r#"
rules:
  - id: "deny-etc"
    priority: 10
    action: deny
    reason: "system configuration"
    conditions: { field: "parameters.file_path", op: "starts_with", value: "/etc/" }
"#;

const UPDATED_RULES: &str = r#"
rules:
  - id: "deny-etc"
    priority: 10
    action: deny
    reason: "system configuration"
    conditions: { field: "parameters.file_path", op: "starts_with", value: "/etc/" }
  - id: "allow-rest"
    priority: 900
    action: allow
    conditions: { field: "tool_name", op: "not_equals", value: "" }
"#;

fn raw(tool_name: &str, file_path: &str) -> RawToolRequest {
    serde_json::from_value(json!({
        "tool_name": tool_name,
        "parameters": {"file_path": file_path},
        "agent_id": "agent-1",
        "session_id": "session-1",
        "cwd": "/workspace",
    }))
    .expect("raw request")
}

#[tokio::test]
async fn build_fails_on_an_invalid_rule_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("rules.yaml");
    tokio::fs::write(&path, "rules: [ {").await.expect("write");

    let mut config = ServerConfig::default();
    config.set_rules_file(path);
    config.set_hot_reload(false);

    let err = ServerContext::build_with_advisor(
        config,
        TransportKind::Http,
        Arc::new(MockAdvisor::allowing()),
    )
    .await
    .expect_err("invalid rules rejected");
    assert!(matches!(
        err,
        superego_primitives::SuperegoError::Config { .. }
    ));
}

#[tokio::test]
async fn built_context_evaluates_and_audits_to_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rules_path = dir.path().join("rules.yaml");
    let audit_path = dir.path().join("audit.ndjson");
    tokio::fs::write(&rules_path, RULES).await.expect("write");

    let mut config = ServerConfig::default();
    config.set_rules_file(rules_path);
    config.set_hot_reload(false);
    config.set_audit_log(audit_path.clone());

    let context = ServerContext::build_with_advisor(
        config,
        TransportKind::Http,
        Arc::new(MockAdvisor::allowing()),
    )
    .await
    .expect("context builds");

    let decision = context
        .service()
        .evaluate_raw(raw("Read", "/etc/passwd"))
        .await
        .expect("decision");
    assert!(decision.is_deny());
    assert_eq!(decision.rule_id(), "deny-etc");

    let report = context.health().check();
    assert!(report.is_serving());

    let audit = tokio::fs::read_to_string(&audit_path).await.expect("audit log");
    let entry: serde_json::Value =
        serde_json::from_str(audit.lines().next().expect("one line")).expect("entry JSON");
    assert_eq!(entry["decision"]["rule_id"], "deny-etc");
    assert_eq!(entry["rule_matches"], json!(["deny-etc"]));
}

#[tokio::test]
async fn hot_reload_picks_up_rule_edits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let rules_path = dir.path().join("rules.yaml");
    tokio::fs::write(&rules_path, RULES).await.expect("write");

    let mut config = ServerConfig::default();
    config.set_rules_file(rules_path.clone());
    config.set_hot_reload(true);

    let context = ServerContext::build_with_advisor(
        config,
        TransportKind::Http,
        Arc::new(MockAdvisor::allowing()),
    )
    .await
    .expect("context builds");

    // Unmatched tool: fail-closed under the initial rule set.
    let decision = context
        .service()
        .evaluate_raw(raw("Bash", "/tmp/x"))
        .await
        .expect("decision");
    assert!(decision.is_deny());
    assert_eq!(decision.rule_id(), "");

    tokio::time::sleep(Duration::from_millis(150)).await;
    tokio::fs::write(&rules_path, UPDATED_RULES)
        .await
        .expect("update rules");

    // The watcher polls once a second; allow a few cycles.
    let mut reloaded = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let decision = context
            .service()
            .evaluate_raw(raw("Bash", "/tmp/x"))
            .await
            .expect("decision");
        if decision.is_allow() {
            assert_eq!(decision.rule_id(), "allow-rest");
            reloaded = true;
            break;
        }
    }
    assert!(reloaded, "rule edit was not picked up within four seconds");
}
