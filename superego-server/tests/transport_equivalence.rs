//! The same request must produce the same decision on every transport.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use hyper::{Body, Client, Request};
use serde_json::{Value, json};
use superego_advisor::{MockAdvisor, ResilienceConfig, ResilientAdvisor};
use superego_audit::InMemoryAuditSink;
use superego_policy::{PolicyEngine, RuleStore, parse_rules};
use superego_primitives::{AdvisorVerdict, DecisionAction};
use superego_server::{AppState, EvaluationService, HealthMonitor, MessageProcessor, ServerInfo, router};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const RULES: &str = r#"
rules:
  - id: "deny-etc-shadow"
    priority: 10
    action: deny
    reason: "system password file"
    conditions:
      all_of:
        - { field: "tool_name", op: "in", value: ["Read", "Edit"] }
        - { field: "parameters.file_path", op: "starts_with", value: "/etc/shadow" }
  - id: "sample-writes"
    priority: 100
    action: sample
    reason: "file writes need review"
    sample_guidance: "Assess whether content is benign."
    conditions:
      { field: "tool_name", op: "equals", value: "Write" }
  - id: "allow-safe-reads"
    priority: 900
    action: allow
    conditions:
      all_of:
        - { field: "tool_name", op: "equals", value: "Read" }
        - { field: "parameters.file_path", op: "starts_with", value: "/home/" }
"#;

struct Harness {
    state: AppState,
    addr: SocketAddr,
}

async fn harness() -> Harness {
    let store = Arc::new(RuleStore::new(parse_rules(RULES).expect("valid rules")));
    let advisor = Arc::new(ResilientAdvisor::new(
        Arc::new(MockAdvisor::allowing().with_override(
            "rm -rf",
            AdvisorVerdict::new(DecisionAction::Deny, "destructive command", 0.95),
        )),
        ResilienceConfig::default(),
    ));
    let engine = PolicyEngine::new(
        Arc::clone(&store),
        Arc::clone(&advisor) as _,
        Arc::new(InMemoryAuditSink::new()),
        DecisionAction::Deny,
    );
    let transports = vec!["stdio", "http", "websocket"];
    let state = AppState {
        service: Arc::new(EvaluationService::new(
            engine,
            ServerInfo::new(transports.clone(), "rules.yaml".to_owned(), false),
        )),
        health: Arc::new(HealthMonitor::new(store, advisor, transports)),
    };

    let app = router(state.clone(), true, true);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server runs");
    });

    Harness { state, addr }
}

fn request_payload(tool_name: &str, parameters: Value) -> Value {
    json!({
        "tool_name": tool_name,
        "parameters": parameters,
        "agent_id": "agent-1",
        "session_id": "session-1",
        "cwd": "/workspace",
    })
}

/// Decision fields that must be byte-identical across transports.
fn comparable(decision: &Value) -> Value {
    json!({
        "action": decision["action"],
        "reason": decision["reason"],
        "rule_id": decision["rule_id"],
        "confidence": decision["confidence"],
        "ai_provider": decision.get("ai_provider").cloned().unwrap_or(Value::Null),
        "ai_model": decision.get("ai_model").cloned().unwrap_or(Value::Null),
        "risk_factors": decision.get("risk_factors").cloned().unwrap_or(Value::Null),
    })
}

async fn decide_http(harness: &Harness, payload: &Value) -> Value {
    let client = Client::new();
    let request = Request::post(format!("http://{}/v1/evaluate", harness.addr))
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build request");
    let response = client.request(request).await.expect("http response");
    assert_eq!(response.status(), 200);
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("decision JSON")
}

async fn decide_ws(harness: &Harness, payload: &Value) -> Value {
    let (mut socket, _) = connect_async(format!("ws://{}/v1/ws", harness.addr))
        .await
        .expect("websocket connect");
    socket
        .send(Message::text(
            json!({"id": 1, "type": "evaluate", "payload": payload}).to_string(),
        ))
        .await
        .expect("send frame");

    let reply = loop {
        match socket.next().await.expect("frame").expect("frame ok") {
            Message::Text(text) => break serde_json::from_str::<Value>(text.as_str()).expect("reply JSON"),
            // Keepalive traffic is not part of the protocol payload.
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("unexpected frame: {other:?}"),
        }
    };
    let _ = socket.close(None).await;

    assert_eq!(reply["ok"], true, "ws reply: {reply}");
    reply["result"].clone()
}

async fn decide_stdio(harness: &Harness, payload: &Value) -> Value {
    let (tx, mut rx) = mpsc::channel(8);
    let processor = MessageProcessor::new(
        Arc::clone(&harness.state.service),
        Arc::clone(&harness.state.health),
        tx,
    );

    let line = json!({
        "jsonrpc": "2.0",
        "id": 42,
        "method": "tools/call",
        "params": { "name": "evaluate_tool_request", "arguments": payload },
    });
    processor.process_line(&line.to_string()).await;

    let response = rx.recv().await.expect("stdio response");
    assert_eq!(response["id"], 42);
    response["result"]["structuredContent"].clone()
}

async fn assert_equivalent(
    harness: &Harness,
    payload: Value,
    expected_action: &str,
    expected_rule: &str,
) {
    let http = decide_http(harness, &payload).await;
    let ws = decide_ws(harness, &payload).await;
    let stdio = decide_stdio(harness, &payload).await;

    assert_eq!(http["action"], expected_action);
    assert_eq!(http["rule_id"], expected_rule);
    assert_eq!(comparable(&http), comparable(&ws), "http vs websocket");
    assert_eq!(comparable(&http), comparable(&stdio), "http vs stdio");
}

#[tokio::test]
async fn rule_driven_decisions_match_across_transports() {
    let harness = harness().await;

    assert_equivalent(
        &harness,
        request_payload("Read", json!({"file_path": "/etc/shadow"})),
        "deny",
        "deny-etc-shadow",
    )
    .await;

    assert_equivalent(
        &harness,
        request_payload("Read", json!({"file_path": "/home/alice/notes.md"})),
        "allow",
        "allow-safe-reads",
    )
    .await;

    assert_equivalent(
        &harness,
        request_payload("Bash", json!({"command": "ls"})),
        "deny",
        "",
    )
    .await;
}

#[tokio::test]
async fn sampled_decisions_match_across_transports() {
    let harness = harness().await;

    assert_equivalent(
        &harness,
        request_payload("Write", json!({"file_path": "/tmp/out.txt", "content": "ok"})),
        "allow",
        "sample-writes",
    )
    .await;

    assert_equivalent(
        &harness,
        request_payload("Write", json!({"file_path": "/tmp/rm.sh", "content": "rm -rf /"})),
        "deny",
        "sample-writes",
    )
    .await;
}
