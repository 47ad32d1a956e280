//! WebSocket transport: JSON frames over one bidirectional connection.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use serde::Deserialize;
use serde_json::{Value, json};
use superego_primitives::RawToolRequest;
use tracing::debug;

use crate::http::AppState;

/// Server-initiated ping cadence.
const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct WsEnvelope {
    #[serde(default)]
    id: Value,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

/// GET /v1/ws: upgrades to the frame protocol.
pub(crate) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The interval fires immediately; skip that first tick.
    ping.tick().await;

    loop {
        tokio::select! {
            _ = ping.tick() => {
                if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            inbound = socket.recv() => {
                let Some(Ok(message)) = inbound else { break };
                match message {
                    Message::Text(text) => {
                        let reply = handle_frame(&state, text.as_str()).await;
                        if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    // Pings are answered by the protocol layer; pongs and
                    // binary frames are ignored.
                    _ => {}
                }
            }
        }
    }
    debug!("websocket session closed");
}

async fn handle_frame(state: &AppState, raw: &str) -> Value {
    let envelope: WsEnvelope = match serde_json::from_str(raw) {
        Ok(envelope) => envelope,
        Err(err) => {
            return error_frame(Value::Null, "PARAM_001", &format!("malformed frame: {err}"));
        }
    };

    match envelope.kind.as_str() {
        "evaluate" => {
            let raw_request: RawToolRequest =
                match serde_json::from_value(envelope.payload.unwrap_or_default()) {
                    Ok(raw_request) => raw_request,
                    Err(err) => {
                        return error_frame(
                            envelope.id,
                            "PARAM_001",
                            &format!("malformed evaluate payload: {err}"),
                        );
                    }
                };
            match state.service.evaluate_raw(raw_request).await {
                Ok(decision) => json!({
                    "id": envelope.id,
                    "ok": true,
                    "result": decision,
                }),
                Err(err) => error_frame(envelope.id, err.code().as_str(), &err.to_string()),
            }
        }
        "ping" => json!({
            "id": envelope.id,
            "ok": true,
            "result": state.health.check(),
        }),
        other => error_frame(
            envelope.id,
            "PARAM_001",
            &format!("unknown frame type `{other}`"),
        ),
    }
}

fn error_frame(id: Value, code: &str, message: &str) -> Value {
    json!({
        "id": id,
        "ok": false,
        "error": { "code": code, "message": message },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use superego_advisor::{MockAdvisor, ResilienceConfig, ResilientAdvisor};
    use superego_audit::InMemoryAuditSink;
    use superego_policy::{PolicyEngine, RuleStore, parse_rules};
    use superego_primitives::DecisionAction;

    use crate::health::HealthMonitor;
    use crate::service::{EvaluationService, ServerInfo};

    fn state() -> AppState {
        let store = Arc::new(RuleStore::new(
            parse_rules(
                r#"
rules:
  - id: "allow-reads"
    priority: 10
    action: allow
    conditions: { field: "tool_name", op: "equals", value: "Read" }
"#,
            )
            .expect("valid rules"),
        ));
        let advisor = Arc::new(ResilientAdvisor::new(
            Arc::new(MockAdvisor::allowing()),
            ResilienceConfig::default(),
        ));
        let engine = PolicyEngine::new(
            Arc::clone(&store),
            Arc::clone(&advisor) as _,
            Arc::new(InMemoryAuditSink::new()),
            DecisionAction::Deny,
        );
        AppState {
            service: Arc::new(EvaluationService::new(
                engine,
                ServerInfo::new(vec!["websocket"], "rules.yaml".to_owned(), false),
            )),
            health: Arc::new(HealthMonitor::new(store, advisor, vec!["websocket"])),
        }
    }

    #[tokio::test]
    async fn evaluate_frames_echo_the_id() {
        let state = state();
        let frame = json!({
            "id": 7,
            "type": "evaluate",
            "payload": {
                "tool_name": "Read",
                "parameters": {"file_path": "/tmp/x"},
                "agent_id": "agent-1",
                "session_id": "session-1",
                "cwd": "/tmp"
            }
        });

        let reply = handle_frame(&state, &frame.to_string()).await;
        assert_eq!(reply["id"], 7);
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["result"]["action"], "allow");
        assert_eq!(reply["result"]["rule_id"], "allow-reads");
    }

    #[tokio::test]
    async fn ping_frames_return_health() {
        let state = state();
        let reply = handle_frame(&state, &json!({"id": "p1", "type": "ping"}).to_string()).await;
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["result"]["status"], "healthy");
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_fail_cleanly() {
        let state = state();

        let reply = handle_frame(&state, "not json").await;
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "PARAM_001");

        let reply =
            handle_frame(&state, &json!({"id": 1, "type": "subscribe"}).to_string()).await;
        assert_eq!(reply["ok"], false);

        let reply = handle_frame(
            &state,
            &json!({"id": 2, "type": "evaluate", "payload": {"tool_name": ""}}).to_string(),
        )
        .await;
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "PARAM_001");
    }
}
