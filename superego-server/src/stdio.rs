//! Stdio MCP transport: line-delimited JSON-RPC 2.0.
//!
//! Three tasks wired with bounded channels: a reader pulling lines off
//! stdin, a processor dispatching requests, and a writer draining
//! responses to stdout. Logs go to stderr only; stdout carries nothing
//! but protocol frames.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use superego_primitives::{ErrorCode, RawToolRequest, SuperegoError};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::health::HealthMonitor;
use crate::service::EvaluationService;

/// Size of the bounded channels between the transport tasks.
const CHANNEL_CAPACITY: usize = 128;

/// MCP protocol revision this server speaks.
const PROTOCOL_VERSION: &str = "2024-11-05";

/// Name of the single logical tool this server exposes.
const EVALUATE_TOOL: &str = "evaluate_tool_request";

const PARSE_ERROR: i64 = -32700;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const APPLICATION_ERROR: i64 = -32000;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

/// Dispatches parsed JSON-RPC requests against the evaluation service.
pub struct MessageProcessor {
    service: Arc<EvaluationService>,
    health: Arc<HealthMonitor>,
    outgoing: mpsc::Sender<Value>,
}

impl MessageProcessor {
    /// Creates a processor that emits responses on `outgoing`.
    #[must_use]
    pub fn new(
        service: Arc<EvaluationService>,
        health: Arc<HealthMonitor>,
        outgoing: mpsc::Sender<Value>,
    ) -> Self {
        Self {
            service,
            health,
            outgoing,
        }
    }

    /// Parses one inbound line and dispatches it. Notifications (requests
    /// without an id) are acknowledged silently.
    pub async fn process_line(&self, line: &str) {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => {
                self.send(error_object(
                    Value::Null,
                    PARSE_ERROR,
                    &format!("parse error: {err}"),
                ))
                .await;
                return;
            }
        };

        let Some(id) = request.id else {
            debug!(method = %request.method, "notification ignored");
            return;
        };

        match request.method.as_str() {
            "initialize" => {
                self.send(result_object(
                    id,
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": { "tools": {} },
                        "serverInfo": {
                            "name": self.service.info().name(),
                            "version": self.service.info().version(),
                        },
                    }),
                ))
                .await;
            }
            "tools/list" => {
                self.send(result_object(id, json!({ "tools": [tool_descriptor()] })))
                    .await;
            }
            "tools/call" => self.handle_tool_call(id, request.params).await,
            "health_check" => {
                self.send(result_object(
                    id,
                    serde_json::to_value(self.health.check()).unwrap_or_default(),
                ))
                .await;
            }
            "get_server_info" => {
                self.send(result_object(
                    id,
                    serde_json::to_value(self.service.info()).unwrap_or_default(),
                ))
                .await;
            }
            other => {
                self.send(error_object(
                    id,
                    METHOD_NOT_FOUND,
                    &format!("unknown method `{other}`"),
                ))
                .await;
            }
        }
    }

    async fn handle_tool_call(&self, id: Value, params: Option<Value>) {
        #[derive(Deserialize)]
        struct CallParams {
            name: String,
            #[serde(default)]
            arguments: Option<Value>,
        }

        let params: CallParams = match serde_json::from_value(params.unwrap_or_default()) {
            Ok(params) => params,
            Err(err) => {
                self.send(error_object(
                    id,
                    INVALID_PARAMS,
                    &format!("malformed tools/call params: {err}"),
                ))
                .await;
                return;
            }
        };

        if params.name != EVALUATE_TOOL {
            self.send(error_object(
                id,
                INVALID_PARAMS,
                &format!("unknown tool `{}`", params.name),
            ))
            .await;
            return;
        }

        let raw: RawToolRequest =
            match serde_json::from_value(params.arguments.unwrap_or_default()) {
                Ok(raw) => raw,
                Err(err) => {
                    self.send(error_object(
                        id,
                        INVALID_PARAMS,
                        &format!("malformed tool arguments: {err}"),
                    ))
                    .await;
                    return;
                }
            };

        // Evaluations may wait on the advisor; run each call on its own
        // task so one slow request does not serialize the whole pipe.
        let service = Arc::clone(&self.service);
        let outgoing = self.outgoing.clone();
        tokio::spawn(async move {
            let response = match service.evaluate_raw(raw).await {
                Ok(decision) => {
                    let text = serde_json::to_string(&decision).unwrap_or_default();
                    result_object(
                        id,
                        json!({
                            "content": [{ "type": "text", "text": text }],
                            "structuredContent": decision,
                            "isError": false,
                        }),
                    )
                }
                Err(err) => {
                    let code = match err.code() {
                        ErrorCode::Validation => INVALID_PARAMS,
                        _ => APPLICATION_ERROR,
                    };
                    error_object(id, code, &public_message(&err))
                }
            };
            if outgoing.send(response).await.is_err() {
                error!("outgoing channel closed before response could be sent");
            }
        });
    }

    async fn send(&self, message: Value) {
        if self.outgoing.send(message).await.is_err() {
            error!("outgoing channel closed before response could be sent");
        }
    }
}

fn public_message(err: &SuperegoError) -> String {
    match err {
        SuperegoError::Internal { .. } => "internal error".to_owned(),
        other => other.to_string(),
    }
}

fn result_object(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_object(id: Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

fn tool_descriptor() -> Value {
    json!({
        "name": EVALUATE_TOOL,
        "description": "Evaluate a tool request for security concerns and return an allow/deny decision.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "tool_name": { "type": "string" },
                "parameters": { "type": "object" },
                "agent_id": { "type": "string" },
                "session_id": { "type": "string" },
                "cwd": { "type": "string" },
            },
            "required": ["tool_name", "agent_id", "session_id", "cwd"],
        },
    })
}

/// Serves the stdio transport until stdin reaches EOF.
///
/// # Errors
///
/// Returns an I/O error only when stdin cannot be read at all; per-request
/// failures become JSON-RPC error responses.
pub async fn run_stdio(
    service: Arc<EvaluationService>,
    health: Arc<HealthMonitor>,
) -> std::io::Result<()> {
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Value>(CHANNEL_CAPACITY);

    // Task: read lines from stdin and dispatch them.
    let processor_handle = tokio::spawn(async move {
        let processor = MessageProcessor::new(service, health, outgoing_tx);
        let stdin = io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            processor.process_line(&line).await;
        }
        debug!("stdin reader finished (EOF)");
    });

    // Task: write outgoing messages to stdout, one per line.
    let writer_handle = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(message) = outgoing_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if stdout.write_all(json.as_bytes()).await.is_err()
                        || stdout.write_all(b"\n").await.is_err()
                        || stdout.flush().await.is_err()
                    {
                        error!("failed to write to stdout");
                        break;
                    }
                }
                Err(err) => error!("failed to serialize response: {err}"),
            }
        }
        debug!("stdout writer exited (channel closed)");
    });

    let _ = tokio::join!(processor_handle, writer_handle);
    Ok(())
}
