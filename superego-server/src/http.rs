//! HTTP/JSON transport over axum.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use superego_primitives::{ErrorCode, RawToolRequest, SuperegoError};
use tower_http::cors::{Any, CorsLayer};

use crate::health::HealthMonitor;
use crate::service::EvaluationService;
use crate::ws::ws_handler;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The one evaluation entry point.
    pub service: Arc<EvaluationService>,
    /// Component health aggregator.
    pub health: Arc<HealthMonitor>,
}

/// Builds the HTTP router. `with_websocket` additionally mounts `/v1/ws`.
#[must_use]
pub fn router(state: AppState, with_rest: bool, with_websocket: bool) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let mut app = Router::new().route("/health", get(handle_health));
    if with_rest {
        app = app
            .route("/v1/evaluate", post(handle_evaluate))
            .route("/info", get(handle_info));
    }
    if with_websocket {
        app = app.route("/v1/ws", get(ws_handler));
    }

    app.fallback(handle_not_found).layer(cors).with_state(state)
}

/// Builds the `{error: {code, message}}` response body.
pub(crate) fn json_error(status: StatusCode, code: ErrorCode, message: &str) -> Response {
    let body = serde_json::json!({
        "error": { "code": code.as_str(), "message": message }
    });
    (status, Json(body)).into_response()
}

/// Maps an internal error onto the documented HTTP status.
pub(crate) fn error_response(err: &SuperegoError) -> Response {
    let status = match err {
        SuperegoError::Validation { .. } => StatusCode::BAD_REQUEST,
        SuperegoError::AdvisorUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SuperegoError::RuleEval { .. }
        | SuperegoError::Config { .. }
        | SuperegoError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    // Internal reasons stay in the log; callers get the stable phrase only.
    let message = match err {
        SuperegoError::Internal { .. } => "internal error".to_owned(),
        other => other.to_string(),
    };
    json_error(status, err.code(), &message)
}

async fn handle_not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, ErrorCode::Validation, "not found")
}

/// POST /v1/evaluate
async fn handle_evaluate(
    State(state): State<AppState>,
    payload: Result<Json<RawToolRequest>, JsonRejection>,
) -> Response {
    let Json(raw) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                ErrorCode::Validation,
                &rejection.body_text(),
            );
        }
    };

    match state.service.evaluate_raw(raw).await {
        Ok(decision) => (StatusCode::OK, Json(decision)).into_response(),
        Err(err) => error_response(&err),
    }
}

/// GET /health
async fn handle_health(State(state): State<AppState>) -> Response {
    let report = state.health.check();
    let status = if report.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

/// GET /info
async fn handle_info(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.service.info().clone())).into_response()
}
