//! HTTP endpoints

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use dialtone_telephony::{connect_twiml, TelephonyError, TwilioClient};

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::ws::ws_handler;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/twiml", post(twiml))
        .route("/ws", get(ws_handler))
        .route("/trace/latest", get(trace_latest))
        .route("/call/:number", post(trigger_call))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Connection markup fetched by the telephony provider when a call is
/// answered; it instructs the provider to open the media-stream WebSocket.
async fn twiml(State(state): State<AppState>) -> impl IntoResponse {
    let body = connect_twiml(&state.settings.server.public_url);
    ([(header::CONTENT_TYPE, "application/xml")], body)
}

/// Serve the most recently written trace document.
async fn trace_latest(State(state): State<AppState>) -> impl IntoResponse {
    let dir = std::path::Path::new(&state.settings.trace.dir);
    let latest = std::fs::read_dir(dir)
        .ok()
        .into_iter()
        .flatten()
        .flatten()
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext == "json")
        })
        .max_by_key(|entry| {
            entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

    match latest.and_then(|entry| std::fs::read_to_string(entry.path()).ok()) {
        Some(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        None => (StatusCode::NOT_FOUND, "no trace recorded yet").into_response(),
    }
}

/// Trigger an outbound call to `number` (E.164).
async fn trigger_call(
    State(state): State<AppState>,
    Path(number): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let client = TwilioClient::new(&state.settings.telephony);
    match client
        .create_call(&number, &state.settings.server.public_url)
        .await
    {
        Ok(sid) => Ok(Json(json!({ "call_sid": sid }))),
        Err(e @ TelephonyError::InvalidNumber(_)) => {
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => {
            tracing::error!(error = %e, "outbound call failed");
            Err((StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}
