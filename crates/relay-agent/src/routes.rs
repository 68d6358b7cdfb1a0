use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use relay_process::{CallbackStatus, StreamId, StreamState};

use crate::callback::CallbackNotifier;
use crate::error::{AgentError, json_error};
use crate::supervisor::{StopOutcome, Supervisor};

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Supervisor,
    pub notifier: CallbackNotifier,
    pub api_key: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/stream/start", post(start_stream))
        .route("/stream/stop", post(stop_stream))
        .route("/stream/status/:stream_id", get(stream_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

// Bearer credential gate for everything except /health. Rejections carry a
// JSON body and must happen before any handler can mutate state.
async fn require_api_key(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(key) if key == state.api_key.as_ref() => next.run(req).await,
        Some(_) => {
            tracing::warn!("rejected request: API key mismatch");
            json_error(StatusCode::FORBIDDEN, "access denied: invalid API key")
        }
        None => {
            tracing::warn!("rejected request: missing or malformed Authorization header");
            json_error(
                StatusCode::FORBIDDEN,
                "access denied: missing or malformed Authorization header",
            )
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct StartRequest {
    ffmpeg_command: Vec<String>,
    stream_id: StreamId,
    #[serde(default)]
    callback_url: Option<String>,
    #[serde(default)]
    callback_api_key: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct StartResponse {
    message: String,
    pid: u32,
    stream_id: StreamId,
}

#[derive(Debug, serde::Serialize)]
struct MessageResponse {
    message: String,
}

async fn start_stream(State(state): State<AppState>, Json(req): Json<StartRequest>) -> Response {
    let result = state.supervisor.start(req.stream_id, &req.ffmpeg_command).await;

    // Callback is optional and fire-and-forget; a conflict precedes the
    // launch and emits nothing.
    if let (Some(url), Some(token)) = (&req.callback_url, &req.callback_api_key) {
        match &result {
            Ok(pid) => state.notifier.notify(
                url.clone(),
                token.clone(),
                req.stream_id,
                CallbackStatus::Live,
                format!("stream started with pid {pid}"),
            ),
            Err(err @ AgentError::Launch(_)) => state.notifier.notify(
                url.clone(),
                token.clone(),
                req.stream_id,
                CallbackStatus::Error,
                err.to_string(),
            ),
            Err(_) => {}
        }
    }

    match result {
        Ok(pid) => Json(StartResponse {
            message: "stream process started".to_string(),
            pid,
            stream_id: req.stream_id,
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, serde::Deserialize)]
struct StopRequest {
    stream_id: StreamId,
}

async fn stop_stream(State(state): State<AppState>, Json(req): Json<StopRequest>) -> Response {
    match state.supervisor.stop(req.stream_id).await {
        Ok(StopOutcome::SignalSent { .. }) => Json(MessageResponse {
            message: format!("stop requested for stream {}", req.stream_id),
        })
        .into_response(),
        Ok(StopOutcome::NotRunning) => Json(MessageResponse {
            message: "stream is not running".to_string(),
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, serde::Serialize)]
struct StatusResponse {
    status: StreamState,
    stream_id: StreamId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
}

async fn stream_status(
    State(state): State<AppState>,
    Path(stream_id): Path<i64>,
) -> Json<StatusResponse> {
    let report = state.supervisor.status(StreamId(stream_id)).await;
    Json(StatusResponse {
        status: report.state,
        stream_id: report.stream_id,
        pid: report.pid,
    })
}

#[derive(Debug, serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
