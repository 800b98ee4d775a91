//! HTTP + websocket session surface.
//!
//! Routes:
//! - `POST /v1/sessions` — create (or reopen) a session
//! - `GET /v1/sessions` — list sessions
//! - `DELETE /v1/sessions/:id` — delete a session
//! - `POST /v1/sessions/:id/messages` — submit a user message; an in-flight
//!   run is cancelled and the message replaces the superseded turn
//! - `POST /v1/sessions/:id/stop` — raise the cancel signal
//! - `GET /v1/sessions/:id/events` — websocket: replay the stored event
//!   log, then stream live events (at-least-once; duplicates possible)

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Path as AxumPath, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::controller::RunOutcome;
use crate::runtime::CoreState;

pub fn router(state: Arc<CoreState>) -> Router {
    Router::new()
        .route("/v1/sessions", post(create_session).get(list_sessions))
        .route("/v1/sessions/:id", axum::routing::delete(delete_session))
        .route("/v1/sessions/:id/messages", post(post_message))
        .route("/v1/sessions/:id/stop", post(stop_session))
        .route("/v1/sessions/:id/events", get(events_ws))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(state: Arc<CoreState>, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(bind = %bind, "session server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    workspace: Option<String>,
}

async fn create_session(
    State(state): State<Arc<CoreState>>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    let session_id = req
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let workspace = req
        .workspace
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| state.config.workspace.path.clone());

    match state.sessions.resolve_or_create(&session_id, &workspace) {
        Ok((entry, is_new)) => (
            if is_new { StatusCode::CREATED } else { StatusCode::OK },
            Json(serde_json::json!({
                "session_id": entry.session_id,
                "workspace_root": entry.workspace_root,
                "created_at": entry.created_at,
                "is_new": is_new,
            })),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn list_sessions(State(state): State<Arc<CoreState>>) -> impl IntoResponse {
    Json(state.sessions.list())
}

async fn delete_session(
    State(state): State<Arc<CoreState>>,
    AxumPath(session_id): AxumPath<String>,
) -> impl IntoResponse {
    match state.delete_session(&session_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageRequest {
    text: String,
    #[serde(default)]
    files: Vec<String>,
}

async fn post_message(
    State(state): State<Arc<CoreState>>,
    AxumPath(session_id): AxumPath<String>,
    Json(req): Json<PostMessageRequest>,
) -> impl IntoResponse {
    let handle = match state.session(&session_id) {
        Ok(h) => h,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match handle.send_user_message(req.text, req.files).await {
        Ok(RunOutcome::Completed { final_answer }) => Json(serde_json::json!({
            "status": "completed",
            "final_answer": final_answer,
        }))
        .into_response(),
        Ok(RunOutcome::Waiting) => Json(serde_json::json!({
            "status": "waiting",
        }))
        .into_response(),
        Ok(RunOutcome::Interrupted) => Json(serde_json::json!({
            "status": "interrupted",
        }))
        .into_response(),
        Ok(RunOutcome::MaxTurnsExceeded) => Json(serde_json::json!({
            "status": "error",
            "message": "max turns exceeded",
        }))
        .into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

async fn stop_session(
    State(state): State<Arc<CoreState>>,
    AxumPath(session_id): AxumPath<String>,
) -> impl IntoResponse {
    if state.cancel_map.cancel(&session_id) {
        StatusCode::ACCEPTED.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, format!("no active session '{session_id}'"))
    }
}

// ── Event stream ───────────────────────────────────────────────────

async fn events_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<CoreState>>,
    AxumPath(session_id): AxumPath<String>,
) -> impl IntoResponse {
    if state.sessions.get(&session_id).is_none() {
        return error_response(StatusCode::NOT_FOUND, format!("unknown session '{session_id}'"));
    }
    ws.on_upgrade(move |socket| stream_events(socket, state, session_id))
        .into_response()
}

/// Replay the durable log, then forward live events until the client
/// disconnects. A lagged subscriber skips ahead; consumers are expected to
/// dedupe by event id.
async fn stream_events(socket: WebSocket, state: Arc<CoreState>, session_id: String) {
    use futures_util::StreamExt;

    // Subscribe before replay so no event falls between the two phases.
    let mut live = state.bus(&session_id).subscribe();
    let (mut outbound, mut inbound) = socket.split();

    let stored = match state.sessions.load(&session_id) {
        Ok((events, _)) => events,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "event replay failed");
            Vec::new()
        }
    };
    let mut last_replayed = 0u64;
    for event in &stored {
        last_replayed = last_replayed.max(event.id);
        if send_event(&mut outbound, event).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            incoming = inbound.next() => match incoming {
                // This feed is one-way; anything but a close/ping is noise.
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            received = live.recv() => match received {
                Ok(event) => {
                    // Suppress duplicates of already-replayed persisted
                    // events; transient progress events share ids and pass
                    // through.
                    if event.id <= last_replayed
                        && !matches!(
                            event.payload,
                            axon_domain::Payload::Observation(
                                axon_domain::Observation::AgentStateChanged { .. }
                            )
                        )
                    {
                        continue;
                    }
                    if send_event(&mut outbound, &event).await.is_err() {
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        session_id = %session_id,
                        skipped,
                        "websocket subscriber lagged"
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

async fn send_event(
    outbound: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
    event: &axon_domain::Event,
) -> std::result::Result<(), axum::Error> {
    use futures_util::SinkExt;

    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize event");
            return Ok(());
        }
    };
    outbound.send(WsMessage::Text(json)).await
}

fn error_response(status: StatusCode, message: String) -> axum::response::Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
