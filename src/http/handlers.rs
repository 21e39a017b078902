use super::state::AppState;
use crate::error::ParleyError;
use crate::protocol::{MeetingStatus, ServerMessage};
use crate::session::SessionCoordinator;
use crate::transcribe::TranscriptSegment;
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Outbound queue depth per connection; a client that cannot drain this many
/// messages is treated as a dead transport.
const OUTBOUND_QUEUE: usize = 64;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub meeting_id: String,
    pub artifact_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: MeetingStatus,
    pub progress: u8,
    pub stage: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
}

impl ErrorResponse {
    fn from(e: &ParleyError) -> Self {
        Self {
            code: e.code().to_string(),
            error: e.to_string(),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /ws
/// Upgrade to a WebSocket and hand the connection to the coordinator
pub async fn ws_handler(
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_socket(state.coordinator, socket))
}

async fn handle_socket(coordinator: Arc<SessionCoordinator>, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(OUTBOUND_QUEUE);

    let id = match coordinator.connect(tx).await {
        Ok(id) => id,
        Err(e) => {
            // Draining: refuse politely and close
            if let Ok(payload) = serde_json::to_string(&ServerMessage::error(&e)) {
                let _ = sender.send(Message::Text(payload)).await;
            }
            let _ = sender.close().await;
            return;
        }
    };

    // Pump coordinator-pushed messages out to the socket. Ends when the
    // registry drops the outbound sender (disconnect or shutdown).
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => {
                coordinator.handle_text(id, &text).await;
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {
                // Transport-level keepalive still counts as activity
                coordinator.registry().touch(id).await;
            }
            Message::Binary(_) => {
                let e = ParleyError::InvalidMessage {
                    reason: "binary frames are not supported; send JSON text frames".to_string(),
                };
                let _ = coordinator
                    .registry()
                    .send_to(id, ServerMessage::error(&e))
                    .await;
            }
        }
    }

    info!("WebSocket for connection {} closed", id);
    coordinator.disconnect(id).await;
    send_task.abort();
}

/// POST /meetings/:meeting_id/audio
/// Validate an uploaded audio object and process it in the background;
/// transcript segments are pushed to the meeting's room as they arrive
pub async fn upload_audio(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let media_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    info!(
        "Audio upload for meeting {}: {} bytes, {}",
        meeting_id,
        body.len(),
        media_type
    );

    match state
        .coordinator
        .ingest_upload(&meeting_id, &media_type, body.to_vec(), None)
        .await
    {
        Ok(artifact_id) => (
            StatusCode::ACCEPTED,
            Json(UploadResponse {
                meeting_id,
                artifact_id,
                status: "processing".to_string(),
            }),
        )
            .into_response(),
        Err(e @ ParleyError::InvalidAudio { .. }) => {
            debug!("Upload for meeting {} rejected: {}", meeting_id, e);
            (StatusCode::BAD_REQUEST, Json(ErrorResponse::from(&e))).into_response()
        }
        Err(e @ ParleyError::Draining) => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse::from(&e))).into_response()
        }
        Err(e) => {
            error!("Upload for meeting {} failed: {}", meeting_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::from(&e)),
            )
                .into_response()
        }
    }
}

/// GET /meetings/:meeting_id/status
/// Get status of a meeting
pub async fn get_meeting_status(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> impl IntoResponse {
    match state.coordinator.meeting_status(&meeting_id).await {
        Some((status, progress, stage)) => (
            StatusCode::OK,
            Json(StatusResponse {
                status,
                progress,
                stage,
            }),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                code: "not-found".to_string(),
                error: format!("Meeting {} not found", meeting_id),
            }),
        )
            .into_response(),
    }
}

/// GET /meetings/:meeting_id/transcript
/// Get transcript for a meeting (accumulated so far)
pub async fn get_meeting_transcript(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> impl IntoResponse {
    match state.coordinator.meeting_transcript(&meeting_id).await {
        Some(transcript) => {
            let transcript: Vec<TranscriptSegment> = transcript;
            (StatusCode::OK, Json(transcript)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                code: "not-found".to_string(),
                error: format!("Meeting {} not found", meeting_id),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
