use super::state::AppState;
use crate::session::SessionSnapshot;
use crate::upload::QueueItem;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartRecordingRequest {
    /// Optional user the recording belongs to
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub record_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub success: bool,
    pub record_id: Option<String>,
    pub file_path: Option<String>,
    pub chunk_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub partial_recovery: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct UploadsResponse {
    pub items: Vec<QueueItem>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recorder/start
/// Start a new recording session
pub async fn start_recording(
    State(state): State<AppState>,
    Json(req): Json<StartRecordingRequest>,
) -> impl IntoResponse {
    match state.recorder.start_recording(req.user_id).await {
        Ok(record_id) => {
            info!("Recording started via HTTP: {}", record_id);
            (
                StatusCode::OK,
                Json(StartRecordingResponse {
                    record_id,
                    status: "recording".to_string(),
                    message: "Recording started".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to start recording: {}", e);
            (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /recorder/stop
/// Stop the active recording and combine its chunks
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = state.recorder.stop_recording().await;
    let status = if outcome.success {
        StatusCode::OK
    } else if outcome.record_id.is_none() {
        StatusCode::CONFLICT
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(StopRecordingResponse {
            success: outcome.success,
            record_id: outcome.record_id,
            file_path: outcome
                .file_path
                .map(|p| p.to_string_lossy().into_owned()),
            chunk_count: outcome.chunk_count,
            warning: outcome.warning,
            error: outcome.error,
            partial_recovery: outcome.partial_recovery,
        }),
    )
        .into_response()
}

/// POST /recorder/pause
pub async fn pause_recording(State(state): State<AppState>) -> impl IntoResponse {
    state.recorder.pause_recording().await;
    StatusCode::NO_CONTENT
}

/// POST /recorder/resume
pub async fn resume_recording(State(state): State<AppState>) -> impl IntoResponse {
    state.recorder.resume_recording().await;
    StatusCode::NO_CONTENT
}

/// GET /recorder/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.recorder.snapshot().await;
    Json(StatusResponse { session })
}

/// GET /recorder/uploads
pub async fn get_uploads(State(state): State<AppState>) -> impl IntoResponse {
    let items = state.uploads.queue_status().await;
    Json(UploadsResponse { items })
}

/// POST /recorder/uploads/:record_id/retry
pub async fn retry_upload(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
) -> impl IntoResponse {
    if state.uploads.retry(&record_id).await {
        StatusCode::ACCEPTED.into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("No failed upload for recording {}", record_id),
            }),
        )
            .into_response()
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "meeting-recorder",
    }))
}
