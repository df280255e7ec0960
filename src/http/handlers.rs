use super::state::AppState;
use crate::audio::CaptureArtifact;
use crate::error::JoinError;
use crate::gateway::IdentityMode;
use crate::session::{SessionState, SessionSummary};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Meeting join URL or opaque meeting reference
    pub join_url: String,

    /// Join as a guest under this name instead of the application identity
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub call_id: String,
    pub scenario_id: Uuid,
    pub status: SessionState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub call_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveResponse {
    pub call_id: String,
    pub status: String,
    pub message: String,
    pub audio_files: Vec<CaptureArtifact>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> axum::response::Response {
    (status, Json(ErrorResponse { error })).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/meeting/join
/// Join a call and start capturing audio
pub async fn join_meeting(
    State(state): State<AppState>,
    Json(req): Json<JoinRequest>,
) -> impl IntoResponse {
    let identity = match req.display_name {
        Some(name) if !name.trim().is_empty() => IdentityMode::guest(name.trim()),
        _ => IdentityMode::Application,
    };

    match state.registry.join(&req.join_url, identity).await {
        Ok(handle) => {
            info!("Joined call {}", handle.call_id);
            (
                StatusCode::OK,
                Json(JoinResponse {
                    message: format!("Joining call {}", handle.call_id),
                    call_id: handle.call_id,
                    scenario_id: handle.scenario_id,
                    status: handle.status,
                    warning: handle.warning,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to join: {}", e);
            let status = match &e {
                JoinError::InvalidMeetingReference(_) => StatusCode::BAD_REQUEST,
                JoinError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
                JoinError::Gateway(_) => StatusCode::BAD_GATEWAY,
            };
            error_response(status, e.to_string())
        }
    }
}

/// POST /api/meeting/leave
/// Leave a call and finalize its capture files
pub async fn leave_meeting(
    State(state): State<AppState>,
    Json(req): Json<LeaveRequest>,
) -> impl IntoResponse {
    match state.registry.leave_and_collect(&req.call_id).await {
        Ok(Some(artifacts)) => (
            StatusCode::OK,
            Json(LeaveResponse {
                call_id: req.call_id.clone(),
                status: "left".to_string(),
                message: format!("Left call, {} audio file(s) captured", artifacts.len()),
                audio_files: artifacts,
            }),
        )
            .into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("Call {} not found", req.call_id),
        ),
        Err(e) => {
            error!("Failed to leave call {}: {}", req.call_id, e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

/// GET /api/meeting/active
/// Sessions that are joining or active
pub async fn active_meetings(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.registry.list_active())
}

/// GET /api/audio/files
/// Captured WAV files under the capture root
pub async fn list_audio_files(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.pool().captured_files() {
        Ok(files) => {
            let files: Vec<String> = files
                .iter()
                .map(|path| path.display().to_string())
                .collect();
            (StatusCode::OK, Json(files)).into_response()
        }
        Err(e) => {
            error!("Failed to list capture files: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to list capture files: {}", e),
            )
        }
    }
}

/// GET /health, GET /api/meeting/health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
