use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::SessionId;

/// Failure to open a capture device for a session
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Capture device unavailable: {0}")]
    Unavailable(String),
}

/// Per-frame capture failures, always retried by the processing loop
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Transient frame read failure: {0}")]
    Transient(String),
    #[error("Capture device disconnected: {0}")]
    Disconnected(String),
}

/// Unrecoverable landmark engine failure for one frame
#[derive(Error, Debug)]
#[error("Landmark source failure: {0}")]
pub struct LandmarkSourceError(pub String);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    #[error("Required landmarks are not visible")]
    LandmarksUnavailable,
    #[error("Calibration pose produced a degenerate baseline")]
    DegenerateBaseline,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Capture device unavailable for session {session_id}: {source}")]
    DeviceUnavailable {
        session_id: SessionId,
        #[source]
        source: DeviceError,
    },
    #[error("Session {session_id} is still releasing its capture device")]
    StillStopping { session_id: SessionId },
}

/// Errors surfaced by the HTTP layer; bodies never carry internal details
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Session not running: {0}")]
    SessionNotRunning(SessionId),
    #[error("Camera unavailable for session {0}")]
    CameraUnavailable(SessionId),
    #[error("Session still stopping: {0}")]
    SessionStopping(SessionId),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::DeviceUnavailable { session_id, .. } => {
                ApiError::CameraUnavailable(session_id)
            }
            SessionError::StillStopping { session_id } => ApiError::SessionStopping(session_id),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::SessionNotRunning(session_id) => (
                StatusCode::NOT_FOUND,
                json!({
                    "session_id": session_id,
                    "result": "not_running",
                    "error": "Session not running",
                }),
            ),
            ApiError::CameraUnavailable(session_id) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "session_id": session_id,
                    "result": "error",
                    "error": "Camera unavailable",
                }),
            ),
            ApiError::SessionStopping(session_id) => (
                StatusCode::CONFLICT,
                json!({
                    "session_id": session_id,
                    "result": "stopping",
                    "error": "Session is still stopping",
                }),
            ),
            ApiError::InvalidRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": message }),
            ),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal server error" }),
            ),
        };

        if let ApiError::Internal(err) = &self {
            tracing::error!("Internal API error: {:#}", err);
        }

        (status, Json(body)).into_response()
    }
}
