use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::config::StreamConfig;
use crate::errors::ApiError;
use crate::models::{PostureStatusRecord, SessionAck, SessionId, SessionSummary};
use crate::services::{mjpeg_content_type, mjpeg_stream, InMemoryEventLog, SessionManager};

const MAX_SESSION_ID_LEN: usize = 128;

/// Shared state for session API handlers
pub struct SessionState {
    pub sessions: Arc<SessionManager>,
    pub events: Arc<InMemoryEventLog>,
    pub stream: StreamConfig,
}

#[derive(Debug, Serialize)]
pub struct SessionAckResponse {
    pub session_id: SessionId,
    pub result: SessionAck,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub status: PostureStatusRecord,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionId>,
}

pub fn session_routes(state: Arc<SessionState>) -> Router {
    Router::new()
        .route("/", get(list_sessions).post(create_session))
        .route("/:session_id/start", post(start_session))
        .route("/:session_id/stop", post(stop_session))
        .route("/:session_id/recalibrate", post(recalibrate_session))
        .route("/:session_id/status", get(session_status))
        .route("/:session_id/video_feed", get(video_feed))
        .route("/:session_id/summary", get(session_summary))
        .with_state(state)
}

fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    let valid = !raw.is_empty()
        && raw.len() <= MAX_SESSION_ID_LEN
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(SessionId::new(raw))
    } else {
        Err(ApiError::InvalidRequest(format!(
            "Session id must be 1-{} characters of letters, digits, '-' or '_'",
            MAX_SESSION_ID_LEN
        )))
    }
}

/// List running sessions
async fn list_sessions(State(state): State<Arc<SessionState>>) -> Json<SessionListResponse> {
    Json(SessionListResponse {
        sessions: state.sessions.running_sessions().await,
    })
}

/// Start a session under a freshly generated id
#[tracing::instrument(skip(state))]
async fn create_session(
    State(state): State<Arc<SessionState>>,
) -> Result<Response, ApiError> {
    let session_id = SessionId::generate();
    let result = state.sessions.start(&session_id).await?;
    info!("Created session {}", session_id);

    Ok((
        StatusCode::CREATED,
        Json(SessionAckResponse { session_id, result }),
    )
        .into_response())
}

#[tracing::instrument(skip(state))]
async fn start_session(
    State(state): State<Arc<SessionState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionAckResponse>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let result = state.sessions.start(&session_id).await?;
    Ok(Json(SessionAckResponse { session_id, result }))
}

#[tracing::instrument(skip(state))]
async fn stop_session(
    State(state): State<Arc<SessionState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionAckResponse>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let result = state.sessions.stop(&session_id).await;
    Ok(Json(SessionAckResponse { session_id, result }))
}

#[tracing::instrument(skip(state))]
async fn recalibrate_session(
    State(state): State<Arc<SessionState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionAckResponse>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    match state.sessions.recalibrate(&session_id).await {
        SessionAck::NotRunning => Err(ApiError::SessionNotRunning(session_id)),
        result => Ok(Json(SessionAckResponse { session_id, result })),
    }
}

async fn session_status(
    State(state): State<Arc<SessionState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let status = state
        .sessions
        .status(&session_id)
        .await
        .ok_or_else(|| ApiError::SessionNotRunning(session_id.clone()))?;

    Ok(Json(SessionStatusResponse { session_id, status }))
}

/// Multipart MJPEG stream of the annotated frames
#[tracing::instrument(skip(state))]
async fn video_feed(
    State(state): State<Arc<SessionState>>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let reader = state
        .sessions
        .reader(&session_id)
        .await
        .ok_or_else(|| ApiError::SessionNotRunning(session_id.clone()))?;

    info!("Streaming frames for session {}", session_id);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mjpeg_content_type())
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from_stream(mjpeg_stream(reader, &state.stream)))
        .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(response)
}

/// Posture summary of everything recorded for the session
async fn session_summary(
    State(state): State<Arc<SessionState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    Ok(Json(state.events.summary(&session_id)))
}
