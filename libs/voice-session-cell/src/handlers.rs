// libs/voice-session-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    RecordingSession, StartSessionRequest, StartSessionResponse, StopSessionRequest, StopSessionResponse,
};
use crate::services::SessionManager;

/// Start recording for a consultation section
#[axum::debug_handler]
pub async fn start_session(
    State(manager): State<Arc<SessionManager>>,
    Json(request): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<StartSessionResponse>), AppError> {
    let session = manager.start(request.consultation_id, &request.section_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(StartSessionResponse {
            session_id: session.id,
            state: session.state,
        }),
    ))
}

/// Stop recording and store the transcript
#[axum::debug_handler]
pub async fn stop_session(
    State(manager): State<Arc<SessionManager>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<StopSessionRequest>,
) -> Result<Json<StopSessionResponse>, AppError> {
    let session = manager.stop(session_id, request.transcript).await?;

    Ok(Json(StopSessionResponse {
        session_id: session.id,
        state: session.state,
        transcript: session.transcript.unwrap_or_default(),
        stopped_at: session.stopped_at.unwrap_or(session.created_at),
    }))
}

#[axum::debug_handler]
pub async fn get_session(
    State(manager): State<Arc<SessionManager>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<RecordingSession>, AppError> {
    let session = manager.get(session_id).await?;
    Ok(Json(session))
}
