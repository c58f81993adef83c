// libs/voice-session-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

// ==============================================================================
// SESSION STATE
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
    Stopped,
    Processed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Processed)
    }

    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Idle, Recording) | (Recording, Stopped) | (Stopped, Processed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Recording => "recording",
            SessionState::Stopped => "stopped",
            SessionState::Processed => "processed",
        };
        f.write_str(name)
    }
}

/// A dictation session tied to one section of one consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSession {
    pub id: Uuid,
    pub consultation_id: Uuid,
    pub section_id: String,
    pub state: SessionState,
    /// Set on stop; an empty string means no speech was captured.
    pub transcript: Option<String>,
    pub created_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Whether the transcript has been handed to an extraction attempt.
    #[serde(default)]
    pub transcript_claimed: bool,
    pub extraction_succeeded: Option<bool>,
}

impl RecordingSession {
    pub fn new(consultation_id: Uuid, section_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            consultation_id,
            section_id,
            state: SessionState::Idle,
            transcript: None,
            created_at: Utc::now(),
            stopped_at: None,
            processed_at: None,
            transcript_claimed: false,
            extraction_succeeded: None,
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE DTOs
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionRequest {
    pub consultation_id: Uuid,
    pub section_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_id: Uuid,
    pub state: SessionState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopSessionRequest {
    #[serde(default)]
    pub transcript: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopSessionResponse {
    pub session_id: Uuid,
    pub state: SessionState,
    pub transcript: String,
    pub stopped_at: DateTime<Utc>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Invalid session request: {0}")]
    InvalidInput(String),

    #[error("Session {session_id} is already recording for this consultation section")]
    SessionAlreadyActive { session_id: Uuid },

    #[error("Cannot {operation} session {session_id} while it is {state}")]
    InvalidSessionState {
        session_id: Uuid,
        state: SessionState,
        operation: &'static str,
    },

    #[error("Recording session {0} not found")]
    NotFound(Uuid),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::InvalidInput(_) => AppError::InvalidInput(message),
            SessionError::SessionAlreadyActive { .. } => AppError::SessionAlreadyActive(message),
            SessionError::InvalidSessionState { .. } => AppError::InvalidSessionState(message),
            SessionError::NotFound(_) => AppError::NotFound(message),
        }
    }
}
