// libs/voice-session-cell/src/services/manager.rs
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{RecordingSession, SessionError, SessionState};

type SectionKey = (Uuid, String);

#[derive(Default)]
struct Registry {
    sessions: HashMap<Uuid, RecordingSession>,
    /// (consultation, section) -> the session currently recording for it.
    recording: HashMap<SectionKey, Uuid>,
}

impl Registry {
    fn session_mut(&mut self, session_id: Uuid) -> Result<&mut RecordingSession, SessionError> {
        self.sessions
            .get_mut(&session_id)
            .ok_or(SessionError::NotFound(session_id))
    }
}

/// Owns every recording session and enforces the session lifecycle.
///
/// All mutations go through one write lock, so at most one session can be
/// recording per (consultation, section) pair.
#[derive(Default)]
pub struct SessionManager {
    registry: RwLock<Registry>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start(&self, consultation_id: Uuid, section_id: &str) -> Result<RecordingSession, SessionError> {
        let section_id = section_id.trim();
        if section_id.is_empty() {
            return Err(SessionError::InvalidInput("section_id must not be empty".to_string()));
        }

        let key = (consultation_id, section_id.to_string());
        let mut registry = self.registry.write().await;

        if let Some(existing) = registry.recording.get(&key) {
            warn!(
                "Rejected second recording for consultation {} section '{}'",
                consultation_id, section_id
            );
            return Err(SessionError::SessionAlreadyActive { session_id: *existing });
        }

        let mut session = RecordingSession::new(consultation_id, section_id.to_string());
        session.state = SessionState::Recording;

        registry.recording.insert(key, session.id);
        registry.sessions.insert(session.id, session.clone());

        info!("Recording session {} started for consultation {}", session.id, consultation_id);
        Ok(session)
    }

    /// Stores the transcript and returns at once; extraction happens elsewhere.
    pub async fn stop(&self, session_id: Uuid, transcript: String) -> Result<RecordingSession, SessionError> {
        let mut registry = self.registry.write().await;
        let session = registry.session_mut(session_id)?;

        if !session.state.can_transition_to(&SessionState::Stopped) {
            return Err(SessionError::InvalidSessionState {
                session_id,
                state: session.state,
                operation: "stop",
            });
        }

        if transcript.trim().is_empty() {
            debug!("Session {} stopped without captured speech", session_id);
        }

        session.state = SessionState::Stopped;
        session.transcript = Some(transcript);
        session.stopped_at = Some(Utc::now());

        let stopped = session.clone();
        registry.recording.remove(&(stopped.consultation_id, stopped.section_id.clone()));

        info!("Recording session {} stopped", session_id);
        Ok(stopped)
    }

    /// Hands a stopped session's transcript to exactly one extraction attempt.
    pub async fn claim_transcript(&self, session_id: Uuid) -> Result<String, SessionError> {
        let mut registry = self.registry.write().await;
        let session = registry.session_mut(session_id)?;

        if session.state != SessionState::Stopped || session.transcript_claimed {
            return Err(SessionError::InvalidSessionState {
                session_id,
                state: session.state,
                operation: "claim the transcript of",
            });
        }

        session.transcript_claimed = true;
        Ok(session.transcript.clone().unwrap_or_default())
    }

    /// Records that the extraction attempt for a claimed transcript has finished.
    pub async fn mark_processed(&self, session_id: Uuid, extraction_succeeded: bool) -> Result<RecordingSession, SessionError> {
        let mut registry = self.registry.write().await;
        let session = registry.session_mut(session_id)?;

        if !session.transcript_claimed || !session.state.can_transition_to(&SessionState::Processed) {
            return Err(SessionError::InvalidSessionState {
                session_id,
                state: session.state,
                operation: "mark processed",
            });
        }

        session.state = SessionState::Processed;
        session.processed_at = Some(Utc::now());
        session.extraction_succeeded = Some(extraction_succeeded);

        debug!("Session {} processed (extraction succeeded: {})", session_id, extraction_succeeded);
        Ok(session.clone())
    }

    pub async fn get(&self, session_id: Uuid) -> Result<RecordingSession, SessionError> {
        self.registry
            .read()
            .await
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or(SessionError::NotFound(session_id))
    }

    pub async fn recording_for(&self, consultation_id: Uuid, section_id: &str) -> Option<RecordingSession> {
        let registry = self.registry.read().await;
        let id = registry.recording.get(&(consultation_id, section_id.to_string()))?;
        registry.sessions.get(id).cloned()
    }

    /// Drops processed sessions that stopped before `before`. Returns how many were removed.
    pub async fn reclaim_processed(&self, before: DateTime<Utc>) -> usize {
        let mut registry = self.registry.write().await;
        let initial = registry.sessions.len();

        registry.sessions.retain(|_, session| {
            !(session.state == SessionState::Processed && session.stopped_at.is_some_and(|at| at < before))
        });

        let removed = initial - registry.sessions.len();
        if removed > 0 {
            info!("Reclaimed {} processed recording session(s)", removed);
        }
        removed
    }
}
