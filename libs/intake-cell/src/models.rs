// libs/intake-cell/src/models.rs
use std::fmt;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use extraction_cell::models::{AppointmentIntent, DroppedField};
use shared_models::error::ErrorKind;
use shared_models::filters::FilterSet;

// ==============================================================================
// INTENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    FilterExtraction,
    AppointmentScheduling,
    GeneralConversation,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::AppointmentScheduling,
        Intent::FilterExtraction,
        Intent::GeneralConversation,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::FilterExtraction => "filter_extraction",
            Intent::AppointmentScheduling => "appointment_scheduling",
            Intent::GeneralConversation => "general_conversation",
            Intent::Unknown => "unknown",
        }
    }

    pub fn from_name(name: &str) -> Option<Intent> {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");
        Intent::ALL.into_iter().find(|intent| intent.as_str() == normalized)
    }

    /// Lower wins when cues tie: scheduling, then filters, then conversation.
    pub fn priority(&self) -> u8 {
        match self {
            Intent::AppointmentScheduling => 0,
            Intent::FilterExtraction => 1,
            Intent::GeneralConversation => 2,
            Intent::Unknown => 3,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryContext {
    /// Instant relative expressions are resolved against; the request time.
    pub reference_time: DateTime<Utc>,
}

impl QueryContext {
    pub fn at(reference_time: DateTime<Utc>) -> Self {
        Self { reference_time }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IntakePayload {
    Filters { filters: FilterSet },
    Appointment { appointment: AppointmentIntent },
    Empty {},
}

/// One envelope for every branch of the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedResponse {
    pub intent: Intent,
    pub query: String,
    pub payload: IntakePayload,
    pub confidence: f32,
    pub dropped_fields: Vec<DroppedField>,
    pub rationale: String,
    /// Partial-success notes, e.g. fields that were not understood.
    pub warnings: Vec<String>,
}

impl NormalizedResponse {
    pub fn empty(intent: Intent, query: &str, rationale: impl Into<String>) -> Self {
        Self {
            intent,
            query: query.to_string(),
            payload: IntakePayload::Empty {},
            confidence: 0.0,
            dropped_fields: Vec::new(),
            rationale: rationale.into(),
            warnings: Vec::new(),
        }
    }
}

// ==============================================================================
// COMMITS
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitContext {
    pub patient_id: Option<Uuid>,
    pub dentist_id: Option<Uuid>,
    pub consultation_id: Option<Uuid>,
    /// Clinician saving a filter set.
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    Created,
    Conflict,
    Rejected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitReason {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicting_ids: Vec<Uuid>,
    /// Underlying storage cause; logged, never serialized.
    #[serde(skip)]
    pub cause: Option<String>,
}

/// Terminal result of one commit attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitResult {
    pub outcome: CommitOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<CommitReason>,
}

impl CommitResult {
    pub fn created(entity_id: Uuid) -> Self {
        Self {
            outcome: CommitOutcome::Created,
            entity_id: Some(entity_id),
            reason: None,
        }
    }

    pub fn conflict(conflicting_ids: Vec<Uuid>) -> Self {
        Self {
            outcome: CommitOutcome::Conflict,
            entity_id: None,
            reason: Some(CommitReason {
                kind: ErrorKind::ConflictDetected,
                message: format!("The requested time overlaps {} existing booking(s)", conflicting_ids.len()),
                conflicting_ids,
                cause: None,
            }),
        }
    }

    pub fn rejected(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            outcome: CommitOutcome::Rejected,
            entity_id: None,
            reason: Some(CommitReason {
                kind,
                message: message.into(),
                conflicting_ids: Vec::new(),
                cause: None,
            }),
        }
    }

    pub fn error(cause: impl Into<String>) -> Self {
        Self {
            outcome: CommitOutcome::Error,
            entity_id: None,
            reason: Some(CommitReason {
                kind: ErrorKind::StorageFailure,
                message: "The record could not be saved".to_string(),
                conflicting_ids: Vec::new(),
                cause: Some(cause.into()),
            }),
        }
    }

    pub fn is_created(&self) -> bool {
        self.outcome == CommitOutcome::Created
    }

    pub fn reason_kind(&self) -> Option<ErrorKind> {
        self.reason.as_ref().map(|reason| reason.kind)
    }

    pub fn status_code(&self) -> StatusCode {
        match (&self.outcome, &self.reason) {
            (CommitOutcome::Created, _) => StatusCode::CREATED,
            (_, Some(reason)) => reason.kind.status_code(),
            (_, None) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE DTOs
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub reference_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptRequest {
    pub transcript: Option<String>,
    /// A stopped recording session whose transcript should be used.
    pub session_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub dentist_id: Option<Uuid>,
    pub consultation_id: Option<Uuid>,
    pub reference_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptResponse {
    pub intent: AppointmentIntent,
    pub commit: CommitResult,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitAppointmentRequest {
    pub intent: AppointmentIntent,
    #[serde(default)]
    pub context: CommitContext,
    /// Start time explicitly confirmed by the user.
    pub confirmed_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitFiltersRequest {
    pub filters: FilterSet,
    #[serde(default)]
    pub context: CommitContext,
}
