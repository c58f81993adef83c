// libs/intake-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use extraction_cell::{
    AppointmentExtractor, ConfidenceScoredExtractor, ExtractionError, FilterExtractor, LanguageModel,
};
use shared_config::{AppConfig, ClassifierMode};
use shared_database::ClinicStore;
use shared_models::clinic::StoredFilterSet;
use shared_models::error::AppError;
use voice_session_cell::SessionManager;

use crate::models::{
    CommitAppointmentRequest, CommitContext, CommitFiltersRequest, CommitResult, NormalizedResponse, QueryContext,
    QueryRequest, TranscriptRequest, TranscriptResponse,
};
use crate::services::{CommitResolver, IntentClassifier, IntentOrchestrator, KeywordClassifier, ModelClassifier};

/// Everything the intake endpoints share.
#[derive(Clone)]
pub struct IntakeState {
    pub orchestrator: IntentOrchestrator,
    pub appointments: AppointmentExtractor,
    pub resolver: Arc<CommitResolver>,
    pub store: Arc<dyn ClinicStore>,
    pub sessions: Arc<SessionManager>,
}

impl IntakeState {
    pub fn new(
        config: &AppConfig,
        model: Arc<dyn LanguageModel>,
        store: Arc<dyn ClinicStore>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        let extractor = ConfidenceScoredExtractor::new(Arc::clone(&model), config);
        let appointments = AppointmentExtractor::new(extractor.clone(), config);

        let classifier: Arc<dyn IntentClassifier> = match config.intent_classifier {
            ClassifierMode::Keyword => Arc::new(KeywordClassifier),
            ClassifierMode::Model => Arc::new(ModelClassifier::new(model, config.extraction_timeout())),
        };

        Self {
            orchestrator: IntentOrchestrator::new(classifier, FilterExtractor::new(extractor), appointments.clone()),
            appointments,
            resolver: Arc::new(CommitResolver::new(Arc::clone(&store), config.auto_commit_min_confidence)),
            store,
            sessions,
        }
    }
}

/// Classify a free-form query and extract its structured payload
#[axum::debug_handler]
pub async fn handle_query(
    State(state): State<IntakeState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<NormalizedResponse>, AppError> {
    let context = QueryContext::at(request.reference_time.unwrap_or_else(Utc::now));
    let response = state.orchestrator.route(&request.query, &context).await?;
    Ok(Json(response))
}

/// Extract an appointment from a dictated transcript and try to book it
#[axum::debug_handler]
pub async fn process_transcript(
    State(state): State<IntakeState>,
    Json(request): Json<TranscriptRequest>,
) -> Result<(StatusCode, Json<TranscriptResponse>), AppError> {
    let reference = request.reference_time.unwrap_or_else(Utc::now);

    let transcript = match (request.session_id, request.transcript) {
        (Some(session_id), _) => state.sessions.claim_transcript(session_id).await?,
        (None, Some(transcript)) => transcript,
        (None, None) => {
            return Err(AppError::InvalidInput(
                "either transcript or session_id is required".to_string(),
            ))
        }
    };

    let appointments = state.appointments.clone();
    let sessions = Arc::clone(&state.sessions);
    let session_id = request.session_id;

    // Detached, so a claimed session is settled even if this request is dropped.
    let attempt = tokio::spawn(async move {
        let extraction = tokio::spawn(async move { appointments.extract(&transcript, reference).await });
        let extracted = match extraction.await {
            Ok(result) => result,
            Err(err) => {
                error!("Transcript extraction aborted: {}", err);
                Err(ExtractionError::Unavailable("extraction did not complete".to_string()))
            }
        };

        if let Some(session_id) = session_id {
            if let Err(err) = sessions.mark_processed(session_id, extracted.is_ok()).await {
                warn!("Could not mark session {} processed: {}", session_id, err);
            }
        }
        extracted
    });

    let intent = attempt
        .await
        .map_err(|err| AppError::ExtractionUnavailable(format!("transcript processing failed: {}", err)))??;
    let context = CommitContext {
        patient_id: request.patient_id,
        dentist_id: request.dentist_id,
        consultation_id: request.consultation_id,
        owner_id: None,
    };
    let commit = state.resolver.commit_appointment(&intent, &context).await;

    info!("Transcript processed with commit outcome {:?}", commit.outcome);
    Ok((commit.status_code(), Json(TranscriptResponse { intent, commit })))
}

/// Book an appointment intent, optionally with a user-confirmed start time
#[axum::debug_handler]
pub async fn commit_appointment(
    State(state): State<IntakeState>,
    Json(request): Json<CommitAppointmentRequest>,
) -> (StatusCode, Json<CommitResult>) {
    let result = match request.confirmed_start {
        Some(start) => {
            state
                .resolver
                .commit_confirmed_appointment(request.intent, start, &request.context)
                .await
        }
        None => state.resolver.commit_appointment(&request.intent, &request.context).await,
    };

    (result.status_code(), Json(result))
}

/// Save a cohort filter set
#[axum::debug_handler]
pub async fn commit_filters(
    State(state): State<IntakeState>,
    Json(request): Json<CommitFiltersRequest>,
) -> (StatusCode, Json<CommitResult>) {
    let result = state.resolver.commit_filter_set(&request.filters, &request.context).await;
    (result.status_code(), Json(result))
}

#[axum::debug_handler]
pub async fn get_filter_set(
    State(state): State<IntakeState>,
    Path(filter_set_id): Path<Uuid>,
) -> Result<Json<StoredFilterSet>, AppError> {
    match state.store.get_filter_set(filter_set_id).await {
        Ok(Some(filter_set)) => Ok(Json(filter_set)),
        Ok(None) => Err(AppError::NotFound(format!("Filter set {} not found", filter_set_id))),
        Err(err) => Err(AppError::StorageFailure(err.to_string())),
    }
}
