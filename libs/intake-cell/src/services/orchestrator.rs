// libs/intake-cell/src/services/orchestrator.rs
use std::sync::Arc;

use tracing::{info, instrument};

use extraction_cell::{AppointmentExtractor, ExtractionError, FilterExtractor};

use crate::models::{IntakePayload, Intent, NormalizedResponse, QueryContext};
use crate::services::classifier::IntentClassifier;

/// Classifies a free-form query and dispatches it to exactly one extractor.
#[derive(Clone)]
pub struct IntentOrchestrator {
    classifier: Arc<dyn IntentClassifier>,
    filters: FilterExtractor,
    appointments: AppointmentExtractor,
}

impl IntentOrchestrator {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        filters: FilterExtractor,
        appointments: AppointmentExtractor,
    ) -> Self {
        Self {
            classifier,
            filters,
            appointments,
        }
    }

    #[instrument(skip(self, context), fields(len = query.len()))]
    pub async fn route(&self, query: &str, context: &QueryContext) -> Result<NormalizedResponse, ExtractionError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ExtractionError::InvalidInput("query must not be empty".to_string()));
        }

        let intent = self.classifier.classify(query).await;
        info!("Query classified as {}", intent);

        match intent {
            Intent::FilterExtraction => {
                let extraction = self.filters.extract(query, context.reference_time).await?;

                let mut warnings = Vec::new();
                if !extraction.dropped_fields.is_empty() {
                    warnings.push(format!("{} field(s) were not understood", extraction.dropped_fields.len()));
                }

                Ok(NormalizedResponse {
                    intent,
                    query: query.to_string(),
                    payload: IntakePayload::Filters { filters: extraction.filters },
                    confidence: extraction.confidence,
                    dropped_fields: extraction.dropped_fields,
                    rationale: extraction.rationale,
                    warnings,
                })
            }
            Intent::AppointmentScheduling => {
                let appointment = self.appointments.extract(query, context.reference_time).await?;

                let mut warnings = Vec::new();
                if !appointment.dropped_fields.is_empty() {
                    warnings.push(format!("{} field(s) were not understood", appointment.dropped_fields.len()));
                }
                if appointment.needs_confirmation {
                    warnings.push("The appointment time needs confirmation before it can be booked".to_string());
                }

                Ok(NormalizedResponse {
                    intent,
                    query: query.to_string(),
                    confidence: appointment.confidence,
                    dropped_fields: appointment.dropped_fields.clone(),
                    rationale: appointment.rationale.clone(),
                    payload: IntakePayload::Appointment { appointment },
                    warnings,
                })
            }
            Intent::GeneralConversation => Ok(NormalizedResponse::empty(
                intent,
                query,
                "No clinical action was requested.",
            )),
            Intent::Unknown => Ok(NormalizedResponse::empty(
                intent,
                query,
                "The request could not be matched to a supported action.",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::classifier::KeywordClassifier;
    use assert_matches::assert_matches;
    use extraction_cell::testing::ScriptedModel;
    use extraction_cell::{AppointmentTime, ConfidenceScoredExtractor};
    use serde_json::json;
    use shared_config::AppConfig;
    use shared_models::filters::FilterField;
    use shared_utils::test_utils::{reference_monday, utc};
    use std::time::Duration;

    fn orchestrator(model: Arc<ScriptedModel>) -> IntentOrchestrator {
        let extractor =
            ConfidenceScoredExtractor::with_policy(model, Duration::from_secs(1), 1, Duration::from_millis(1));
        IntentOrchestrator::new(
            Arc::new(KeywordClassifier),
            FilterExtractor::new(extractor.clone()),
            AppointmentExtractor::new(extractor, &AppConfig::default()),
        )
    }

    fn context() -> QueryContext {
        QueryContext::at(reference_monday())
    }

    #[tokio::test]
    async fn test_filter_query_routes_to_filter_schema() {
        let model = Arc::new(ScriptedModel::new().with_reply(json!({
            "fields": {"age": {"operator": "greater_than", "value": 40}, "shoe_size": 44},
            "confidence": 0.85
        })));

        let response = orchestrator(model.clone())
            .route("patients over 40 with periodontitis", &context())
            .await
            .unwrap();

        assert_eq!(response.intent, Intent::FilterExtraction);
        assert_matches!(&response.payload, IntakePayload::Filters { filters } if filters.fields() == vec![FilterField::Age]);
        assert_eq!(response.dropped_fields[0].field, "shoe_size");
        assert_eq!(response.warnings.len(), 1);
        assert_eq!(model.calls()[0].schema_name, "cohort_filters");
    }

    #[tokio::test]
    async fn test_scheduling_query_resolves_time() {
        let model = Arc::new(ScriptedModel::new().with_reply(json!({
            "when": "next Tuesday at 3pm",
            "reason": "filling",
            "confidence": 0.9
        })));

        let response = orchestrator(model.clone())
            .route("Book a filling next Tuesday at 3pm", &context())
            .await
            .unwrap();

        assert_eq!(response.intent, Intent::AppointmentScheduling);
        assert_matches!(
            &response.payload,
            IntakePayload::Appointment { appointment }
                if appointment.when == AppointmentTime::Exact { start: utc(2024, 6, 4, 15, 0), end: utc(2024, 6, 4, 15, 30) }
        );
        assert!(response.warnings.is_empty());
        assert_eq!(model.calls()[0].schema_name, "appointment_request");
    }

    #[tokio::test]
    async fn test_conversation_skips_extraction() {
        let model = Arc::new(ScriptedModel::new());
        let response = orchestrator(model.clone()).route("what is the weather", &context()).await.unwrap();

        assert_eq!(response.intent, Intent::GeneralConversation);
        assert_eq!(response.payload, IntakePayload::Empty {});
        assert_eq!(response.confidence, 0.0);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_query_is_invalid() {
        let model = Arc::new(ScriptedModel::new());
        let err = orchestrator(model.clone()).route("   ", &context()).await.unwrap_err();
        assert_matches!(err, ExtractionError::InvalidInput(_));
        assert_eq!(model.call_count(), 0);
    }
}
