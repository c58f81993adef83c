use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use shared_config::AppConfig;

use crate::error::ExtractionError;
use crate::models::{AppointmentIntent, CleanResult, MAX_DURATION_MINUTES};
use crate::services::dates::{self, Resolution};
use crate::services::extractor::ConfidenceScoredExtractor;
use crate::services::schema::{FieldSpec, FieldType, SchemaSpec};
use crate::services::validator::validate;

pub const APPOINTMENT_SCHEMA: &str = "appointment_request";

pub fn appointment_schema(reference: DateTime<Utc>) -> SchemaSpec {
    SchemaSpec::new(
        APPOINTMENT_SCHEMA,
        format!(
            "You read dictated or typed requests to book a dental appointment. The request was made on {} (UTC).",
            reference.format("%A %Y-%m-%d %H:%M")
        ),
        vec![
            FieldSpec::required(
                "when",
                FieldType::Text,
                "The time expression exactly as spoken, e.g. \"next Tuesday at 3pm\".",
            ),
            FieldSpec::optional("date", FieldType::Date, "The calendar date, only if it is unambiguous."),
            FieldSpec::optional("time", FieldType::Time, "The clock time, only if one was stated."),
            FieldSpec::optional("provider", FieldType::Text, "Name of the dentist, if mentioned."),
            FieldSpec::required("reason", FieldType::Text, "Why the patient is coming in."),
            FieldSpec::optional("duration_minutes", FieldType::Integer, "Length of the visit, if stated."),
        ],
    )
}

/// Produces an `AppointmentIntent` from a transcript, resolving relative times
/// against the request instant.
#[derive(Clone)]
pub struct AppointmentExtractor {
    extractor: ConfidenceScoredExtractor,
    default_minutes: i64,
}

impl AppointmentExtractor {
    pub fn new(extractor: ConfidenceScoredExtractor, config: &AppConfig) -> Self {
        Self {
            extractor,
            default_minutes: config.appointment_minutes(),
        }
    }

    pub async fn extract(&self, transcript: &str, reference: DateTime<Utc>) -> Result<AppointmentIntent, ExtractionError> {
        let schema = appointment_schema(reference);
        let candidate = self.extractor.extract(transcript, &schema).await?;
        let validated = validate(&candidate, &schema)?;
        let clean = &validated.clean;

        let mut notes = Vec::new();

        let duration_minutes = match clean.integer("duration_minutes") {
            Some(minutes) if (1..=MAX_DURATION_MINUTES).contains(&minutes) => minutes,
            Some(minutes) => {
                notes.push(format!("Ignored implausible duration of {} minutes.", minutes));
                self.default_minutes
            }
            None => self.default_minutes,
        };
        let duration = Duration::minutes(duration_minutes);

        let spoken = clean.text("when");
        let (resolution, time_expression) = match spoken.map(|phrase| (dates::resolve(phrase, reference, duration), phrase)) {
            Some((resolution, phrase)) if resolution.is_resolved() => (resolution, Some(phrase.to_string())),
            _ => match dates::resolve(transcript, reference, duration) {
                resolution if resolution.is_resolved() => (resolution, spoken.map(str::to_string)),
                unresolved => (self.from_model_parts(clean, reference, duration).unwrap_or(unresolved), spoken.map(str::to_string)),
            },
        };

        if !validated.dropped_fields.is_empty() {
            let names: Vec<&str> = validated.dropped_fields.iter().map(|d| d.field.as_str()).collect();
            notes.push(format!("Not understood: {}.", names.join(", ")));
        }
        if !resolution.when.is_exact() {
            notes.push("The time could not be pinned down and needs confirmation.".to_string());
        }

        let rationale = std::iter::once(candidate.rationale.clone())
            .chain(notes)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let intent = AppointmentIntent {
            when: resolution.when,
            time_expression,
            provider: clean.text("provider").map(str::to_string),
            reason: clean.text("reason").map(str::to_string),
            duration_minutes,
            confidence: candidate.confidence,
            needs_confirmation: resolution.needs_confirmation,
            rationale,
            dropped_fields: validated.dropped_fields,
        };

        info!(
            "Appointment intent extracted (exact: {}, needs confirmation: {}, confidence {:.2})",
            intent.when.is_exact(),
            intent.needs_confirmation,
            intent.confidence
        );
        Ok(intent)
    }

    fn from_model_parts(
        &self,
        clean: &CleanResult,
        reference: DateTime<Utc>,
        duration: Duration,
    ) -> Option<Resolution> {
        let date = clean.date("date")?;
        debug!("Falling back to the model's structured date {}", date);
        Some(dates::resolve_parts(date, clean.time("time"), reference, duration))
    }
}
