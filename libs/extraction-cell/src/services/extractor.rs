use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_utils::json::as_lenient_f64;

use crate::error::ExtractionError;
use crate::models::ExtractionCandidate;
use crate::services::model::{LanguageModel, ModelError};
use crate::services::schema::{coerce, SchemaSpec};

/// Wraps the language model with input checks, a per-attempt timeout, capped
/// retries and confidence scoring.
#[derive(Clone)]
pub struct ConfidenceScoredExtractor {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ConfidenceScoredExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, config: &AppConfig) -> Self {
        Self::with_policy(
            model,
            config.extraction_timeout(),
            config.extraction_max_attempts,
            config.retry_delay(),
        )
    }

    pub fn with_policy(
        model: Arc<dyn LanguageModel>,
        timeout: Duration,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            model,
            timeout,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub fn model(&self) -> Arc<dyn LanguageModel> {
        Arc::clone(&self.model)
    }

    pub async fn extract(&self, raw_text: &str, schema: &SchemaSpec) -> Result<ExtractionCandidate, ExtractionError> {
        let text = raw_text.trim();
        if text.is_empty() {
            return Err(ExtractionError::InvalidInput("text must not be empty".to_string()));
        }

        let raw = self.call_with_retries(text, schema).await?;
        let candidate = build_candidate(raw, schema);

        info!(
            "Extracted {} field(s) for '{}' with confidence {:.2}",
            candidate.fields.len(),
            schema.name,
            candidate.confidence
        );
        Ok(candidate)
    }

    async fn call_with_retries(&self, text: &str, schema: &SchemaSpec) -> Result<Value, ExtractionError> {
        let hint = schema.hint();
        let mut delay = self.retry_delay;
        let mut attempt = 1;

        loop {
            let failure = match timeout(self.timeout, self.model.understand(text, &hint)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err,
                Err(_) => ModelError::Transport(format!("no reply within {}s", self.timeout.as_secs_f32())),
            };

            if !failure.is_transient() || attempt >= self.max_attempts {
                warn!(
                    "'{}' extraction unavailable after {} attempt(s): {}",
                    schema.name, attempt, failure
                );
                return Err(ExtractionError::Unavailable(failure.to_string()));
            }

            debug!("Attempt {} for '{}' failed ({}), retrying in {:?}", attempt, schema.name, failure, delay);
            sleep(delay).await;
            delay *= 2;
            attempt += 1;
        }
    }
}

/// Turns untrusted model output into a candidate. Never fails: unexpected shapes
/// simply yield fewer fields.
pub(crate) fn build_candidate(raw: Value, schema: &SchemaSpec) -> ExtractionCandidate {
    let Value::Object(mut object) = raw else {
        warn!("Model output for '{}' is not a JSON object", schema.name);
        return ExtractionCandidate {
            fields: Map::new(),
            confidence: 0.0,
            rationale: "The model did not return structured data.".to_string(),
            has_invalid_fields: false,
        };
    };

    let reported = object.remove("confidence").as_ref().and_then(as_lenient_f64);
    let rationale = match object.remove("rationale") {
        Some(Value::String(text)) => text.trim().to_string(),
        _ => String::new(),
    };

    let fields: Map<String, Value> = match object.remove("fields") {
        Some(Value::Object(fields)) => fields,
        Some(_) | None => object,
    }
    .into_iter()
    .filter(|(_, value)| !value.is_null())
    .collect();

    let usable = |name: &str, value: &Value| {
        schema
            .field(name)
            .map(|spec| coerce(value, &spec.field_type, 0.0).is_ok())
            .unwrap_or(false)
    };
    let has_invalid_fields = fields.iter().any(|(name, value)| !usable(name, value));

    let confidence = match reported {
        Some(score) => score as f32,
        None => heuristic_confidence(&fields, schema, usable),
    };

    ExtractionCandidate {
        fields,
        confidence: clamp_confidence(confidence),
        rationale,
        has_invalid_fields,
    }
}

/// Required fields populated over required fields declared. Schemas without
/// required fields score the share of attempted fields that are usable.
fn heuristic_confidence(
    fields: &Map<String, Value>,
    schema: &SchemaSpec,
    usable: impl Fn(&str, &Value) -> bool,
) -> f32 {
    let required: Vec<_> = schema.required_fields().collect();

    if required.is_empty() {
        if fields.is_empty() {
            return 0.0;
        }
        let good = fields.iter().filter(|&(name, value)| usable(name, value)).count();
        return good as f32 / fields.len() as f32;
    }

    let populated = required
        .iter()
        .filter(|spec| {
            fields
                .iter()
                .any(|(name, value)| schema.field(name).map(|s| s.name) == Some(spec.name) && usable(name, value))
        })
        .count();
    populated as f32 / required.len() as f32
}

fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
