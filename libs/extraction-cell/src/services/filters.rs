use chrono::{DateTime, Utc};
use tracing::info;

use shared_models::filters::{FilterField, FilterSet};

use crate::error::ExtractionError;
use crate::models::FilterExtraction;
use crate::services::extractor::ConfidenceScoredExtractor;
use crate::services::schema::{FieldSpec, FieldType, SchemaSpec};
use crate::services::validator::validate;

pub const FILTER_SCHEMA: &str = "cohort_filters";

/// Builds the cohort filter schema; every recognised filter field is optional.
pub fn filter_schema(reference: DateTime<Utc>) -> SchemaSpec {
    let fields = FilterField::ALL
        .into_iter()
        .map(|field| {
            let description = match field {
                FilterField::Age => "Patient age in years.",
                FilterField::Gender => "Patient gender.",
                FilterField::Diagnosis => "Diagnosis or condition text.",
                FilterField::TreatmentType => "Kind of treatment received.",
                FilterField::VisitDate => "Date of the visit; resolve relative periods to ISO dates.",
                FilterField::Smoker => "Whether the patient smokes.",
            };
            FieldSpec::optional(field.as_str(), FieldType::Criterion(field), description)
        })
        .collect();

    SchemaSpec::new(
        FILTER_SCHEMA,
        format!(
            "You turn a clinician's description of a research cohort into filter criteria. Today is {}.",
            reference.format("%Y-%m-%d")
        ),
        fields,
    )
}

/// Produces a cohort `FilterSet` from free text.
#[derive(Clone)]
pub struct FilterExtractor {
    extractor: ConfidenceScoredExtractor,
}

impl FilterExtractor {
    pub fn new(extractor: ConfidenceScoredExtractor) -> Self {
        Self { extractor }
    }

    pub async fn extract(&self, query: &str, reference: DateTime<Utc>) -> Result<FilterExtraction, ExtractionError> {
        let schema = filter_schema(reference);
        let candidate = self.extractor.extract(query, &schema).await?;
        let validated = validate(&candidate, &schema)?;

        let mut rationale = candidate.rationale.clone();
        if !validated.dropped_fields.is_empty() {
            let names: Vec<&str> = validated.dropped_fields.iter().map(|d| d.field.as_str()).collect();
            if !rationale.is_empty() {
                rationale.push(' ');
            }
            rationale.push_str(&format!("Not understood: {}.", names.join(", ")));
        }

        let filters = FilterSet::new(validated.clean.criteria());
        info!(
            "Extracted {} filter criteria ({} dropped)",
            filters.criteria.len(),
            validated.dropped_fields.len()
        );

        Ok(FilterExtraction {
            filters,
            confidence: candidate.confidence,
            rationale,
            dropped_fields: validated.dropped_fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use assert_matches::assert_matches;
    use serde_json::json;
    use shared_models::filters::{FilterOperator, FilterValue};
    use shared_utils::test_utils::reference_monday;
    use std::sync::Arc;
    use std::time::Duration;

    fn extractor(model: ScriptedModel) -> FilterExtractor {
        FilterExtractor::new(ConfidenceScoredExtractor::with_policy(
            Arc::new(model),
            Duration::from_secs(1),
            1,
            Duration::from_millis(1),
        ))
    }

    #[test]
    fn test_schema_covers_every_filter_field() {
        let schema = filter_schema(reference_monday());
        assert_eq!(schema.fields.len(), FilterField::ALL.len());
        assert!(schema.required_fields().next().is_none());
        assert!(schema.instructions.contains("2024-06-03"));
    }

    #[tokio::test]
    async fn test_unrecognised_fields_are_reported() {
        let model = ScriptedModel::new().with_reply(json!({
            "fields": {
                "age": {"operator": "greater_than", "value": 40},
                "diagnosis": "periodontitis",
                "blood_type": "O+"
            },
            "confidence": 0.8,
            "rationale": "Adults over 40 with gum disease."
        }));

        let result = extractor(model)
            .extract("patients over 40 with periodontitis and blood type O+", reference_monday())
            .await
            .unwrap();

        assert_eq!(result.filters.criteria.len(), 2);
        assert_eq!(result.dropped_fields.len(), 1);
        assert_eq!(result.dropped_fields[0].field, "blood_type");
        assert_eq!(result.rationale, "Adults over 40 with gum disease. Not understood: blood_type.");

        let age = result.filters.criteria.iter().find(|c| c.field == FilterField::Age).unwrap();
        assert_eq!(age.operator, FilterOperator::GreaterThan);
        assert_eq!(age.value, FilterValue::Number(40.0));
    }

    #[tokio::test]
    async fn test_only_unknown_fields_is_empty_extraction() {
        let model = ScriptedModel::new().with_reply(json!({"fields": {"shoe_size": 44}}));
        let err = extractor(model).extract("big feet", reference_monday()).await.unwrap_err();
        assert_matches!(err, ExtractionError::EmptyExtraction { dropped } if dropped[0].field == "shoe_size");
    }
}
