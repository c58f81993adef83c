use tracing::warn;

use crate::error::ExtractionError;
use crate::models::{CleanResult, DroppedField, ExtractionCandidate, Validated};
use crate::services::schema::{coerce, SchemaSpec};

/// Keeps every attempted field that fits the schema and records why the rest were dropped.
///
/// A single bad field never discards the candidate; only a candidate left with
/// no usable field at all is an `EmptyExtraction`.
pub fn validate(candidate: &ExtractionCandidate, schema: &SchemaSpec) -> Result<Validated, ExtractionError> {
    let mut clean = CleanResult::default();
    let mut dropped_fields = Vec::new();

    for (name, value) in &candidate.fields {
        let Some(spec) = schema.field(name) else {
            dropped_fields.push(DroppedField::new(name.as_str(), "not a recognised field"));
            continue;
        };

        if clean.fields.contains_key(spec.name) {
            dropped_fields.push(DroppedField::new(name.as_str(), format!("duplicates field '{}'", spec.name)));
            continue;
        }

        match coerce(value, &spec.field_type, candidate.confidence) {
            Ok(clean_value) => {
                clean.fields.insert(spec.name.to_string(), clean_value);
            }
            Err(reason) => dropped_fields.push(DroppedField::new(name.as_str(), reason)),
        }
    }

    for dropped in &dropped_fields {
        warn!(
            schema = schema.name,
            field = %dropped.field,
            reason = %dropped.reason,
            "Dropped extracted field"
        );
    }

    if clean.is_empty() {
        return Err(ExtractionError::EmptyExtraction { dropped: dropped_fields });
    }

    let missing_required = schema
        .required_fields()
        .filter(|spec| !clean.fields.contains_key(spec.name))
        .map(|spec| spec.name.to_string())
        .collect();

    Ok(Validated {
        clean,
        dropped_fields,
        missing_required,
    })
}
