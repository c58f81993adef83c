// libs/extraction-cell/src/models.rs
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use shared_models::filters::{FilterCriterion, FilterSet};

// ==============================================================================
// EXTRACTION CANDIDATES
// ==============================================================================

/// Unvalidated structured guess produced from free text by the language model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionCandidate {
    /// Field name to raw model value. Null values are not kept.
    pub fields: Map<String, Value>,
    pub confidence: f32,
    pub rationale: String,
    /// Set when at least one field is undeclared or cannot be coerced to its declared type.
    pub has_invalid_fields: bool,
}

impl ExtractionCandidate {
    pub fn attempted_fields(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedField {
    pub field: String,
    pub reason: String,
}

impl DroppedField {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ==============================================================================
// VALIDATED RESULTS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CleanValue {
    Text(String),
    Number(f64),
    Integer(i64),
    Boolean(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Criterion(FilterCriterion),
}

/// Fields that survived validation, keyed by their declared schema name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanResult {
    pub fields: BTreeMap<String, CleanValue>,
}

impl CleanResult {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(CleanValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.fields.get(name) {
            Some(CleanValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        match self.fields.get(name) {
            Some(CleanValue::Date(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn time(&self, name: &str) -> Option<NaiveTime> {
        match self.fields.get(name) {
            Some(CleanValue::Time(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn criteria(&self) -> Vec<FilterCriterion> {
        self.fields
            .values()
            .filter_map(|value| match value {
                CleanValue::Criterion(criterion) => Some(criterion.clone()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validated {
    pub clean: CleanResult,
    pub dropped_fields: Vec<DroppedField>,
    /// Required fields the model did not provide at all.
    pub missing_required: Vec<String>,
}

// ==============================================================================
// DOMAIN EXTRACTIONS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterExtraction {
    pub filters: FilterSet,
    pub confidence: f32,
    pub rationale: String,
    pub dropped_fields: Vec<DroppedField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppointmentTime {
    /// A concrete start instant.
    Exact { start: DateTime<Utc>, end: DateTime<Utc> },
    /// Only a window is known; the user has to pick a time.
    Window { start: DateTime<Utc>, end: DateTime<Utc> },
    Unresolved,
}

impl AppointmentTime {
    pub fn is_exact(&self) -> bool {
        matches!(self, AppointmentTime::Exact { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentIntent {
    pub when: AppointmentTime,
    /// Verbatim time phrase the resolution was based on.
    pub time_expression: Option<String>,
    pub provider: Option<String>,
    pub reason: Option<String>,
    pub duration_minutes: i64,
    pub confidence: f32,
    pub needs_confirmation: bool,
    pub rationale: String,
    #[serde(default)]
    pub dropped_fields: Vec<DroppedField>,
}

/// Longest visit a single booking may cover.
pub const MAX_DURATION_MINUTES: i64 = 8 * 60;

impl AppointmentIntent {
    pub fn has_plausible_duration(&self) -> bool {
        (1..=MAX_DURATION_MINUTES).contains(&self.duration_minutes)
    }

    /// Applies an explicit user confirmation of the start time.
    ///
    /// `None` when the duration is implausible or the end falls off the calendar.
    pub fn confirm(mut self, start: DateTime<Utc>) -> Option<Self> {
        if !self.has_plausible_duration() {
            return None;
        }
        let end = start.checked_add_signed(TimeDelta::try_minutes(self.duration_minutes)?)?;
        self.when = AppointmentTime::Exact { start, end };
        self.needs_confirmation = false;
        Some(self)
    }
}
