// libs/shared/models/src/filters.rs
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==============================================================================
// FILTER FIELDS
// ==============================================================================

/// The fixed set of clinical/demographic fields a research cohort can be filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Age,
    Gender,
    Diagnosis,
    TreatmentType,
    VisitDate,
    Smoker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Numeric,
    Text,
    Categorical(&'static [&'static str]),
    Date,
    Flag,
}

pub const GENDERS: &[&str] = &["female", "male", "other"];

pub const TREATMENT_TYPES: &[&str] = &[
    "cleaning",
    "filling",
    "extraction",
    "root_canal",
    "crown",
    "orthodontics",
    "implant",
    "whitening",
    "checkup",
];

impl FilterField {
    pub const ALL: [FilterField; 6] = [
        FilterField::Age,
        FilterField::Gender,
        FilterField::Diagnosis,
        FilterField::TreatmentType,
        FilterField::VisitDate,
        FilterField::Smoker,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterField::Age => "age",
            FilterField::Gender => "gender",
            FilterField::Diagnosis => "diagnosis",
            FilterField::TreatmentType => "treatment_type",
            FilterField::VisitDate => "visit_date",
            FilterField::Smoker => "smoker",
        }
    }

    /// Case-insensitive lookup; spaces and hyphens are read as underscores.
    pub fn from_name(name: &str) -> Option<FilterField> {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");
        FilterField::ALL
            .into_iter()
            .find(|field| field.as_str() == normalized)
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FilterField::Age => FieldKind::Numeric,
            FilterField::Gender => FieldKind::Categorical(GENDERS),
            FilterField::Diagnosis => FieldKind::Text,
            FilterField::TreatmentType => FieldKind::Categorical(TREATMENT_TYPES),
            FilterField::VisitDate => FieldKind::Date,
            FilterField::Smoker => FieldKind::Flag,
        }
    }

    pub fn allowed_operators(&self) -> &'static [FilterOperator] {
        use FilterOperator::*;
        match self.kind() {
            FieldKind::Numeric => &[Equals, NotEquals, GreaterThan, LessThan, Between],
            FieldKind::Date => &[Equals, GreaterThan, LessThan, Between],
            FieldKind::Text => &[Equals, Contains],
            FieldKind::Categorical(_) => &[Equals, NotEquals, In],
            FieldKind::Flag => &[Equals],
        }
    }

    /// Operator used when the extracted value carries none.
    pub fn default_operator(&self) -> FilterOperator {
        match self.kind() {
            FieldKind::Text => FilterOperator::Contains,
            _ => FilterOperator::Equals,
        }
    }

    pub fn supports(&self, operator: FilterOperator) -> bool {
        self.allowed_operators().contains(&operator)
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// OPERATORS AND VALUES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Between,
    Contains,
    In,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::GreaterThan => "greater_than",
            FilterOperator::LessThan => "less_than",
            FilterOperator::Between => "between",
            FilterOperator::Contains => "contains",
            FilterOperator::In => "in",
        }
    }

    pub fn from_name(name: &str) -> Option<FilterOperator> {
        match name.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "equals" | "eq" | "=" | "==" | "is" => Some(FilterOperator::Equals),
            "not_equals" | "neq" | "!=" | "is_not" => Some(FilterOperator::NotEquals),
            "greater_than" | "gt" | ">" | "after" | "over" => Some(FilterOperator::GreaterThan),
            "less_than" | "lt" | "<" | "before" | "under" => Some(FilterOperator::LessThan),
            "between" | "range" => Some(FilterOperator::Between),
            "contains" | "like" => Some(FilterOperator::Contains),
            "in" | "one_of" | "any_of" => Some(FilterOperator::In),
            _ => None,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    Number(f64),
    NumberRange { min: f64, max: f64 },
    Text(String),
    Date(NaiveDate),
    DateRange { from: NaiveDate, to: NaiveDate },
    Flag(bool),
    List(Vec<String>),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CriterionError {
    #[error("operator '{operator}' is not valid for field '{field}'")]
    OperatorNotAllowed { field: FilterField, operator: FilterOperator },

    #[error("value does not fit operator '{operator}' on field '{field}'")]
    ValueMismatch { field: FilterField, operator: FilterOperator },

    #[error("range for field '{0}' is empty or inverted")]
    InvertedRange(FilterField),

    #[error("'{value}' is not a recognised value for field '{field}'")]
    UnknownCategory { field: FilterField, value: String },
}

// ==============================================================================
// CRITERIA
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriterion {
    pub field: FilterField,
    pub operator: FilterOperator,
    pub value: FilterValue,
    pub confidence: f32,
}

impl FilterCriterion {
    /// Builds a criterion, enforcing that operator and value fit the field's type.
    pub fn new(
        field: FilterField,
        operator: FilterOperator,
        value: FilterValue,
        confidence: f32,
    ) -> Result<Self, CriterionError> {
        let criterion = Self {
            field,
            operator,
            value,
            confidence: confidence.clamp(0.0, 1.0),
        };
        criterion.check()?;
        Ok(criterion)
    }

    pub fn check(&self) -> Result<(), CriterionError> {
        let field = self.field;
        let operator = self.operator;

        if !field.supports(operator) {
            return Err(CriterionError::OperatorNotAllowed { field, operator });
        }

        let mismatch = || CriterionError::ValueMismatch { field, operator };

        match (field.kind(), operator, &self.value) {
            (FieldKind::Numeric, FilterOperator::Between, FilterValue::NumberRange { min, max }) => {
                if min > max {
                    return Err(CriterionError::InvertedRange(field));
                }
            }
            (FieldKind::Numeric, op, FilterValue::Number(_)) if op != FilterOperator::Between => {}
            (FieldKind::Date, FilterOperator::Between, FilterValue::DateRange { from, to }) => {
                if from > to {
                    return Err(CriterionError::InvertedRange(field));
                }
            }
            (FieldKind::Date, op, FilterValue::Date(_)) if op != FilterOperator::Between => {}
            (FieldKind::Text, _, FilterValue::Text(text)) => {
                if text.trim().is_empty() {
                    return Err(mismatch());
                }
            }
            (FieldKind::Categorical(allowed), FilterOperator::In, FilterValue::List(values)) => {
                if values.is_empty() {
                    return Err(mismatch());
                }
                if let Some(bad) = values.iter().find(|v| !allowed.contains(&v.as_str())) {
                    return Err(CriterionError::UnknownCategory { field, value: bad.clone() });
                }
            }
            (FieldKind::Categorical(allowed), op, FilterValue::Text(value)) if op != FilterOperator::In => {
                if !allowed.contains(&value.as_str()) {
                    return Err(CriterionError::UnknownCategory { field, value: value.clone() });
                }
            }
            (FieldKind::Flag, FilterOperator::Equals, FilterValue::Flag(_)) => {}
            _ => return Err(mismatch()),
        }

        Ok(())
    }
}

/// An unordered collection of criteria describing one research cohort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    pub criteria: Vec<FilterCriterion>,
}

impl FilterSet {
    pub fn new(criteria: Vec<FilterCriterion>) -> Self {
        Self { criteria }
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn fields(&self) -> Vec<FilterField> {
        let mut fields: Vec<FilterField> = self.criteria.iter().map(|c| c.field).collect();
        fields.sort();
        fields.dedup();
        fields
    }

    /// Order-independent comparison of field/operator/value triples.
    pub fn same_criteria(&self, other: &FilterSet) -> bool {
        if self.criteria.len() != other.criteria.len() {
            return false;
        }

        let mut used = vec![false; other.criteria.len()];
        self.criteria.iter().all(|mine| {
            let found = other.criteria.iter().enumerate().position(|(idx, theirs)| {
                !used[idx]
                    && theirs.field == mine.field
                    && theirs.operator == mine.operator
                    && theirs.value == mine.value
            });
            match found {
                Some(idx) => {
                    used[idx] = true;
                    true
                }
                None => false,
            }
        })
    }
}
