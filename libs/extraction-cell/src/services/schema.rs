use chrono::{NaiveDate, NaiveTime};
use serde_json::{Map, Value};

use shared_models::filters::{FieldKind, FilterCriterion, FilterField, FilterOperator, FilterValue};
use shared_utils::json::as_lenient_f64;

use crate::models::CleanValue;
use crate::services::model::SchemaHint;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldType {
    Text,
    Number,
    Integer,
    Boolean,
    Enum(&'static [&'static str]),
    /// `YYYY-MM-DD`
    Date,
    /// `HH:MM`
    Time,
    Criterion(FilterField),
}

impl FieldType {
    fn describe(&self) -> String {
        match self {
            FieldType::Text => "string".to_string(),
            FieldType::Number => "number".to_string(),
            FieldType::Integer => "integer".to_string(),
            FieldType::Boolean => "boolean".to_string(),
            FieldType::Enum(values) => format!("one of [{}]", values.join(", ")),
            FieldType::Date => "date as YYYY-MM-DD".to_string(),
            FieldType::Time => "24h time as HH:MM".to_string(),
            FieldType::Criterion(field) => {
                let operators: Vec<&str> = field.allowed_operators().iter().map(|op| op.as_str()).collect();
                let values = match field.kind() {
                    FieldKind::Numeric => "number (use min/max for between)".to_string(),
                    FieldKind::Text => "text".to_string(),
                    FieldKind::Categorical(allowed) => format!("one of [{}] (use values for in)", allowed.join(", ")),
                    FieldKind::Date => "date as YYYY-MM-DD (use from/to for between)".to_string(),
                    FieldKind::Flag => "true or false".to_string(),
                };
                format!(
                    "object {{\"operator\": one of [{}], \"value\": {}, \"confidence\": 0..1}}",
                    operators.join(", "),
                    values
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub description: &'static str,
}

impl FieldSpec {
    pub fn required(name: &'static str, field_type: FieldType, description: &'static str) -> Self {
        Self { name, field_type, required: true, description }
    }

    pub fn optional(name: &'static str, field_type: FieldType, description: &'static str) -> Self {
        Self { name, field_type, required: false, description }
    }
}

/// The fixed shape a specialized extractor asks the model for.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSpec {
    pub name: &'static str,
    pub instructions: String,
    pub fields: Vec<FieldSpec>,
}

impl SchemaSpec {
    pub fn new(name: &'static str, instructions: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name,
            instructions: instructions.into(),
            fields,
        }
    }

    /// Finds a declared field; matching ignores case and reads spaces or hyphens as underscores.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        let normalized = normalize_name(name);
        self.fields.iter().find(|spec| spec.name == normalized)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|spec| spec.required)
    }

    pub fn hint(&self) -> SchemaHint {
        let mut prompt = String::new();
        prompt.push_str(&self.instructions);
        prompt.push_str("\n\nReply with a single JSON object of the form ");
        prompt.push_str(r#"{"fields": {<field>: <value>}, "confidence": <number 0..1>, "rationale": "<short explanation>"}."#);
        prompt.push_str("\nOnly use these fields and leave out anything the text does not state:\n");

        for spec in &self.fields {
            prompt.push_str(&format!(
                "- {}{}: {}. {}\n",
                spec.name,
                if spec.required { " (required)" } else { "" },
                spec.field_type.describe(),
                spec.description
            ));
        }
        prompt.push_str("Mention anything you could not map to these fields in the rationale.");

        SchemaHint {
            schema_name: self.name.to_string(),
            system_prompt: prompt,
        }
    }
}

pub(crate) fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace([' ', '-'], "_")
}

// ==============================================================================
// COERCION
// ==============================================================================

/// Converts a raw model value to the declared type with at most one well-defined coercion.
///
/// `default_confidence` is used for criteria that carry no confidence of their own.
pub fn coerce(value: &Value, field_type: &FieldType, default_confidence: f32) -> Result<CleanValue, String> {
    match field_type {
        FieldType::Text => coerce_text(value).map(CleanValue::Text),
        FieldType::Number => as_lenient_f64(value)
            .map(CleanValue::Number)
            .ok_or_else(|| format!("expected a number, got {}", value)),
        FieldType::Integer => coerce_integer(value).map(CleanValue::Integer),
        FieldType::Boolean => coerce_bool(value).map(CleanValue::Boolean),
        FieldType::Enum(allowed) => coerce_enum(value, allowed).map(|v| CleanValue::Text(v.to_string())),
        FieldType::Date => coerce_date(value).map(CleanValue::Date),
        FieldType::Time => coerce_time(value).map(CleanValue::Time),
        FieldType::Criterion(field) => coerce_criterion(*field, value, default_confidence).map(CleanValue::Criterion),
    }
}

fn coerce_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Value::String(_) => Err("empty text".to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("expected text, got {}", other)),
    }
}

fn coerce_integer(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 1e15).map(|f| f as i64))
            .ok_or_else(|| format!("expected an integer, got {}", n)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("expected an integer, got \"{}\"", s)),
        other => Err(format!("expected an integer, got {}", other)),
    }
}

fn coerce_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Ok(true),
            "false" | "no" => Ok(false),
            _ => Err(format!("expected true or false, got \"{}\"", s)),
        },
        other => Err(format!("expected true or false, got {}", other)),
    }
}

fn coerce_enum(value: &Value, allowed: &'static [&'static str]) -> Result<&'static str, String> {
    let raw = value
        .as_str()
        .ok_or_else(|| format!("expected one of [{}], got {}", allowed.join(", "), value))?;
    let normalized = normalize_name(raw);
    allowed
        .iter()
        .find(|candidate| normalize_name(candidate) == normalized)
        .copied()
        .ok_or_else(|| format!("\"{}\" is not one of [{}]", raw, allowed.join(", ")))
}

fn coerce_date(value: &Value) -> Result<NaiveDate, String> {
    let raw = value.as_str().ok_or_else(|| format!("expected a YYYY-MM-DD date, got {}", value))?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| format!("\"{}\" is not a YYYY-MM-DD date", raw))
}

fn coerce_time(value: &Value) -> Result<NaiveTime, String> {
    let raw = value.as_str().ok_or_else(|| format!("expected an HH:MM time, got {}", value))?;
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| format!("\"{}\" is not an HH:MM time", raw))
}

fn coerce_criterion(field: FilterField, value: &Value, default_confidence: f32) -> Result<FilterCriterion, String> {
    let (operator, filter_value, confidence) = match value {
        Value::Object(object) => criterion_from_object(field, object, default_confidence)?,
        Value::Array(items) => {
            let (operator, filter_value) = criterion_from_array(field, items)?;
            (operator, filter_value, default_confidence)
        }
        scalar => {
            let operator = field.default_operator();
            (operator, scalar_value(field, scalar)?, default_confidence)
        }
    };

    FilterCriterion::new(field, operator, filter_value, confidence).map_err(|e| e.to_string())
}

fn criterion_from_object(
    field: FilterField,
    object: &Map<String, Value>,
    default_confidence: f32,
) -> Result<(FilterOperator, FilterValue, f32), String> {
    let confidence = object
        .get("confidence")
        .and_then(as_lenient_f64)
        .map(|c| c as f32)
        .unwrap_or(default_confidence);

    let named_operator = match object.get("operator").or_else(|| object.get("op")) {
        Some(Value::String(name)) => {
            Some(FilterOperator::from_name(name).ok_or_else(|| format!("unknown operator \"{}\"", name))?)
        }
        Some(other) => return Err(format!("operator must be text, got {}", other)),
        None => None,
    };

    let has_bounds = ["min", "max", "from", "to"].iter().any(|key| object.contains_key(*key));
    let operator = named_operator.unwrap_or(if has_bounds {
        FilterOperator::Between
    } else if object.contains_key("values") {
        FilterOperator::In
    } else {
        field.default_operator()
    });

    let filter_value = match operator {
        FilterOperator::Between => range_value(field, object)?,
        FilterOperator::In => {
            let items = match object.get("values").or_else(|| object.get("value")) {
                Some(Value::Array(items)) => items.clone(),
                Some(single) => vec![single.clone()],
                None => return Err("missing values".to_string()),
            };
            FilterValue::List(category_list(field, &items)?)
        }
        _ => {
            let raw = object.get("value").ok_or_else(|| "missing value".to_string())?;
            scalar_value(field, raw)?
        }
    };

    Ok((operator, filter_value, confidence))
}

fn criterion_from_array(field: FilterField, items: &[Value]) -> Result<(FilterOperator, FilterValue), String> {
    match field.kind() {
        FieldKind::Categorical(_) => Ok((FilterOperator::In, FilterValue::List(category_list(field, items)?))),
        FieldKind::Numeric | FieldKind::Date if items.len() == 2 => {
            let value = bounds_value(field, &items[0], &items[1])?;
            Ok((FilterOperator::Between, value))
        }
        _ => Err(format!("a list is not a valid value for {}", field)),
    }
}

fn range_value(field: FilterField, object: &Map<String, Value>) -> Result<FilterValue, String> {
    let lower = object.get("min").or_else(|| object.get("from"));
    let upper = object.get("max").or_else(|| object.get("to"));

    match (lower, upper, object.get("value")) {
        (Some(lower), Some(upper), _) => bounds_value(field, lower, upper),
        (_, _, Some(Value::Array(items))) if items.len() == 2 => bounds_value(field, &items[0], &items[1]),
        _ => Err("a range needs both bounds".to_string()),
    }
}

fn bounds_value(field: FilterField, lower: &Value, upper: &Value) -> Result<FilterValue, String> {
    match field.kind() {
        FieldKind::Numeric => {
            let min = as_lenient_f64(lower).ok_or_else(|| format!("range bound {} is not a number", lower))?;
            let max = as_lenient_f64(upper).ok_or_else(|| format!("range bound {} is not a number", upper))?;
            Ok(FilterValue::NumberRange { min, max })
        }
        FieldKind::Date => Ok(FilterValue::DateRange {
            from: coerce_date(lower)?,
            to: coerce_date(upper)?,
        }),
        _ => Err(format!("{} does not take a range", field)),
    }
}

fn scalar_value(field: FilterField, value: &Value) -> Result<FilterValue, String> {
    match field.kind() {
        FieldKind::Numeric => as_lenient_f64(value)
            .map(FilterValue::Number)
            .ok_or_else(|| format!("expected a number for {}, got {}", field, value)),
        FieldKind::Text => coerce_text(value).map(FilterValue::Text),
        FieldKind::Categorical(allowed) => coerce_enum(value, allowed).map(|v| FilterValue::Text(v.to_string())),
        FieldKind::Date => coerce_date(value).map(FilterValue::Date),
        FieldKind::Flag => coerce_bool(value).map(FilterValue::Flag),
    }
}

fn category_list(field: FilterField, items: &[Value]) -> Result<Vec<String>, String> {
    let FieldKind::Categorical(allowed) = field.kind() else {
        return Err(format!("{} does not take a list of values", field));
    };
    items
        .iter()
        .map(|item| coerce_enum(item, allowed).map(str::to_string))
        .collect()
}
