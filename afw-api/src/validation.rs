//! Record validation against an entity spec
//!
//! Validation never stops at the first problem: every field is checked and
//! the full error map is returned.

use afw_common::spec::{EntitySpec, FieldSpec, FieldType, SYSTEM_COLUMNS};
use afw_common::time::{is_valid_date, timestamp_ms};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::FieldErrors;
use crate::query::parse_bool;

/// Outcome of a validation pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: FieldErrors,
}

impl ValidationResult {
    /// Nothing to check
    pub fn passed() -> Self {
        Self::from_errors(FieldErrors::new())
    }

    fn from_errors(errors: FieldErrors) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validate a full record for create (or full replace)
pub fn validate_entity(spec: &EntitySpec, data: &Map<String, Value>) -> ValidationResult {
    validate(spec, data, false)
}

/// Validate a partial update: required fields may be omitted, present ones
/// must still be valid
pub fn validate_update(spec: &EntitySpec, data: &Map<String, Value>) -> ValidationResult {
    validate(spec, data, true)
}

fn validate(spec: &EntitySpec, data: &Map<String, Value>, partial: bool) -> ValidationResult {
    let mut errors = FieldErrors::new();

    for key in data.keys() {
        if !spec.has_field(key) && !SYSTEM_COLUMNS.contains(&key.as_str()) {
            errors.insert(key.clone(), "unknown field".to_string());
        }
    }

    for field in &spec.fields {
        let outcome = match data.get(&field.name) {
            None if field.required && !partial => Err("is required".to_string()),
            None => Ok(()),
            // Explicitly present but empty counts as missing
            Some(value) if field.required && is_empty(value) => Err("is required".to_string()),
            // null clears an optional field
            Some(Value::Null) => Ok(()),
            // An empty string is still a value of the field's type
            Some(value) => check_value(field, value),
        };
        if let Err(message) = outcome {
            errors.insert(field.name.clone(), message);
        }
    }

    ValidationResult::from_errors(errors)
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn check_value(field: &FieldSpec, value: &Value) -> Result<(), String> {
    match field.field_type {
        FieldType::Text => match value {
            Value::String(_) => Ok(()),
            _ => Err("must be a string".to_string()),
        },
        FieldType::Int => match value {
            Value::Number(n) if n.is_i64() || n.as_f64().is_some_and(|f| f.fract() == 0.0) => Ok(()),
            Value::String(s) if s.trim().parse::<i64>().is_ok() => Ok(()),
            _ => Err("must be an integer".to_string()),
        },
        FieldType::Float => match value {
            Value::Number(_) => Ok(()),
            Value::String(s) if s.trim().parse::<f64>().is_ok() => Ok(()),
            _ => Err("must be a number".to_string()),
        },
        FieldType::Bool => parse_bool(value)
            .map(|_| ())
            .ok_or_else(|| "must be a boolean".to_string()),
        FieldType::Enum => match value.as_str() {
            Some(s) if field.options.iter().any(|o| o == s) => Ok(()),
            _ => Err(format!("must be one of: {}", field.options.join(", "))),
        },
        FieldType::Date => match value.as_str() {
            Some(s) if is_valid_date(s) => Ok(()),
            _ => Err("must be a date (YYYY-MM-DD)".to_string()),
        },
        FieldType::Timestamp => timestamp_ms(value)
            .map(|_| ())
            .ok_or_else(|| "must be a timestamp".to_string()),
        FieldType::Json => Ok(()),
        FieldType::Reference => match value {
            Value::String(s) if !s.trim().is_empty() => Ok(()),
            _ => Err("must be a record id".to_string()),
        },
        FieldType::Email => match value.as_str() {
            Some(s) if is_email(s) => Ok(()),
            _ => Err("must be an email address".to_string()),
        },
    }
}

fn is_email(s: &str) -> bool {
    let mut parts = s.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => !local.is_empty() && !domain.is_empty(),
        _ => false,
    }
}
