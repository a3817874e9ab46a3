//! SQL fragment building
//!
//! Two rules hold for every statement assembled here:
//! - values only ever reach SQLite as bound parameters
//! - identifiers (columns, sort fields) are spliced only after an allow-list
//!   check against the entity spec

use afw_common::spec::{EntitySpec, FieldType, STATUS_DELETED};
use afw_common::time::timestamp_ms;
use afw_common::{Error, Result};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeMap;

/// A value ready to bind
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    pub fn push_bind(self, qb: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            SqlValue::Null => {
                qb.push_bind(None::<String>);
            }
            SqlValue::Int(v) => {
                qb.push_bind(v);
            }
            SqlValue::Float(v) => {
                qb.push_bind(v);
            }
            SqlValue::Text(v) => {
                qb.push_bind(v);
            }
        }
    }
}

/// Convert a JSON value into its stored form for a column of `field_type`
///
/// `None` field type means a system column (stored as given).
pub fn to_sql_value(column: &str, field_type: Option<FieldType>, value: &Value) -> Result<SqlValue> {
    let invalid = |expected: &str| {
        Error::InvalidInput(format!("Value for '{}' must be {}", column, expected))
    };

    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    match field_type {
        Some(FieldType::Json) => Ok(SqlValue::Text(value.to_string())),
        Some(FieldType::Int) => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .map(SqlValue::Int)
                .ok_or_else(|| invalid("an integer")),
            Value::String(s) => s.trim().parse().map(SqlValue::Int).map_err(|_| invalid("an integer")),
            _ => Err(invalid("an integer")),
        },
        Some(FieldType::Float) => match value {
            Value::Number(n) => n.as_f64().map(SqlValue::Float).ok_or_else(|| invalid("a number")),
            Value::String(s) => s.trim().parse().map(SqlValue::Float).map_err(|_| invalid("a number")),
            _ => Err(invalid("a number")),
        },
        Some(FieldType::Bool) => parse_bool(value)
            .map(|b| SqlValue::Int(b as i64))
            .ok_or_else(|| invalid("a boolean")),
        Some(FieldType::Timestamp) => timestamp_ms(value)
            .map(SqlValue::Int)
            .ok_or_else(|| invalid("a timestamp")),
        _ => Ok(match value {
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Bool(b) => SqlValue::Int(*b as i64),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Int(i),
                None => SqlValue::Float(n.as_f64().unwrap_or_default()),
            },
            other => SqlValue::Text(other.to_string()),
        }),
    }
}

/// Booleans arrive as JSON bools, 0/1, or "true"/"false" in query strings
pub fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Column-allowlisted conversion for a key of `spec`
pub fn column_value(spec: &EntitySpec, column: &str, value: &Value) -> Result<SqlValue> {
    if !spec.is_column(column) {
        return Err(Error::InvalidInput(format!(
            "Unknown field '{}' for {}",
            column, spec.name
        )));
    }
    let field_type = spec.get_field(column).map(|f| f.field_type);
    let field_type = match (field_type, column) {
        (None, "created_at" | "updated_at") => Some(FieldType::Timestamp),
        (ft, _) => ft,
    };
    to_sql_value(column, field_type, value)
}

/// Append ` WHERE ...` for equality filters plus the implicit soft-delete guard
pub fn push_where(
    qb: &mut QueryBuilder<'_, Sqlite>,
    spec: &EntitySpec,
    filters: &BTreeMap<String, Value>,
) -> Result<()> {
    qb.push(" WHERE 1 = 1");

    for (column, value) in filters {
        match column_value(spec, column, value)? {
            SqlValue::Null => {
                qb.push(" AND ").push(column.as_str()).push(" IS NULL");
            }
            bound => {
                qb.push(" AND ").push(column.as_str()).push(" = ");
                bound.push_bind(qb);
            }
        }
    }

    if spec.has_status() && !filters.contains_key("status") {
        qb.push(" AND (status IS NULL OR status != ");
        qb.push_bind(STATUS_DELETED);
        qb.push(")");
    }

    Ok(())
}

/// Sort direction for one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    pub field: String,
    pub descending: bool,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Parse `field`, `field:desc`, `-field`, or a comma-separated list thereof
pub fn parse_sort(raw: &str) -> Result<Vec<SortField>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            if let Some(field) = part.strip_prefix('-') {
                return Ok(SortField::desc(field));
            }
            match part.split_once(':') {
                None => Ok(SortField::asc(part)),
                Some((field, dir)) => match dir.to_ascii_lowercase().as_str() {
                    "asc" => Ok(SortField::asc(field)),
                    "desc" => Ok(SortField::desc(field)),
                    _ => Err(Error::InvalidInput(format!("Invalid sort direction: {}", dir))),
                },
            }
        })
        .collect()
}

/// Append ` ORDER BY ...`, checking every field against the entity spec
///
/// Empty `sort` falls back to newest first. `id` is always the final
/// tie-breaker so pagination is deterministic.
pub fn push_order_by(
    qb: &mut QueryBuilder<'_, Sqlite>,
    spec: &EntitySpec,
    sort: &[SortField],
) -> Result<()> {
    let default_sort = [SortField::desc("created_at")];
    let sort = if sort.is_empty() { &default_sort[..] } else { sort };

    qb.push(" ORDER BY ");
    for (i, s) in sort.iter().enumerate() {
        if !spec.is_column(&s.field) {
            return Err(Error::InvalidInput(format!("Invalid sort field: {}", s.field)));
        }
        if i > 0 {
            qb.push(", ");
        }
        qb.push(s.field.as_str())
            .push(if s.descending { " DESC" } else { " ASC" });
    }
    if !sort.iter().any(|s| s.field == "id") {
        qb.push(", id ASC");
    }
    Ok(())
}
