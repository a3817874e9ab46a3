//! SQLite row → JSON record conversion

use afw_common::spec::{EntitySpec, FieldType};
use serde_json::{json, Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, ValueRef};

/// Convert a row to a JSON object, decoding each column by its spec type
pub fn row_to_record(row: &SqliteRow, spec: &EntitySpec) -> Value {
    let mut record = Map::new();

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let field_type = match name {
            "created_at" | "updated_at" => Some(FieldType::Timestamp),
            _ => spec.get_field(name).map(|f| f.field_type),
        };
        record.insert(name.to_string(), decode_column(row, i, field_type));
    }

    Value::Object(record)
}

fn decode_column(row: &SqliteRow, i: usize, field_type: Option<FieldType>) -> Value {
    let is_null = row
        .try_get_raw(i)
        .map(|raw| raw.is_null())
        .unwrap_or(true);
    if is_null {
        return Value::Null;
    }

    match field_type {
        Some(FieldType::Bool) => row
            .try_get::<i64, _>(i)
            .map(|v| Value::Bool(v != 0))
            .unwrap_or_else(|_| decode_loose(row, i)),
        Some(FieldType::Int) | Some(FieldType::Timestamp) => row
            .try_get::<i64, _>(i)
            .map(|v| json!(v))
            .unwrap_or_else(|_| decode_loose(row, i)),
        Some(FieldType::Float) => row
            .try_get::<f64, _>(i)
            .map(|v| json!(v))
            .unwrap_or_else(|_| decode_loose(row, i)),
        Some(FieldType::Json) => match row.try_get::<String, _>(i) {
            Ok(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            Err(_) => decode_loose(row, i),
        },
        _ => decode_loose(row, i),
    }
}

/// Whatever SQLite actually holds: text, then integer, then real
fn decode_loose(row: &SqliteRow, i: usize) -> Value {
    row.try_get::<String, _>(i)
        .ok()
        .map(Value::String)
        .or_else(|| row.try_get::<i64, _>(i).ok().map(|v| json!(v)))
        .or_else(|| row.try_get::<f64, _>(i).ok().map(|v| json!(v)))
        .unwrap_or(Value::Null)
}
