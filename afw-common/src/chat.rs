//! Chat message merging
//!
//! Chat threads are assembled from more than one source (the `messages`
//! table and the legacy `chat` column of the parent record). The merge is a
//! pure function over JSON message objects:
//!
//! 1. Inputs that are not arrays count as empty.
//! 2. Entries that are not objects, or lack a usable `id`, are dropped.
//! 3. The concatenation is stably sorted by `created_at` (missing → 0).
//! 4. Duplicates by `id` are removed, keeping the first in sorted order.

use serde_json::Value;
use std::collections::HashSet;

use crate::time::timestamp_ms;

/// Key added by [`tag_source`]
pub const SOURCE_KEY: &str = "source";

/// Merge two message collections into one chronological, id-unique list
///
/// # Examples
/// ```
/// use afw_common::chat::merge_messages;
/// use serde_json::json;
///
/// let a = json!([{"id": 1, "created_at": 5}]);
/// let b = json!([{"id": 1, "created_at": 9}, {"id": 2, "created_at": 1}]);
/// let merged = merge_messages(&a, &b);
/// assert_eq!(merged, vec![json!({"id": 2, "created_at": 1}), json!({"id": 1, "created_at": 5})]);
/// ```
pub fn merge_messages(a: &Value, b: &Value) -> Vec<Value> {
    let mut combined: Vec<&Value> = as_slice(a)
        .iter()
        .chain(as_slice(b).iter())
        .filter(|m| message_id(m).is_some())
        .collect();

    // sort_by_key is stable: ties keep concatenation order
    combined.sort_by_key(|m| created_at_ms(m));

    let mut seen = HashSet::new();
    combined
        .into_iter()
        .filter(|m| match message_id(m) {
            Some(id) => seen.insert(id),
            None => false,
        })
        .cloned()
        .collect()
}

/// Copy messages, annotating each object with its provenance
///
/// The input is left untouched; non-object entries are copied as-is.
pub fn tag_source(messages: &Value, label: &str) -> Value {
    let tagged = as_slice(messages)
        .iter()
        .map(|m| {
            let mut copy = m.clone();
            if let Value::Object(map) = &mut copy {
                map.insert(SOURCE_KEY.to_string(), Value::String(label.to_string()));
            }
            copy
        })
        .collect();
    Value::Array(tagged)
}

/// Normalized identity of a message, `None` when it cannot be deduplicated
pub fn message_id(message: &Value) -> Option<String> {
    match message.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `created_at` of a message in epoch ms; missing or unparseable → 0
pub fn created_at_ms(message: &Value) -> i64 {
    message.get("created_at").and_then(timestamp_ms).unwrap_or(0)
}

fn as_slice(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items.as_slice(),
        _ => &[],
    }
}
