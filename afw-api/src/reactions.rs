//! Emoji reaction toggling
//!
//! Reactions live in a JSON column as `{emoji: [user_id, ...]}`. A toggle is
//! a read-modify-write of that blob, committed with compare-and-swap so two
//! concurrent toggles cannot silently overwrite each other.

use afw_common::{Error, Result};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::query::QueryEngine;

/// Column holding the reaction map
pub const REACTIONS_FIELD: &str = "reactions";

/// Add `user_id` under `emoji`, or remove it if already present
///
/// Non-object input is treated as no reactions. Emojis left with no users
/// are removed from the map.
pub fn toggle_reaction(reactions: &Value, emoji: &str, user_id: &str) -> Value {
    let mut map = match reactions {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    let mut users: Vec<Value> = match map.remove(emoji) {
        Some(Value::Array(users)) => users,
        _ => Vec::new(),
    };

    let before = users.len();
    users.retain(|u| u.as_str() != Some(user_id));
    if users.len() == before {
        users.push(Value::String(user_id.to_string()));
    }

    if !users.is_empty() {
        map.insert(emoji.to_string(), Value::Array(users));
    }

    Value::Object(map)
}

/// Toggle a reaction on a stored record, retrying on concurrent writes
///
/// Returns the updated record. `NotFound` if the record is gone, `Conflict`
/// once `max_retries` compare-and-swap attempts have all lost.
pub async fn toggle(
    engine: &QueryEngine,
    entity: &str,
    id: &str,
    emoji: &str,
    user_id: &str,
    max_retries: u32,
) -> Result<Value> {
    let attempts = max_retries.max(1);

    for attempt in 1..=attempts {
        let stored = engine
            .read_text(entity, id, REACTIONS_FIELD)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {} not found", entity, id)))?;

        let current = stored
            .as_deref()
            .and_then(|text| serde_json::from_str(text).ok())
            .unwrap_or(Value::Null);
        let updated = toggle_reaction(&current, emoji, user_id).to_string();

        if engine
            .compare_and_swap_text(entity, id, REACTIONS_FIELD, stored.as_deref(), &updated)
            .await?
        {
            debug!("Toggled {} on {} {} (attempt {})", emoji, entity, id, attempt);
            return engine
                .get(entity, id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("{} {} not found", entity, id)));
        }

        debug!("Reaction write on {} {} lost a race (attempt {})", entity, id, attempt);
    }

    warn!(
        "Reaction toggle on {} {} gave up after {} attempts",
        entity, id, attempts
    );
    Err(Error::Conflict(format!(
        "Reactions on {} {} are being modified concurrently",
        entity, id
    )))
}
