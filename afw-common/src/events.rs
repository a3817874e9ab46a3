//! Realtime event payloads
//!
//! Published through the in-process broadcaster after a successful mutation
//! and forwarded verbatim to SSE subscribers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time::now_ms;

/// What happened to the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    Reacted,
    Message,
}

/// Mutation notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEvent {
    pub kind: EventKind,
    pub entity: String,
    pub id: String,
    /// Record after the mutation (absent for deletes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Epoch milliseconds
    pub at: i64,
}

impl EntityEvent {
    pub fn new(kind: EventKind, entity: impl Into<String>, id: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            kind,
            entity: entity.into(),
            id: id.into(),
            data,
            at: now_ms(),
        }
    }
}

/// Broadcast key for an entity collection
pub fn collection_key(entity: &str) -> String {
    format!("/api/{}", entity)
}

/// Broadcast key for a single record
pub fn record_key(entity: &str, id: &str) -> String {
    format!("/api/{}/{}", entity, id)
}

/// Broadcast key for a chat thread
pub fn chat_key(entity_type: &str, entity_id: &str) -> String {
    format!("/api/chat/{}/{}", entity_type, entity_id)
}
