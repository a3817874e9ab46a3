//! Chat thread endpoints
//!
//! A thread belongs to a parent record (engagement, review or RFI). Its
//! messages come from two places: rows in the `message` table and, for older
//! records, a `chat` JSON array stored on the parent itself. Reads merge both.

use afw_common::chat::{merge_messages, tag_source};
use afw_common::events::EventKind;
use afw_common::spec::{Action, Role};
use axum::{
    body::Bytes,
    extract::{Extension, Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::context::{parse_object, RequestContext};
use super::entity::{not_found, record_id};
use crate::auth::CurrentUser;
use crate::error::{success, success_with_meta, ApiError};
use crate::permission::{can_see, TEAM_ONLY_FIELD};
use crate::query::SortField;
use crate::validation::validate_entity;
use crate::AppState;

pub use afw_common::spec::MESSAGE_ENTITY;
/// Column on parent records holding pre-migration messages
pub const LEGACY_CHAT_FIELD: &str = "chat";

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub entity_type: String,
    pub entity_id: String,
}

/// GET /api/chat?entity_type=&entity_id=
pub async fn get_chat(
    State(state): State<AppState>,
    query: Option<Query<ChatQuery>>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let entity_type = query
        .as_ref()
        .map(|Query(q)| q.entity_type.clone())
        .unwrap_or_default();
    let mut ctx = RequestContext::new(&entity_type, Action::Chat);

    let result = async {
        let user = ctx.authenticate(user)?;
        let Query(ChatQuery {
            entity_type,
            entity_id,
        }) = query.ok_or_else(|| {
            ApiError::BadRequest("entity_type and entity_id are required".to_string())
        })?;

        let spec = state.engine.spec(&entity_type)?;
        ctx.authorize(&user, spec)?;

        let parent = state
            .engine
            .get(&entity_type, &entity_id)
            .await?
            .ok_or_else(|| not_found(&entity_type, &entity_id))?;

        let mut filters = BTreeMap::new();
        filters.insert("entity_type".to_string(), json!(entity_type));
        filters.insert("entity_id".to_string(), json!(entity_id));
        let rows = state
            .engine
            .find_all(MESSAGE_ENTITY, &filters, &[SortField::asc("created_at")])
            .await?;

        let legacy = if spec.has_field(LEGACY_CHAT_FIELD) {
            parent.get(LEGACY_CHAT_FIELD).cloned().unwrap_or(Value::Null)
        } else {
            Value::Null
        };

        let merged: Vec<Value> = merge_messages(
            &tag_source(&Value::Array(rows), "messages"),
            &tag_source(&legacy, "legacy"),
        )
        .into_iter()
        .filter(|m| can_see(&user, m))
        .collect();
        ctx.executed();

        let total = merged.len();
        Ok::<_, ApiError>(success_with_meta(Value::Array(merged), json!({ "total": total })))
    }
    .await;
    ctx.respond(result)
}

/// POST /api/chat
///
/// Body: `{entity_type, entity_id, content, is_team_only?}`
pub async fn post_chat(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    body: Bytes,
) -> Response {
    let mut ctx = RequestContext::new(MESSAGE_ENTITY, Action::Chat);

    let result = async {
        let user = ctx.authenticate(user)?;
        let data = parse_object(&body)?;

        let entity_type = data
            .get("entity_type")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::field("entity_type", "is required"))?
            .to_string();
        let entity_id = data
            .get("entity_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::field("entity_id", "is required"))?
            .to_string();

        let parent_spec = state.engine.spec(&entity_type)?;
        ctx.authorize(&user, parent_spec)?;

        let team_only = data.get(TEAM_ONLY_FIELD).and_then(Value::as_bool) == Some(true);
        if team_only && user.role == Role::Client {
            return Err(ApiError::Forbidden(
                "Clients cannot post team-only messages".to_string(),
            ));
        }

        let message_spec = state.engine.spec(MESSAGE_ENTITY)?;
        ctx.validated(validate_entity(message_spec, &data))?;

        if state.engine.get(&entity_type, &entity_id).await?.is_none() {
            return Err(not_found(&entity_type, &entity_id));
        }

        let record = state
            .engine
            .create(MESSAGE_ENTITY, &data, Some(&user.id))
            .await?;
        ctx.executed();

        state.publish_mutation(
            EventKind::Message,
            MESSAGE_ENTITY,
            &record_id(&record),
            Some(record.clone()),
        );
        Ok::<_, ApiError>((StatusCode::CREATED, success(record)))
    }
    .await;
    ctx.respond(result)
}
