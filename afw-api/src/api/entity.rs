//! Universal entity handlers
//!
//! One set of handlers serves every entity in the registry. The entity name
//! comes from the path and selects the entity spec that drives permission checks,
//! validation and the generated SQL.

use afw_common::events::{record_key, EventKind};
use afw_common::spec::Action;
use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::Response,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

use super::context::{parse_object, RequestContext};
use crate::auth::CurrentUser;
use crate::error::{success, success_with_meta, ApiError, ApiResult};
use crate::permission::can_read;
use crate::query::{parse_sort, ListOptions};
use crate::validation::{validate_entity, validate_update, ValidationResult};
use crate::AppState;

/// Query parameters with fixed meaning; every other parameter is a filter
const RESERVED_PARAMS: [&str; 4] = ["limit", "offset", "sort", "access_token"];

type MaybeUser = Option<Extension<CurrentUser>>;

/// GET /api/:entity
pub async fn list_records(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    user: MaybeUser,
) -> Response {
    let mut ctx = RequestContext::new(&entity, Action::List);
    let result = async {
        let user = ctx.authenticate(user)?;
        let spec = state.engine.spec(&entity)?;
        ctx.authorize(&user, spec)?;

        let options = list_options(&params)?;
        ctx.validated(ValidationResult::passed())?;

        let page = state.engine.list(&entity, &options).await?;
        ctx.executed();

        let registry = state.engine.registry();
        let data: Vec<Value> = page
            .data
            .into_iter()
            .filter(|r| can_read(&user, registry, &entity, r))
            .collect();
        Ok::<_, ApiError>(success_with_meta(
            Value::Array(data),
            json!({"total": page.total, "limit": page.limit, "offset": page.offset}),
        ))
    }
    .await;
    ctx.respond(result)
}

fn list_options(params: &HashMap<String, String>) -> ApiResult<ListOptions> {
    let parse_int = |name: &str| -> ApiResult<Option<i64>> {
        params
            .get(name)
            .map(|raw| {
                raw.trim()
                    .parse::<i64>()
                    .map_err(|_| ApiError::BadRequest(format!("Invalid {}: {}", name, raw)))
            })
            .transpose()
    };

    let filters: BTreeMap<String, Value> = params
        .iter()
        .filter(|(key, _)| !RESERVED_PARAMS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();

    Ok(ListOptions {
        filters,
        sort: params.get("sort").map(|s| parse_sort(s)).transpose()?.unwrap_or_default(),
        limit: parse_int("limit")?,
        offset: parse_int("offset")?,
    })
}

/// GET /api/:entity/:id
pub async fn get_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    user: MaybeUser,
) -> Response {
    let mut ctx = RequestContext::new(&entity, Action::View);
    let result = async {
        let user = ctx.authenticate(user)?;
        let spec = state.engine.spec(&entity)?;
        ctx.authorize(&user, spec)?;

        let key = record_key(&entity, &id);
        let record = match state.cache.get(&key) {
            Some(record) => record,
            None => {
                let generation = state.cache.generation();
                let record = state
                    .engine
                    .get(&entity, &id)
                    .await?
                    .ok_or_else(|| not_found(&entity, &id))?;
                state.cache.insert_if_unchanged(key, record.clone(), generation);
                record
            }
        };
        ctx.executed();

        if !can_read(&user, state.engine.registry(), &entity, &record) {
            return Err(not_found(&entity, &id));
        }
        Ok::<_, ApiError>(success(record))
    }
    .await;
    ctx.respond(result)
}

/// POST /api/:entity
pub async fn create_record(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    user: MaybeUser,
    body: Bytes,
) -> Response {
    let mut ctx = RequestContext::new(&entity, Action::Create);
    let result = async {
        let user = ctx.authenticate(user)?;
        let spec = state.engine.spec(&entity)?;
        ctx.authorize(&user, spec)?;

        let data = parse_object(&body)?;
        ctx.validated(validate_entity(spec, &data))?;

        let record = state.engine.create(&entity, &data, Some(&user.id)).await?;
        ctx.executed();

        let id = record_id(&record);
        state.publish_mutation(EventKind::Created, &entity, &id, Some(record.clone()));
        Ok::<_, ApiError>((StatusCode::CREATED, success(record)))
    }
    .await;
    ctx.respond(result)
}

/// PUT /api/:entity/:id (full record)
pub async fn replace_record(
    state: State<AppState>,
    path: Path<(String, String)>,
    user: MaybeUser,
    body: Bytes,
) -> Response {
    update_record(state, path, user, body, false).await
}

/// PATCH /api/:entity/:id (partial record)
pub async fn patch_record(
    state: State<AppState>,
    path: Path<(String, String)>,
    user: MaybeUser,
    body: Bytes,
) -> Response {
    update_record(state, path, user, body, true).await
}

async fn update_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    user: MaybeUser,
    body: Bytes,
    partial: bool,
) -> Response {
    let mut ctx = RequestContext::new(&entity, Action::Update);
    let result = async {
        let user = ctx.authenticate(user)?;
        let spec = state.engine.spec(&entity)?;
        ctx.authorize(&user, spec)?;

        let data = parse_object(&body)?;
        let validation = if partial {
            validate_update(spec, &data)
        } else {
            validate_entity(spec, &data)
        };
        ctx.validated(validation)?;

        if user_cannot_see_stored(&state, &user, &entity, &id).await? {
            return Err(not_found(&entity, &id));
        }

        let record = state.engine.update(&entity, &id, &data).await?;
        ctx.executed();

        state.cache.invalidate(&record_key(&entity, &id));
        state.publish_mutation(EventKind::Updated, &entity, &id, Some(record.clone()));
        Ok::<_, ApiError>(success(record))
    }
    .await;
    ctx.respond(result)
}

/// DELETE /api/:entity/:id
pub async fn delete_record(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    user: MaybeUser,
) -> Response {
    let mut ctx = RequestContext::new(&entity, Action::Delete);
    let result = async {
        let user = ctx.authenticate(user)?;
        let spec = state.engine.spec(&entity)?;
        ctx.authorize(&user, spec)?;
        ctx.validated(ValidationResult::passed())?;

        if user_cannot_see_stored(&state, &user, &entity, &id).await? {
            return Err(not_found(&entity, &id));
        }

        state.engine.remove(&entity, &id).await?;
        ctx.executed();

        state.cache.invalidate(&record_key(&entity, &id));
        state.publish_mutation(EventKind::Deleted, &entity, &id, None);
        Ok::<_, ApiError>(success(json!({ "id": id })))
    }
    .await;
    ctx.respond(result)
}

/// Records a user may not read are invisible to them, not forbidden
async fn user_cannot_see_stored(
    state: &AppState,
    user: &CurrentUser,
    entity: &str,
    id: &str,
) -> ApiResult<bool> {
    Ok(match state.engine.get(entity, id).await? {
        Some(record) => !can_read(user, state.engine.registry(), entity, &record),
        None => false,
    })
}

pub(crate) fn record_id(record: &Value) -> String {
    record
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn not_found(entity: &str, id: &str) -> ApiError {
    ApiError::NotFound(format!("{} {} not found", entity, id))
}
