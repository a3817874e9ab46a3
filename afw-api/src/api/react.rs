//! Reaction toggle endpoint

use afw_common::events::{record_key, EventKind};
use afw_common::spec::Action;
use axum::{
    body::Bytes,
    extract::{Extension, Path, State},
    response::Response,
};
use serde_json::Value;

use super::context::{parse_object, RequestContext};
use super::entity::not_found;
use crate::auth::CurrentUser;
use crate::error::{success, ApiError};
use crate::permission::can_read;
use crate::reactions::{self, REACTIONS_FIELD};
use crate::validation::ValidationResult;
use crate::AppState;

/// POST /api/:entity/:id/react
///
/// Body: `{emoji}`. Only entities with a `reactions` field accept reactions.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    user: Option<Extension<CurrentUser>>,
    body: Bytes,
) -> Response {
    let mut ctx = RequestContext::new(&entity, Action::React);

    let result = async {
        let user = ctx.authenticate(user)?;
        let spec = state.engine.spec(&entity)?;
        if !spec.has_field(REACTIONS_FIELD) {
            return Err(ApiError::NotFound(format!(
                "{} does not support reactions",
                entity
            )));
        }
        ctx.authorize(&user, spec)?;

        let data = parse_object(&body)?;
        let emoji = data
            .get("emoji")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ApiError::field("emoji", "is required"))?
            .to_string();
        ctx.validated(ValidationResult::passed())?;

        match state.engine.get(&entity, &id).await? {
            Some(record) if can_read(&user, state.engine.registry(), &entity, &record) => {}
            _ => return Err(not_found(&entity, &id)),
        }

        let record = reactions::toggle(
            &state.engine,
            &entity,
            &id,
            &emoji,
            &user.id,
            state.config.reactions.max_retries,
        )
        .await?;
        ctx.executed();

        state.cache.invalidate(&record_key(&entity, &id));
        state.publish_mutation(EventKind::Reacted, &entity, &id, Some(record.clone()));
        Ok::<_, ApiError>(success(record))
    }
    .await;
    ctx.respond(result)
}
