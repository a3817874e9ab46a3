//! Server-Sent Events bridge to the realtime broadcaster
//!
//! `GET /api/events?key=/api/rfi/123` subscribes to one broadcast key and
//! forwards each event as an SSE `data:` JSON frame. The subscription lives
//! exactly as long as the HTTP stream; a disconnecting client drops it.
//!
//! Events are filtered per subscriber: a record the user could not read
//! through the REST routes is never forwarded.

use afw_common::events::EntityEvent;
use afw_common::spec::{Action, MESSAGE_ENTITY};
use afw_common::SpecRegistry;
use axum::{
    extract::{Extension, Query, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::context::RequestContext;
use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::permission;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub key: String,
}

/// GET /api/events?key=
pub async fn event_stream(
    State(state): State<AppState>,
    query: Option<Query<EventsQuery>>,
    user: Option<Extension<CurrentUser>>,
) -> Response {
    let mut ctx = RequestContext::new("events", Action::View);

    let result = (|| {
        let user = ctx.authenticate(user)?;
        let Query(EventsQuery { key }) =
            query.ok_or_else(|| ApiError::BadRequest("key is required".to_string()))?;

        let (entity, action) = key_target(&key)?;
        let spec = state.engine.spec(entity)?;
        permission::check(&user, spec, action)?;
        ctx.executed();

        Ok::<_, ApiError>(subscribe_stream(&state, key, user))
    })();
    ctx.respond(result)
}

/// Entity and action a subscriber needs for a broadcast key
///
/// `/api/{entity}` needs `list`, `/api/{entity}/{id}` needs `view` and
/// `/api/chat/{entity_type}/{id}` needs `chat` on the parent.
fn key_target(key: &str) -> ApiResult<(&str, Action)> {
    let invalid = || ApiError::BadRequest(format!("Invalid event key: {}", key));
    let rest = key.strip_prefix("/api/").ok_or_else(invalid)?;
    let segments: Vec<&str> = rest.split('/').collect();

    match segments.as_slice() {
        ["chat", entity_type, id] if !entity_type.is_empty() && !id.is_empty() => {
            Ok((*entity_type, Action::Chat))
        }
        [entity] if !entity.is_empty() && *entity != "chat" => Ok((*entity, Action::List)),
        [entity, id] if !entity.is_empty() && !id.is_empty() && *entity != "chat" => {
            Ok((*entity, Action::View))
        }
        _ => Err(invalid()),
    }
}

fn subscribe_stream(state: &AppState, key: String, user: CurrentUser) -> Response {
    let (tx, mut rx) = mpsc::unbounded_channel::<EntityEvent>();
    let registry = state.engine.registry().clone();

    let subscription = state.broadcaster.subscribe(key.clone(), move |event| {
        if !forwardable(&user, &registry, event) {
            return Ok(());
        }
        tx.send(event.clone())
            .map_err(|_| anyhow::anyhow!("SSE client gone"))
    });
    info!("SSE client subscribed to {}", key);

    let stream = async_stream::stream! {
        // Held for the life of the stream; dropping it unsubscribes
        let _subscription = subscription;

        while let Some(event) = rx.recv().await {
            match Event::default().event(kind_name(&event)).json_data(&event) {
                Ok(frame) => yield Ok::<_, std::convert::Infallible>(frame),
                Err(e) => warn!("Failed to encode event for {}: {}", key, e),
            }
        }
        debug!("SSE stream for {} ended", key);
    };

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
        .into_response()
}

/// Whether `user` may receive `event`
///
/// Events carrying a record follow [`permission::can_read`]. Message events
/// without a record (deletes) go only to users who may list messages.
fn forwardable(user: &CurrentUser, registry: &SpecRegistry, event: &EntityEvent) -> bool {
    match &event.data {
        Some(record) => permission::can_read(user, registry, &event.entity, record),
        None if event.entity == MESSAGE_ENTITY => registry
            .get(MESSAGE_ENTITY)
            .is_some_and(|spec| permission::can(user, spec, Action::List)),
        None => true,
    }
}

fn kind_name(event: &EntityEvent) -> String {
    serde_json::to_value(event.kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "event".to_string())
}
