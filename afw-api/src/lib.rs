//! afw-api library - audit firm workflow HTTP service
//!
//! Generic, spec-driven CRUD over the firm's entities plus chat threads,
//! reactions and a realtime event stream.

use afw_common::config::AppConfig;
use afw_common::events::{chat_key, collection_key, record_key, EntityEvent, EventKind};
use afw_common::spec::MESSAGE_ENTITY;
use afw_common::SpecRegistry;
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, info_span, warn, Span};

pub mod api;
pub mod auth;
pub mod broadcast;
pub mod cache;
pub mod error;
pub mod pagination;
pub mod permission;
pub mod query;
pub mod ratelimit;
pub mod reactions;
pub mod validation;

use broadcast::Broadcaster;
use cache::TtlCache;
use query::QueryEngine;
use ratelimit::UserRateLimiter;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub engine: QueryEngine,
    pub broadcaster: Broadcaster,
    /// Single-record reads keyed by record URL
    pub cache: Arc<TtlCache<String, Value>>,
    pub rate_limiter: Arc<UserRateLimiter>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: SqlitePool, registry: Arc<SpecRegistry>, config: AppConfig) -> Self {
        let engine = QueryEngine::new(db.clone(), registry, config.query);
        let cache = TtlCache::new(
            Duration::from_secs(config.cache.ttl_secs),
            config.cache.capacity,
        );
        let rate_limiter = UserRateLimiter::new(config.rate_limit.requests_per_minute);

        Self {
            db,
            engine,
            broadcaster: Broadcaster::new(),
            cache: Arc::new(cache),
            rate_limiter: Arc::new(rate_limiter),
            config: Arc::new(config),
        }
    }

    /// Notify subscribers of a committed mutation
    ///
    /// Fans out to the collection key and the record key. Message records
    /// also reach their chat thread.
    pub fn publish_mutation(&self, kind: EventKind, entity: &str, id: &str, data: Option<Value>) {
        let event = EntityEvent::new(kind, entity, id, data);

        self.broadcaster.publish(&collection_key(entity), &event);
        self.broadcaster.publish(&record_key(entity, id), &event);

        if entity == MESSAGE_ENTITY {
            let parent = event.data.as_ref().and_then(|record| {
                Some((
                    record.get("entity_type")?.as_str()?,
                    record.get("entity_id")?.as_str()?,
                ))
            });
            if let Some((entity_type, entity_id)) = parent {
                self.broadcaster.publish(&chat_key(entity_type, entity_id), &event);
            }
        }
    }

    /// Drop rate-limiter state for idle users and purge expired sessions
    pub async fn housekeeping(&self) {
        self.rate_limiter.retain_recent();
        match auth::purge_expired_sessions(&self.db).await {
            Ok(0) => {}
            Ok(purged) => debug!("Purged {} expired sessions", purged),
            Err(e) => warn!("Session purge failed: {}", e),
        }
    }

    /// Run [`AppState::housekeeping`] every `period` until aborted
    pub fn spawn_housekeeping(&self, period: Duration) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                state.housekeeping().await;
            }
        })
    }

    /// Release process-scoped state
    pub fn shutdown(&self) {
        self.broadcaster.clear();
        self.cache.clear();
        info!("Application state cleared");
    }
}

/// Build application router
///
/// `/health` is public; everything under `/api` passes through the session
/// middleware.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let protected = Router::new()
        .route("/api/events", get(api::event_stream))
        .route("/api/chat", get(api::get_chat).post(api::post_chat))
        .route(
            "/api/:entity",
            get(api::list_records).post(api::create_record),
        )
        .route(
            "/api/:entity/:id",
            get(api::get_record)
                .put(api::replace_record)
                .patch(api::patch_record)
                .delete(api::delete_record),
        )
        .route("/api/:entity/:id/react", post(api::toggle_reaction))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::session_middleware,
        ));

    let public = Router::new().merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

/// Per-request span carrying the path only
///
/// The query string may hold `access_token`, so it never reaches the logs.
fn request_span(request: &Request<Body>) -> Span {
    info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
    )
}
