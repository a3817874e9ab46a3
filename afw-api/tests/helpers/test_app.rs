//! In-process application fixture

use afw_api::auth::{ensure_user, issue_session};
use afw_api::{build_router, AppState};
use afw_common::config::AppConfig;
use afw_common::db::init_memory_database;
use afw_common::spec::Role;
use afw_common::SpecRegistry;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot` method

pub struct TestApp {
    pub state: AppState,
    /// Session token per role
    pub tokens: HashMap<Role, String>,
    /// User id per role
    pub user_ids: HashMap<Role, String>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let registry = SpecRegistry::builtin().expect("builtin specs");
        let pool = init_memory_database(&registry)
            .await
            .expect("Should create in-memory database");

        let mut tokens = HashMap::new();
        let mut user_ids = HashMap::new();
        for role in Role::ALL {
            let email = format!("{}@firm.test", role);
            let id = ensure_user(&pool, &email, role.as_str(), role)
                .await
                .expect("Should create user");
            let token = issue_session(&pool, &id, 1)
                .await
                .expect("Should issue session");
            tokens.insert(role, token);
            user_ids.insert(role, id);
        }

        let state = AppState::new(pool, Arc::new(registry), config);
        Self {
            state,
            tokens,
            user_ids,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn token(&self, role: Role) -> &str {
        &self.tokens[&role]
    }

    /// Send one request, returning status and parsed JSON body
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        (status, extract_json(response.into_body()).await)
    }

    pub async fn get(&self, role: Role, uri: &str) -> (StatusCode, Value) {
        self.send(request("GET", uri, Some(self.token(role)))).await
    }

    pub async fn post(&self, role: Role, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(json_request("POST", uri, Some(self.token(role)), &body.to_string()))
            .await
    }

    pub async fn patch(&self, role: Role, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(json_request("PATCH", uri, Some(self.token(role)), &body.to_string()))
            .await
    }

    pub async fn put(&self, role: Role, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(json_request("PUT", uri, Some(self.token(role)), &body.to_string()))
            .await
    }

    pub async fn delete(&self, role: Role, uri: &str) -> (StatusCode, Value) {
        self.send(request("DELETE", uri, Some(self.token(role)))).await
    }

    /// Create a record as a partner and return it
    pub async fn create(&self, entity: &str, body: Value) -> Value {
        let (status, body) = self.post(Role::Partner, &format!("/api/{}", entity), body).await;
        assert_eq!(status, StatusCode::CREATED, "create {} failed: {}", entity, body);
        body["data"].clone()
    }
}

/// Request without a body
pub fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// Request with a raw JSON body (may be deliberately malformed)
pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Extract JSON body from response
pub async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}
