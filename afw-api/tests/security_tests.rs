//! Security tests for afw-api
//!
//! Tests cover:
//! - SQL injection through sort, filter keys, filter values and entity names
//! - Sanitized 5xx responses
//! - Session handling: query-string tokens, expiry, deleted users

mod helpers;

use afw_api::auth::issue_session;
use afw_api::error::SANITIZED_MESSAGE;
use afw_common::spec::Role;
use axum::http::StatusCode;
use helpers::{request, TestApp};
use serde_json::json;

async fn seeded() -> TestApp {
    let app = TestApp::new().await;
    app.create("client", json!({"name": "Acme"})).await;
    app.create("client", json!({"name": "Globex"})).await;
    app
}

async fn client_count(app: &TestApp) -> i64 {
    let (status, body) = app.get(Role::Partner, "/api/client").await;
    assert_eq!(status, StatusCode::OK, "clients table should survive: {}", body);
    body["meta"]["total"].as_i64().unwrap()
}

// =============================================================================
// Injection
// =============================================================================

#[tokio::test]
async fn test_sort_injection_rejected() {
    let app = seeded().await;
    let attempts = [
        "/api/client?sort=name%3BDROP%20TABLE%20clients",
        "/api/client?sort=(SELECT%201)",
        "/api/client?sort=name%20--",
        "/api/client?sort=name:sideways",
    ];

    for uri in attempts {
        let (status, body) = app.get(Role::Partner, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} -> {}", uri, body);
    }
    assert_eq!(client_count(&app).await, 2);
}

#[tokio::test]
async fn test_filter_key_injection_rejected() {
    let app = seeded().await;
    let (status, body) = app
        .get(Role::Partner, "/api/client?name%20OR%201%3D1--=x")
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_filter_value_is_bound_not_spliced() {
    let app = seeded().await;
    let (status, body) = app
        .get(Role::Partner, "/api/client?name=%27%20OR%20%271%27%3D%271")
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 0);

    let (_, body) = app
        .get(Role::Partner, "/api/client?name=Acme%27%3B%20DROP%20TABLE%20clients%3B--")
        .await;
    assert_eq!(body["meta"]["total"], 0);
    assert_eq!(client_count(&app).await, 2);
}

#[tokio::test]
async fn test_body_values_are_stored_verbatim() {
    let app = seeded().await;
    let hostile = "Robert'); DROP TABLE clients;--";
    let record = app.create("client", json!({"name": hostile})).await;

    let (_, body) = app
        .get(
            Role::Partner,
            &format!("/api/client/{}", record["id"].as_str().unwrap()),
        )
        .await;
    assert_eq!(body["data"]["name"], hostile);
    assert_eq!(client_count(&app).await, 3);
}

#[tokio::test]
async fn test_entity_name_is_not_a_table_name() {
    let app = seeded().await;
    for uri in [
        "/api/clients",
        "/api/client%3BDROP%20TABLE%20clients",
        "/api/sessions",
        "/api/sqlite_master",
    ] {
        let (status, _) = app.get(Role::Partner, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
    }
    assert_eq!(client_count(&app).await, 2);
}

#[tokio::test]
async fn test_system_columns_cannot_be_forged() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post(
            Role::Partner,
            "/api/client",
            json!({"name": "Acme", "id": "chosen", "created_by": "someone-else"}),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    let record = &body["data"];
    assert_ne!(record["id"], "chosen");
    assert_eq!(record["created_by"], app.user_ids[&Role::Partner].as_str());
}

// =============================================================================
// Error sanitization
// =============================================================================

#[tokio::test]
async fn test_database_failure_is_sanitized() {
    let app = seeded().await;
    sqlx::query("DROP TABLE clients")
        .execute(&app.state.db)
        .await
        .unwrap();

    let (status, body) = app.get(Role::Partner, "/api/client").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["message"], SANITIZED_MESSAGE);

    let text = body.to_string();
    assert!(!text.contains("no such table"));
    assert!(!text.contains("clients"));
    assert!(!text.contains("SELECT"));
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_access_token_query_param() {
    let app = seeded().await;
    let uri = format!("/api/client?access_token={}", app.token(Role::Partner));

    let (status, body) = app.send(request("GET", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    // The token is not treated as a filter
    assert_eq!(body["meta"]["total"], 2);

    let (status, _) = app
        .send(request("GET", "/api/client?access_token=bogus", None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_session_rejected() {
    let app = TestApp::new().await;
    let token = issue_session(&app.state.db, &app.user_ids[&Role::Partner], 0)
        .await
        .unwrap();

    let (status, _) = app
        .send(request("GET", "/api/client", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deleted_user_loses_access() {
    let app = TestApp::new().await;
    let clerk_id = app.user_ids[&Role::Clerk].clone();

    assert_eq!(app.get(Role::Clerk, "/api/engagement").await.0, StatusCode::OK);

    let (status, _) = app
        .delete(Role::Partner, &format!("/api/user/{}", clerk_id))
        .await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        app.get(Role::Clerk, "/api/engagement").await.0,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_team_only_record_is_invisible_to_clients() {
    let app = TestApp::new().await;
    let engagement = app
        .create("engagement", json!({"name": "E", "client_id": "c1", "year": 2024}))
        .await;
    let (_, body) = app
        .post(
            Role::Manager,
            "/api/chat",
            json!({
                "entity_type": "engagement",
                "entity_id": engagement["id"],
                "content": "internal",
                "is_team_only": true
            }),
        )
        .await;
    let uri = format!("/api/message/{}", body["data"]["id"].as_str().unwrap());

    assert_eq!(app.get(Role::Manager, &uri).await.0, StatusCode::OK);
    // Absent rather than forbidden, so existence does not leak
    assert_eq!(app.get(Role::Client, &uri).await.0, StatusCode::NOT_FOUND);
    assert_eq!(
        app.post(Role::Client, &format!("{}/react", uri), json!({"emoji": "👀"}))
            .await
            .0,
        StatusCode::NOT_FOUND
    );
}
