//! Session tokens
//!
//! Tokens are 32 random bytes, hex encoded, handed to the client once. Only
//! their SHA-256 digest is stored, so a leaked `sessions` table cannot be
//! replayed.

use afw_common::spec::Role;
use afw_common::time::now_ms;
use afw_common::uuid_utils::new_record_id;
use afw_common::{Error, Result};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tracing::info;

/// Authenticated caller, resolved from a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// Hex SHA-256 of a token
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Fresh random token
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Create a session for `user_id`, returning the plaintext token
pub async fn issue_session(pool: &SqlitePool, user_id: &str, ttl_hours: i64) -> Result<String> {
    let token = generate_token();
    let now = now_ms();
    let expires_at = now + ttl_hours.max(0) * 3_600_000;

    sqlx::query(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(hash_token(&token))
    .bind(user_id)
    .bind(now)
    .bind(expires_at)
    .execute(pool)
    .await
    .map_err(|e| Error::database("issue_session", "session", e))?;

    Ok(token)
}

/// Look up the live user behind a token
///
/// `None` for unknown or expired tokens, users that were soft-deleted, and
/// users whose stored role is not recognized.
pub async fn resolve_session(pool: &SqlitePool, token: &str) -> Result<Option<CurrentUser>> {
    let row = sqlx::query(
        r#"
        SELECT u.id, u.email, u.name, u.role
        FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token_hash = ?
          AND s.expires_at > ?
          AND (u.status IS NULL OR u.status != 'deleted')
        "#,
    )
    .bind(hash_token(token))
    .bind(now_ms())
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::database("resolve_session", "session", e))?;

    let Some(row) = row else {
        return Ok(None);
    };

    let role: String = row.try_get("role").unwrap_or_default();
    let Ok(role) = role.parse::<Role>() else {
        return Ok(None);
    };

    Ok(Some(CurrentUser {
        id: row.try_get("id").unwrap_or_default(),
        email: row.try_get("email").unwrap_or_default(),
        name: row.try_get::<Option<String>, _>("name").ok().flatten().unwrap_or_default(),
        role,
    }))
}

/// Find a live user by email, creating one with `role` if absent
///
/// Returns the user id.
pub async fn ensure_user(pool: &SqlitePool, email: &str, name: &str, role: Role) -> Result<String> {
    let existing: Option<String> = sqlx::query_scalar(
        "SELECT id FROM users WHERE email = ? AND (status IS NULL OR status != 'deleted')",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .map_err(|e| Error::database("ensure_user", "user", e))?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let id = new_record_id();
    let now = now_ms();
    sqlx::query(
        r#"
        INSERT INTO users (id, created_at, updated_at, name, email, role, status)
        VALUES (?, ?, ?, ?, ?, ?, 'active')
        "#,
    )
    .bind(&id)
    .bind(now)
    .bind(now)
    .bind(name)
    .bind(email)
    .bind(role.as_str())
    .execute(pool)
    .await
    .map_err(|e| Error::database("ensure_user", "user", e))?;

    info!("Created {} user {}", role, email);
    Ok(id)
}

/// Drop expired sessions; returns how many were removed
pub async fn purge_expired_sessions(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(now_ms())
        .execute(pool)
        .await
        .map_err(|e| Error::database("purge_sessions", "session", e))?;
    Ok(result.rows_affected())
}
