//! Error types for afw-api
//!
//! Lower layers return typed errors; the request handlers are the only place
//! that turns them into HTTP responses. Every error body has the envelope
//! `{"success": false, "error": {"code", "message", "details"?}}`.
//! Server-side failures never echo internal text to the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name → message
pub type FieldErrors = BTreeMap<String, String>;

/// Message returned for every 5xx response
pub const SANITIZED_MESSAGE: &str = "An internal error occurred";

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Record failed spec validation (400)
    #[error("Validation failed: {0:?}")]
    Validation(FieldErrors),

    /// Invalid request shape or parameter (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No valid session (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Role lacks permission (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Concurrent modification (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Per-user rate limit exceeded (429)
    #[error("Too many requests")]
    TooManyRequests,

    /// Storage failure (500)
    #[error("Database error during {operation} on {entity}: {detail}")]
    Database {
        operation: &'static str,
        entity: String,
        detail: String,
    },

    /// Anything else (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Database { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::TooManyRequests => "RATE_LIMITED",
            ApiError::Database { .. } => "DATABASE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Text safe to show the client
    pub fn client_message(&self) -> String {
        match self {
            ApiError::Validation(_) => "Validation failed".to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Unauthorized => "Authentication required".to_string(),
            ApiError::Forbidden(msg) => msg.clone(),
            ApiError::NotFound(msg) => msg.clone(),
            ApiError::Conflict(msg) => msg.clone(),
            ApiError::TooManyRequests => "Too many requests".to_string(),
            ApiError::Database { .. } | ApiError::Internal(_) => SANITIZED_MESSAGE.to_string(),
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    /// Single-field validation failure
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.into());
        ApiError::Validation(errors)
    }
}

impl From<afw_common::Error> for ApiError {
    fn from(err: afw_common::Error) -> Self {
        use afw_common::Error as E;
        match err {
            E::Database {
                operation,
                entity,
                source,
            } => ApiError::Database {
                operation,
                entity,
                detail: source.to_string(),
            },
            E::NotFound(msg) => ApiError::NotFound(msg),
            E::InvalidInput(msg) => ApiError::BadRequest(msg),
            E::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code(),
            "message": self.client_message(),
        });
        if let ApiError::Validation(fields) = &self {
            error["details"] = json!(fields);
        }

        let body = Json(json!({
            "success": false,
            "error": error,
        }));

        (self.status(), body).into_response()
    }
}

/// Success envelope
pub fn success(data: Value) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": data,
    }))
}

/// Success envelope with metadata
pub fn success_with_meta(data: Value, meta: Value) -> Json<Value> {
    Json(json!({
        "success": true,
        "data": data,
        "meta": meta,
    }))
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
