//! Per-request pipeline state
//!
//! Every API request walks `Received → Authenticated → Authorized →
//! Validated → Executed → Responded`. Any stage may fail; the failure is
//! logged here with the request's context and serialized as the error
//! envelope. No other layer writes error responses.

use afw_common::spec::{Action, EntitySpec};
use axum::{
    body::Bytes,
    extract::Extension,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::permission;
use crate::validation::ValidationResult;

/// Message for any body that is not a JSON object
pub const MALFORMED_BODY: &str = "Malformed JSON body";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Authenticated,
    Authorized,
    Validated,
    Executed,
    Responded,
}

#[derive(Debug)]
pub struct RequestContext {
    pub entity: String,
    pub action: Action,
    pub stage: Stage,
    pub user_id: Option<String>,
}

impl RequestContext {
    pub fn new(entity: impl Into<String>, action: Action) -> Self {
        Self {
            entity: entity.into(),
            action,
            stage: Stage::Received,
            user_id: None,
        }
    }

    /// Require a session
    pub fn authenticate(&mut self, user: Option<Extension<CurrentUser>>) -> ApiResult<CurrentUser> {
        let Extension(user) = user.ok_or(ApiError::Unauthorized)?;
        self.user_id = Some(user.id.clone());
        self.stage = Stage::Authenticated;
        Ok(user)
    }

    /// Require the context's action on `spec`
    pub fn authorize(&mut self, user: &CurrentUser, spec: &EntitySpec) -> ApiResult<()> {
        permission::check(user, spec, self.action)?;
        self.stage = Stage::Authorized;
        Ok(())
    }

    pub fn validated(&mut self, result: ValidationResult) -> ApiResult<()> {
        if !result.valid {
            return Err(ApiError::Validation(result.errors));
        }
        self.stage = Stage::Validated;
        Ok(())
    }

    pub fn executed(&mut self) {
        self.stage = Stage::Executed;
    }

    /// Finish the request, logging failures with context
    pub fn respond<T: IntoResponse>(mut self, result: ApiResult<T>) -> Response {
        match result {
            Ok(body) => {
                self.stage = Stage::Responded;
                debug!(
                    entity = %self.entity,
                    action = %self.action,
                    user_id = self.user_id.as_deref().unwrap_or("-"),
                    stage = ?self.stage,
                    "Request completed"
                );
                body.into_response()
            }
            Err(err) => {
                self.log_error(&err);
                err.into_response()
            }
        }
    }

    fn log_error(&self, err: &ApiError) {
        let status = err.status().as_u16();
        let user_id = self.user_id.as_deref().unwrap_or("-");
        let stage = format!("{:?}", self.stage);

        if err.is_server_error() {
            // Full detail stays in the log
            error!(entity = %self.entity, action = %self.action, user_id, status, stage, "{}", err);
        } else if matches!(err, ApiError::Unauthorized | ApiError::Forbidden(_)) {
            warn!(entity = %self.entity, action = %self.action, user_id, status, stage, "{}", err);
        } else {
            info!(entity = %self.entity, action = %self.action, user_id, status, stage, "{}", err);
        }
    }
}

/// Parse a request body as a JSON object
pub fn parse_object(body: &Bytes) -> ApiResult<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(ApiError::BadRequest(MALFORMED_BODY.to_string())),
    }
}
