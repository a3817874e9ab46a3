//! Session middleware
//!
//! Resolves `Authorization: Bearer <token>` (or `?access_token=` for
//! EventSource clients, which cannot set headers) to a [`CurrentUser`]
//! request extension. Requests without a valid session pass through
//! unauthenticated; handlers decide whether that is acceptable.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::auth::resolve_session;
use crate::error::ApiError;
use crate::AppState;

/// Query parameter accepted in place of the Authorization header
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_token(&request) else {
        return next.run(request).await;
    };

    match resolve_session(&state.db, &token).await {
        Ok(Some(user)) => {
            if let Err(e) = state.rate_limiter.check(&user.id) {
                return e.into_response();
            }
            debug!(user_id = %user.id, role = %user.role, "Session resolved");
            request.extensions_mut().insert(user);
        }
        Ok(None) => debug!("Unknown or expired session token"),
        Err(e) => {
            error!("Session lookup failed: {}", e);
            return ApiError::from(e).into_response();
        }
    }

    next.run(request).await
}

fn extract_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string());

    from_header
        .or_else(|| {
            request.uri().query().and_then(|query| {
                query.split('&').find_map(|pair| {
                    pair.strip_prefix(ACCESS_TOKEN_PARAM)
                        .and_then(|rest| rest.strip_prefix('='))
                        .map(str::to_string)
                })
            })
        })
        .filter(|token| !token.is_empty())
}
