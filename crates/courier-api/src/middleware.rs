use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use courier_messaging::MessagingError;

use crate::auth::{AppState, verify_token};
use crate::error::ApiError;

/// Token from an `Authorization: Bearer <token>` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Validate the bearer JWT, then make sure the caller still exists and is
/// not suspended. Inserts the token's `Claims` for downstream handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let claims = verify_token(&state.jwt_secret, token).map_err(|e| {
        debug!("rejected bearer token: {}", e);
        ApiError::unauthorized("Invalid or expired token")
    })?;

    match state.service.authenticate_caller(claims.sub).await {
        Ok(_) => {}
        Err(MessagingError::NotFound(_)) => {
            return Err(ApiError::new(StatusCode::NOT_FOUND, "USER_NOT_FOUND", "User not found"));
        }
        Err(e) => return Err(e.into()),
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
