use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;

use courier_gateway::connection;

use crate::auth::{AppState, verify_token};
use crate::error::ApiError;
use crate::middleware::bearer_token;

#[derive(Debug, Deserialize)]
pub struct GatewayParams {
    token: Option<String>,
}

/// `GET /gateway`. A token at upgrade (`?token=` or bearer header) is checked
/// before the socket opens. Without one the client must send `Identify` first.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<GatewayParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params
        .token
        .filter(|t| !t.trim().is_empty())
        .or_else(|| bearer_token(&headers).map(str::to_string));

    let service = state.service.clone();
    let dispatcher = state.dispatcher.clone();

    let Some(token) = token else {
        let secret = state.jwt_secret.clone();
        return ws
            .on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, service, secret))
            .into_response();
    };

    let claims = match verify_token(&state.jwt_secret, &token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!("gateway upgrade rejected: {}", e);
            return ApiError::unauthorized("Invalid or expired token").into_response();
        }
    };
    if let Err(e) = service.authenticate_caller(claims.sub).await {
        return ApiError::from(e).into_response();
    }

    ws.on_upgrade(move |socket| {
        connection::handle_connection_authenticated(socket, dispatcher, service, claims.sub)
    })
    .into_response()
}
