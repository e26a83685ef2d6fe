use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use courier_messaging::MessagingError;
use courier_types::api::ApiErrorBody;

/// Error half of every handler. Renders as `{ success: false, message, code }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }
}

impl From<MessagingError> for ApiError {
    fn from(err: MessagingError) -> Self {
        let code = err.code();
        match err {
            MessagingError::BadRequest(message) => Self::new(StatusCode::BAD_REQUEST, code, message),
            MessagingError::Forbidden { message, .. } => Self::new(StatusCode::FORBIDDEN, code, message),
            MessagingError::NotFound(message) => Self::new(StatusCode::NOT_FOUND, code, message),
            MessagingError::Internal(e) => {
                error!("internal messaging error: {:#}", e);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, "Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            success: false,
            message: self.message,
            code: self.code.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}
