use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// Access-token claims issued by the identity service. Shared by courier-api
/// (REST middleware) and courier-gateway (WebSocket authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: String,
    pub account_type: String,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub body: String,
    pub reply_to_message_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactsQuery {
    pub limit: Option<u32>,
    pub query: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConversationQuery {
    pub limit: Option<u32>,
    /// Cursor: RFC 3339 `createdAt` of the oldest message from the previous page.
    pub before: Option<chrono::DateTime<chrono::Utc>>,
}

// -- Envelope --

/// Body of every successful REST response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

/// Body of every failed REST response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub message: String,
    pub code: String,
}
