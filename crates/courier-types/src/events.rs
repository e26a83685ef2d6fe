use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ChatMessage;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication and channel subscription
    Ready { user_id: Uuid },

    /// A message was sent in one of the user's conversations
    MessageCreate(ChatMessage),

    /// A message was edited or deleted
    MessageUpdate(ChatMessage),

    /// Reply to a `SendMessage` command, delivered only to the issuing connection
    SendAck {
        request_id: Option<String>,
        success: bool,
        message: Option<ChatMessage>,
        error: Option<String>,
    },
}

impl GatewayEvent {
    pub fn ack_ok(request_id: Option<String>, message: ChatMessage) -> Self {
        Self::SendAck {
            request_id,
            success: true,
            message: Some(message),
            error: None,
        }
    }

    pub fn ack_err(request_id: Option<String>, error: impl Into<String>) -> Self {
        Self::SendAck {
            request_id,
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection (only when no token was given at upgrade)
    Identify { token: String },

    /// Send a direct message through the same path as `POST /messages/{id}`
    SendMessage {
        #[serde(default)]
        request_id: Option<String>,
        recipient_id: String,
        body: String,
        #[serde(default)]
        reply_to_message_id: Option<String>,
    },
}
