use thiserror::Error;

pub type Result<T> = std::result::Result<T, MessagingError>;

#[derive(Debug, Error)]
pub enum MessagingError {
    /// Malformed input: empty or oversized body, bad id, messaging oneself.
    #[error("{0}")]
    BadRequest(String),

    /// Role pairing, suspension, or acting on someone else's message.
    #[error("{message}")]
    Forbidden { code: &'static str, message: String },

    /// Unknown user, or a message that is not part of the caller's conversation.
    #[error("{0}")]
    NotFound(String),

    /// Store or directory failure, including timeouts.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl MessagingError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            code: "FORBIDDEN",
            message: message.into(),
        }
    }

    pub fn banned(message: impl Into<String>) -> Self {
        Self::Forbidden {
            code: "ACCOUNT_BANNED",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Forbidden { code, .. } => code,
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
