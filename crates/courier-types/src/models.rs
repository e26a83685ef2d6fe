use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shown in place of a reply target's body when that target was already
/// deleted at reply time.
pub const DELETED_MESSAGE_PLACEHOLDER: &str = "This message was deleted";

/// The two account kinds that take part in messaging.
///
/// Stored account types carry legacy aliases; they are folded into this enum at
/// the directory boundary with [`Role::from_account_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Resident,
    Operator,
}

impl Role {
    /// Stored account-type strings that normalize to `operator`.
    pub const OPERATOR_ALIASES: &'static [&'static str] = &["operator", "admin_driver", "admin"];
    /// Stored account-type strings that normalize to `resident`.
    pub const RESIDENT_ALIASES: &'static [&'static str] = &["resident"];

    /// Normalize a stored account type. Returns `None` for values that are
    /// neither a resident nor an operator-like alias.
    pub fn from_account_type(value: &str) -> Option<Self> {
        let value = value.trim();
        if Self::RESIDENT_ALIASES.contains(&value) {
            Some(Self::Resident)
        } else if Self::OPERATOR_ALIASES.contains(&value) {
            Some(Self::Operator)
        } else {
            None
        }
    }

    /// The role this one is allowed to exchange messages with.
    pub fn counterpart(self) -> Self {
        match self {
            Self::Resident => Self::Operator,
            Self::Operator => Self::Resident,
        }
    }

    /// Every stored account-type string that maps to this role.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Resident => Self::RESIDENT_ALIASES,
            Self::Operator => Self::OPERATOR_ALIASES,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Resident => "resident",
            Self::Operator => "operator",
        }
    }
}

/// Immutable copy of a reply target taken when the reply was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPreview {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub body: String,
}

/// A message as returned to clients, with both participants' display data
/// resolved at response time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_avatar_url: Option<String>,
    pub recipient_id: Uuid,
    pub recipient_name: String,
    pub recipient_avatar_url: Option<String>,
    /// Empty once the message is deleted.
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub is_edited: bool,
    pub is_deleted: bool,
    pub reply_to: Option<ReplyPreview>,
}

/// An account the caller may open a conversation with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    pub avatar_url: Option<String>,
    /// Messages from this contact to the caller that are not yet read.
    pub unread_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_operator_aliases_collapse() {
        assert_eq!(Role::from_account_type("admin_driver"), Some(Role::Operator));
        assert_eq!(Role::from_account_type("admin"), Some(Role::Operator));
        assert_eq!(Role::from_account_type("operator"), Some(Role::Operator));
        assert_eq!(Role::from_account_type("resident"), Some(Role::Resident));
        assert_eq!(Role::from_account_type("janitor"), None);
    }

    #[test]
    fn counterpart_flips() {
        assert_eq!(Role::Resident.counterpart(), Role::Operator);
        assert_eq!(Role::Operator.counterpart(), Role::Resident);
    }

    #[test]
    fn deleted_message_serializes_camel_case() {
        let msg = ChatMessage {
            id: Uuid::nil(),
            sender_id: Uuid::nil(),
            sender_name: "R".into(),
            sender_avatar_url: None,
            recipient_id: Uuid::nil(),
            recipient_name: "O".into(),
            recipient_avatar_url: None,
            body: String::new(),
            created_at: Utc::now(),
            read_at: None,
            edited_at: None,
            deleted_at: Some(Utc::now()),
            is_edited: false,
            is_deleted: true,
            reply_to: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["isDeleted"], true);
        assert_eq!(json["body"], "");
        assert!(json["replyTo"].is_null());
    }
}
