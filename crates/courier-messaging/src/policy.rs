//! Who may message whom.
//!
//! Only resident↔operator pairs may talk. Checks run in a fixed order so the
//! reported reason is deterministic: self, sender ban, recipient ban, roles.

use std::fmt;

use courier_types::models::Role;

use crate::directory::DirectoryUser;
use crate::error::MessagingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    SelfMessage,
    SenderSuspended,
    RecipientSuspended,
    UnknownRole,
    SameRole,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::SelfMessage => "cannot message self",
            Self::SenderSuspended => "sender suspended",
            Self::RecipientSuspended => "recipient suspended",
            Self::UnknownRole => "unknown account type",
            Self::SameRole => "same-role messaging not permitted",
        };
        f.write_str(reason)
    }
}

impl From<Denial> for MessagingError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::SelfMessage => MessagingError::bad_request("You cannot message yourself"),
            Denial::SenderSuspended => MessagingError::banned("Account is suspended"),
            Denial::RecipientSuspended => {
                MessagingError::forbidden("Recipient account is suspended")
            }
            Denial::UnknownRole => MessagingError::forbidden("Invalid account type"),
            Denial::SameRole => MessagingError::forbidden(
                "Messaging is only available between residents and operators",
            ),
        }
    }
}

/// Decide whether `sender` may exchange messages with `recipient`.
pub fn can_message(sender: &DirectoryUser, recipient: &DirectoryUser) -> Result<(), Denial> {
    if sender.id == recipient.id {
        return Err(Denial::SelfMessage);
    }
    if sender.banned {
        return Err(Denial::SenderSuspended);
    }
    if recipient.banned {
        return Err(Denial::RecipientSuspended);
    }

    let sender_role = sender.role.ok_or(Denial::UnknownRole)?;
    let recipient_role = recipient.role.ok_or(Denial::UnknownRole)?;
    if sender_role == recipient_role {
        return Err(Denial::SameRole);
    }

    Ok(())
}

/// Role of an account that is acting directly. Unknown account types are refused.
pub fn actor_role(account_type: &str) -> Result<Role, MessagingError> {
    Role::from_account_type(account_type).ok_or(Denial::UnknownRole.into())
}

/// Role shown for an account in listings. Unknown account types read as resident.
pub fn listed_role(user: &DirectoryUser) -> Role {
    user.role.unwrap_or(Role::Resident)
}
