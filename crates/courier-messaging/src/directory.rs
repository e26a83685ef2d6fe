use async_trait::async_trait;
use courier_types::models::Role;
use uuid::Uuid;

/// A user as seen by messaging. `role` is `None` when the stored account type
/// is not one of the recognized aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    pub id: Uuid,
    pub role: Option<Role>,
    pub banned: bool,
    pub display_name: String,
    pub avatar_ref: Option<String>,
}

/// Scan over active (non-banned) accounts.
#[derive(Debug, Clone)]
pub struct UserScan {
    /// Restrict to one normalized role; `None` means any role.
    pub role: Option<Role>,
    pub exclude: Uuid,
    /// Raw search text, matched case-insensitively as a literal substring of
    /// name, email or phone. Implementations must escape it for their engine.
    pub query: Option<String>,
    pub limit: u32,
}

/// Read-only user directory owned by the profile service.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<DirectoryUser>>;

    /// Active accounts matching `scan`, ordered by display name ascending.
    async fn find_active_users(&self, scan: UserScan) -> anyhow::Result<Vec<DirectoryUser>>;
}
