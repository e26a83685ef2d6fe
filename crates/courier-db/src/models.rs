/// Database row types. These map directly to SQLite rows.
/// Distinct from courier-types API models to keep the DB layer independent.
/// Timestamps on message rows are microseconds since the Unix epoch.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub account_type: String,
    pub is_banned: bool,
    pub avatar_ref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub created_at: i64,
    pub read_at: Option<i64>,
    pub edited_at: Option<i64>,
    pub deleted_at: Option<i64>,
    pub reply: Option<ReplyRow>,
}

#[derive(Debug, Clone)]
pub struct ReplyRow {
    pub message_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub body: String,
}

/// Insert payload for a message. `created_at` and `seq` are assigned by the store.
pub struct NewMessageRow<'a> {
    pub id: &'a str,
    pub pair_low: &'a str,
    pub pair_high: &'a str,
    pub sender_id: &'a str,
    pub recipient_id: &'a str,
    pub body: &'a str,
    pub reply: Option<&'a ReplyRow>,
}

/// Filter for directory scans.
pub struct UserFilter<'a> {
    /// Stored account types to include; `None` means any.
    pub account_types: Option<&'a [&'a str]>,
    pub exclude_id: &'a str,
    /// Already-escaped `LIKE` needle, matched case-insensitively against name, email and phone.
    pub search: Option<&'a str>,
    pub limit: u32,
}
