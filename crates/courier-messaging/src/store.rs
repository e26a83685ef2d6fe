use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_types::models::ReplyPreview;
use uuid::Uuid;

/// Largest conversation page a caller may request; also the default.
pub const PAGE_LIMIT_MAX: u32 = 500;

/// Canonical, order-independent identity of a two-party conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey {
    low: Uuid,
    high: Uuid,
}

impl PairKey {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(&self) -> Uuid {
        self.low
    }

    pub fn high(&self) -> Uuid {
        self.high
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.low == id || self.high == id
    }
}

/// A persisted message, before display data is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    /// Store-assigned insertion sequence; breaks `created_at` ties.
    pub seq: i64,
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub reply_to: Option<ReplyPreview>,
}

impl StoredMessage {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub body: String,
    pub reply_to: Option<ReplyPreview>,
}

impl NewMessage {
    pub fn pair(&self) -> PairKey {
        PairKey::new(self.sender_id, self.recipient_id)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PageOptions {
    pub limit: Option<u32>,
    pub before: Option<DateTime<Utc>>,
}

impl PageOptions {
    /// Requested limit clamped to `[1, PAGE_LIMIT_MAX]`, defaulting to the maximum.
    pub fn clamped_limit(&self) -> u32 {
        self.limit.unwrap_or(PAGE_LIMIT_MAX).clamp(1, PAGE_LIMIT_MAX)
    }
}

/// Durable, append-mostly log of direct messages keyed by [`PairKey`].
///
/// Every mutation is a single atomic write scoped to one message; there is no
/// conversation-wide lock.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a new message, assigning `created_at` and `seq`.
    async fn append(&self, message: NewMessage) -> anyhow::Result<StoredMessage>;

    /// Up to `limit` messages older than `before` (or the newest overall),
    /// returned newest first.
    async fn find_for_pagination(
        &self,
        pair: PairKey,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> anyhow::Result<Vec<StoredMessage>>;

    /// Look up a message by id, only within `pair`.
    async fn find_mutable(&self, pair: PairKey, id: Uuid) -> anyhow::Result<Option<StoredMessage>>;

    /// Mark every unread message sent to `reader` in `pair` as read now.
    async fn mark_read(&self, pair: PairKey, reader: Uuid) -> anyhow::Result<usize>;

    /// Replace the body and stamp `edited_at`, unless the message is deleted.
    /// `None` when there is no live message with that id in `pair`.
    async fn update_body(
        &self,
        pair: PairKey,
        id: Uuid,
        body: String,
    ) -> anyhow::Result<Option<StoredMessage>>;

    /// Stamp `deleted_at` once. Repeated calls leave the first stamp in place.
    async fn soft_delete(&self, pair: PairKey, id: Uuid) -> anyhow::Result<Option<StoredMessage>>;

    /// Unread message counts addressed to `reader`, by sender.
    async fn unread_counts(&self, reader: Uuid) -> anyhow::Result<HashMap<Uuid, u64>>;
}
