use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_db::Database;
use courier_db::models::{MessageRow, NewMessageRow, ReplyRow, UserFilter, UserRow};
use courier_types::models::{ReplyPreview, Role};
use tracing::warn;
use uuid::Uuid;

use crate::directory::{Directory, DirectoryUser, UserScan};
use crate::store::{ConversationStore, NewMessage, PairKey, StoredMessage};

/// Run blocking DB work off the async runtime.
async fn blocking<F, T>(db: &Arc<Database>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
}

/// [`Directory`] backed by the `users` table.
#[derive(Clone)]
pub struct SqliteDirectory {
    db: Arc<Database>,
}

impl SqliteDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Directory for SqliteDirectory {
    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<DirectoryUser>> {
        let row = blocking(&self.db, move |db| db.get_user_by_id(&id.to_string())).await?;
        Ok(row.map(user_from_row))
    }

    async fn find_active_users(&self, scan: UserScan) -> anyhow::Result<Vec<DirectoryUser>> {
        let rows = blocking(&self.db, move |db| {
            let needle = scan.query.as_deref().map(courier_db::escape_like);
            let exclude = scan.exclude.to_string();
            db.find_active_users(&UserFilter {
                account_types: scan.role.map(Role::aliases),
                exclude_id: &exclude,
                search: needle.as_deref(),
                limit: scan.limit,
            })
        })
        .await?;
        Ok(rows.into_iter().map(user_from_row).collect())
    }
}

/// [`ConversationStore`] backed by the `messages` table.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn append(&self, message: NewMessage) -> anyhow::Result<StoredMessage> {
        let row = blocking(&self.db, move |db| {
            let pair = message.pair();
            let (low, high) = (pair.low().to_string(), pair.high().to_string());
            let id = message.id.to_string();
            let sender = message.sender_id.to_string();
            let recipient = message.recipient_id.to_string();
            let reply = message.reply_to.as_ref().map(|r| ReplyRow {
                message_id: r.message_id.to_string(),
                sender_id: r.sender_id.to_string(),
                sender_name: r.sender_name.clone(),
                body: r.body.clone(),
            });
            db.insert_message(&NewMessageRow {
                id: &id,
                pair_low: &low,
                pair_high: &high,
                sender_id: &sender,
                recipient_id: &recipient,
                body: &message.body,
                reply: reply.as_ref(),
            })
        })
        .await?;
        Ok(message_from_row(row))
    }

    async fn find_for_pagination(
        &self,
        pair: PairKey,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> anyhow::Result<Vec<StoredMessage>> {
        let rows = blocking(&self.db, move |db| {
            db.get_messages_page(
                &pair.low().to_string(),
                &pair.high().to_string(),
                before.map(|t| t.timestamp_micros()),
                limit,
            )
        })
        .await?;
        Ok(rows.into_iter().map(message_from_row).collect())
    }

    async fn find_mutable(&self, pair: PairKey, id: Uuid) -> anyhow::Result<Option<StoredMessage>> {
        let row = blocking(&self.db, move |db| {
            db.get_message_in_pair(&pair.low().to_string(), &pair.high().to_string(), &id.to_string())
        })
        .await?;
        Ok(row.map(message_from_row))
    }

    async fn mark_read(&self, pair: PairKey, reader: Uuid) -> anyhow::Result<usize> {
        blocking(&self.db, move |db| {
            db.mark_read(&pair.low().to_string(), &pair.high().to_string(), &reader.to_string())
        })
        .await
    }

    async fn update_body(
        &self,
        pair: PairKey,
        id: Uuid,
        body: String,
    ) -> anyhow::Result<Option<StoredMessage>> {
        let row = blocking(&self.db, move |db| {
            db.update_message_body(
                &pair.low().to_string(),
                &pair.high().to_string(),
                &id.to_string(),
                &body,
            )
        })
        .await?;
        Ok(row.map(message_from_row))
    }

    async fn soft_delete(&self, pair: PairKey, id: Uuid) -> anyhow::Result<Option<StoredMessage>> {
        let row = blocking(&self.db, move |db| {
            db.soft_delete_message(&pair.low().to_string(), &pair.high().to_string(), &id.to_string())
        })
        .await?;
        Ok(row.map(message_from_row))
    }

    async fn unread_counts(&self, reader: Uuid) -> anyhow::Result<HashMap<Uuid, u64>> {
        let rows = blocking(&self.db, move |db| db.unread_counts(&reader.to_string())).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(sender, count)| sender.parse::<Uuid>().ok().map(|id| (id, count)))
            .collect())
    }
}

fn user_from_row(row: UserRow) -> DirectoryUser {
    DirectoryUser {
        id: parse_id(&row.id, "user id", &row.id),
        role: Role::from_account_type(&row.account_type),
        banned: row.is_banned,
        display_name: row.name,
        avatar_ref: row.avatar_ref.filter(|r| !r.is_empty()),
    }
}

fn message_from_row(row: MessageRow) -> StoredMessage {
    let reply_to = row.reply.as_ref().map(|r| ReplyPreview {
        message_id: parse_id(&r.message_id, "reply message id", &row.id),
        sender_id: parse_id(&r.sender_id, "reply sender id", &row.id),
        sender_name: r.sender_name.clone(),
        body: r.body.clone(),
    });

    StoredMessage {
        seq: row.seq,
        id: parse_id(&row.id, "message id", &row.id),
        sender_id: parse_id(&row.sender_id, "sender_id", &row.id),
        recipient_id: parse_id(&row.recipient_id, "recipient_id", &row.id),
        created_at: micros_to_time(row.created_at, &row.id),
        read_at: row.read_at.map(|t| micros_to_time(t, &row.id)),
        edited_at: row.edited_at.map(|t| micros_to_time(t, &row.id)),
        deleted_at: row.deleted_at.map(|t| micros_to_time(t, &row.id)),
        body: row.body,
        reply_to,
    }
}

fn parse_id(raw: &str, field: &str, owner: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on row '{}': {}", field, raw, owner, e);
        Uuid::default()
    })
}

fn micros_to_time(micros: i64, owner: &str) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_else(|| {
        warn!("Corrupt timestamp {} on message '{}'", micros, owner);
        DateTime::default()
    })
}
