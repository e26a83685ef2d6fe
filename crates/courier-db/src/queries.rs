use crate::models::{MessageRow, NewMessageRow, ReplyRow, UserFilter, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::Connection;
use rusqlite::types::ToSql;

const USER_COLUMNS: &str = "id, name, email, phone, account_type, is_banned, avatar_ref";

/// Latest timestamp in one conversation. Served by `idx_messages_pair`.
const LAST_CREATED_AT: &str =
    "SELECT MAX(created_at) FROM messages WHERE pair_low = ?1 AND pair_high = ?2";

const MESSAGE_COLUMNS: &str = "seq, id, sender_id, recipient_id, body, created_at, read_at, \
     edited_at, deleted_at, reply_message_id, reply_sender_id, reply_sender_name, reply_body";

impl Database {
    // -- Users --

    /// Insert or refresh a directory entry. Called by the profile-sync side and tests.
    pub fn upsert_user(&self, user: &UserRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, phone, account_type, is_banned, avatar_ref, search_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    email = excluded.email,
                    phone = excluded.phone,
                    account_type = excluded.account_type,
                    is_banned = excluded.is_banned,
                    avatar_ref = excluded.avatar_ref,
                    search_key = excluded.search_key",
                rusqlite::params![
                    user.id,
                    user.name,
                    user.email,
                    user.phone,
                    user.account_type,
                    user.is_banned,
                    user.avatar_ref,
                    search_key(user)
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Active (non-banned) users other than `exclude_id`, ordered by name.
    pub fn find_active_users(&self, filter: &UserFilter<'_>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| query_active_users(conn, filter))
    }

    // -- Messages --

    /// Append a message. `created_at` is strictly greater than every earlier
    /// message's in the same conversation, even if the wall clock stalls or steps back.
    pub fn insert_message(&self, new: &NewMessageRow<'_>) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let last: Option<i64> = tx.query_row(
                LAST_CREATED_AT,
                rusqlite::params![new.pair_low, new.pair_high],
                |row| row.get(0),
            )?;
            let now = now_micros();
            let created_at = match last {
                Some(last) if last >= now => last + 1,
                _ => now,
            };

            tx.execute(
                "INSERT INTO messages (id, pair_low, pair_high, sender_id, recipient_id, body, created_at,
                                       reply_message_id, reply_sender_id, reply_sender_name, reply_body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    new.id,
                    new.pair_low,
                    new.pair_high,
                    new.sender_id,
                    new.recipient_id,
                    new.body,
                    created_at,
                    new.reply.map(|r| r.message_id.as_str()),
                    new.reply.map(|r| r.sender_id.as_str()),
                    new.reply.map(|r| r.sender_name.as_str()),
                    new.reply.map(|r| r.body.as_str()),
                ],
            )?;
            let seq = tx.last_insert_rowid();
            tx.commit()?;

            Ok(MessageRow {
                seq,
                id: new.id.to_string(),
                sender_id: new.sender_id.to_string(),
                recipient_id: new.recipient_id.to_string(),
                body: new.body.to_string(),
                created_at,
                read_at: None,
                edited_at: None,
                deleted_at: None,
                reply: new.reply.cloned(),
            })
        })
    }

    /// Newest-first page of a conversation, optionally strictly older than `before`.
    pub fn get_messages_page(
        &self,
        pair_low: &str,
        pair_high: &str,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE pair_low = ?1 AND pair_high = ?2
                   AND (?3 IS NULL OR created_at < ?3)
                 ORDER BY created_at DESC, seq DESC
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![pair_low, pair_high, before, limit],
                    map_message_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Look up a message, but only if it belongs to the given pair.
    pub fn get_message_in_pair(
        &self,
        pair_low: &str,
        pair_high: &str,
        id: &str,
    ) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message_in_pair(conn, pair_low, pair_high, id))
    }

    /// Stamp `read_at` on every unread message addressed to `reader_id` in the pair.
    /// Returns how many rows changed.
    pub fn mark_read(&self, pair_low: &str, pair_high: &str, reader_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read_at = ?1
                 WHERE pair_low = ?2 AND pair_high = ?3 AND recipient_id = ?4 AND read_at IS NULL",
                rusqlite::params![now_micros(), pair_low, pair_high, reader_id],
            )?;
            Ok(changed)
        })
    }

    /// Replace the body of a live message and stamp `edited_at`.
    /// Returns `None` when no undeleted message with that id exists in the pair.
    pub fn update_message_body(
        &self,
        pair_low: &str,
        pair_high: &str,
        id: &str,
        body: &str,
    ) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET body = ?1, edited_at = ?2
                 WHERE id = ?3 AND pair_low = ?4 AND pair_high = ?5 AND deleted_at IS NULL",
                rusqlite::params![body, now_micros(), id, pair_low, pair_high],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_message_in_pair(conn, pair_low, pair_high, id)
        })
    }

    /// Set `deleted_at` if it is not set yet. Returns the message either way,
    /// or `None` if it does not exist in the pair.
    pub fn soft_delete_message(
        &self,
        pair_low: &str,
        pair_high: &str,
        id: &str,
    ) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET deleted_at = ?1
                 WHERE id = ?2 AND pair_low = ?3 AND pair_high = ?4 AND deleted_at IS NULL",
                rusqlite::params![now_micros(), id, pair_low, pair_high],
            )?;
            query_message_in_pair(conn, pair_low, pair_high, id)
        })
    }

    /// Unread, undeleted message counts addressed to `reader_id`, grouped by sender.
    pub fn unread_counts(&self, reader_id: &str) -> Result<Vec<(String, u64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender_id, COUNT(*) FROM messages
                 WHERE recipient_id = ?1 AND read_at IS NULL AND deleted_at IS NULL
                 GROUP BY sender_id",
            )?;
            let rows = stmt
                .query_map([reader_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Escape `%`, `_` and `\` so user input is matched literally by `LIKE ... ESCAPE '\'`.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Unicode-lowercased haystack for contact search. SQLite's `LIKE` only folds
/// ASCII, so both sides are folded here instead.
fn search_key(user: &UserRow) -> String {
    format!("{}\n{}\n{}", user.name, user.email, user.phone).to_lowercase()
}

fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        account_type: row.get(4)?,
        is_banned: row.get(5)?,
        avatar_ref: row.get(6)?,
    })
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    let reply_message_id: Option<String> = row.get(9)?;
    let reply = match reply_message_id {
        Some(message_id) => Some(ReplyRow {
            message_id,
            sender_id: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
            sender_name: row.get::<_, Option<String>>(11)?.unwrap_or_default(),
            body: row.get::<_, Option<String>>(12)?.unwrap_or_default(),
        }),
        None => None,
    };

    Ok(MessageRow {
        seq: row.get(0)?,
        id: row.get(1)?,
        sender_id: row.get(2)?,
        recipient_id: row.get(3)?,
        body: row.get(4)?,
        created_at: row.get(5)?,
        read_at: row.get(6)?,
        edited_at: row.get(7)?,
        deleted_at: row.get(8)?,
        reply,
    })
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([id], map_user_row).optional()?;
    Ok(row)
}

fn query_active_users(conn: &Connection, filter: &UserFilter<'_>) -> Result<Vec<UserRow>> {
    let mut clauses = vec!["is_banned = 0".to_string(), "id <> ?1".to_string()];
    let mut params: Vec<&dyn ToSql> = vec![&filter.exclude_id];

    if let Some(types) = filter.account_types {
        let start = params.len() + 1;
        let placeholders: Vec<String> =
            (start..start + types.len()).map(|i| format!("?{}", i)).collect();
        clauses.push(format!("account_type IN ({})", placeholders.join(", ")));
        for t in types {
            params.push(t);
        }
    }

    let needle = filter.search.map(|s| format!("%{}%", s.to_lowercase()));
    if let Some(needle) = &needle {
        let n = params.len() + 1;
        clauses.push(format!(r"search_key LIKE ?{n} ESCAPE '\'"));
        params.push(needle);
    }

    let limit_idx = params.len() + 1;
    params.push(&filter.limit);

    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE {} ORDER BY name ASC, id ASC LIMIT ?{}",
        clauses.join(" AND "),
        limit_idx
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params.as_slice(), map_user_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_message_in_pair(
    conn: &Connection,
    pair_low: &str,
    pair_high: &str,
    id: &str,
) -> Result<Option<MessageRow>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1 AND pair_low = ?2 AND pair_high = ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt
        .query_row(rusqlite::params![id, pair_low, pair_high], map_message_row)
        .optional()?;
    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
