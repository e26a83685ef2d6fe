use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Directory mirror. Owned by the profile service; courier only reads it.
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            email           TEXT NOT NULL DEFAULT '',
            phone           TEXT NOT NULL DEFAULT '',
            account_type    TEXT NOT NULL,
            is_banned       INTEGER NOT NULL DEFAULT 0,
            avatar_ref      TEXT,
            -- Lowercased name, email and phone, newline-separated, for contact search.
            search_key      TEXT NOT NULL DEFAULT '',
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_users_type_name
            ON users(account_type, name);

        -- Timestamps are microseconds since the Unix epoch.
        CREATE TABLE IF NOT EXISTS messages (
            seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
            id                  TEXT NOT NULL UNIQUE,
            pair_low            TEXT NOT NULL,
            pair_high           TEXT NOT NULL,
            sender_id           TEXT NOT NULL REFERENCES users(id),
            recipient_id        TEXT NOT NULL REFERENCES users(id),
            body                TEXT NOT NULL,
            created_at          INTEGER NOT NULL,
            read_at             INTEGER,
            edited_at           INTEGER,
            deleted_at          INTEGER,
            reply_message_id    TEXT,
            reply_sender_id     TEXT,
            reply_sender_name   TEXT,
            reply_body          TEXT,
            CHECK (sender_id <> recipient_id)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(pair_low, pair_high, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_unread
            ON messages(recipient_id, read_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
