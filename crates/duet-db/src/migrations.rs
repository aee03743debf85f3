use crate::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id           TEXT PRIMARY KEY,
                full_name    TEXT NOT NULL,
                email        TEXT NOT NULL UNIQUE,
                password     TEXT NOT NULL,
                bio          TEXT NOT NULL DEFAULT '',
                profile_pic  TEXT NOT NULL DEFAULT '',
                status       TEXT NOT NULL DEFAULT 'offline',
                created_at   INTEGER NOT NULL
            );

            -- One row per unordered pair; user_lo < user_hi.
            CREATE TABLE friendships (
                id               TEXT PRIMARY KEY,
                user_lo          TEXT NOT NULL REFERENCES users(id),
                user_hi          TEXT NOT NULL REFERENCES users(id),
                status           TEXT NOT NULL DEFAULT 'pending',
                action_by        TEXT NOT NULL REFERENCES users(id),
                last_message_id  TEXT REFERENCES messages(id),
                last_message_at  INTEGER NOT NULL,
                created_at       INTEGER NOT NULL,
                CHECK (user_lo < user_hi),
                UNIQUE (user_lo, user_hi)
            );

            CREATE INDEX idx_friendships_lo_activity
                ON friendships(user_lo, status, last_message_at DESC);
            CREATE INDEX idx_friendships_hi_activity
                ON friendships(user_hi, status, last_message_at DESC);

            CREATE TABLE messages (
                id           TEXT PRIMARY KEY,
                sender_id    TEXT NOT NULL REFERENCES users(id),
                receiver_id  TEXT NOT NULL REFERENCES users(id),
                user_lo      TEXT NOT NULL,
                user_hi      TEXT NOT NULL,
                content      TEXT,
                attachment   TEXT,
                status       TEXT NOT NULL DEFAULT 'unread',
                created_at   INTEGER NOT NULL
            );

            CREATE INDEX idx_messages_conversation
                ON messages(user_lo, user_hi, created_at DESC, id DESC);
            CREATE INDEX idx_messages_unread
                ON messages(receiver_id, status, sender_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
