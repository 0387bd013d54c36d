use anyhow::Result;
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
                id          INTEGER PRIMARY KEY,
                uid         TEXT NOT NULL UNIQUE,
                name        TEXT NOT NULL,
                phone       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            -- Directed edges, always written in pairs.
            CREATE TABLE friendships (
                user_id     INTEGER NOT NULL REFERENCES users(id),
                friend_id   INTEGER NOT NULL REFERENCES users(id),
                remark      TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, friend_id)
            );

            CREATE TABLE friendship_requests (
                id          INTEGER PRIMARY KEY,
                sender_id   INTEGER NOT NULL REFERENCES users(id),
                sender_name TEXT NOT NULL,
                receiver_id INTEGER NOT NULL REFERENCES users(id),
                message     TEXT NOT NULL,
                status      TEXT NOT NULL
                    CHECK (status IN ('pending', 'accepted', 'rejected', 'canceled')),
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE UNIQUE INDEX idx_requests_one_pending
                ON friendship_requests(sender_id, receiver_id)
                WHERE status = 'pending';

            CREATE INDEX idx_requests_receiver
                ON friendship_requests(receiver_id, created_at);

            -- Unordered pair, stored as (low, high).
            CREATE TABLE conversation_friends (
                conversation_id INTEGER PRIMARY KEY,
                user_low        INTEGER NOT NULL,
                user_high       INTEGER NOT NULL,
                CHECK (user_low < user_high),
                UNIQUE (user_low, user_high)
            );

            CREATE TABLE conversation_users (
                user_id         INTEGER NOT NULL REFERENCES users(id),
                conversation_id INTEGER NOT NULL,
                remark          TEXT NOT NULL,
                unread_count    INTEGER NOT NULL DEFAULT 0,
                last_message_id INTEGER,
                is_pinned       INTEGER NOT NULL DEFAULT 0,
                hidden_since    TEXT,
                updated_at      TEXT NOT NULL,
                PRIMARY KEY (user_id, conversation_id)
            );

            CREATE INDEX idx_conversation_users_conversation
                ON conversation_users(conversation_id);

            -- sender_id 0 marks system messages, so no foreign key.
            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY,
                sender_id       INTEGER NOT NULL,
                conversation_id INTEGER NOT NULL,
                status          TEXT NOT NULL
                    CHECK (status IN ('TEXT', 'FILE', 'SYSTEM', 'RECALLED')),
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, id);

            CREATE TABLE texts (
                message_id  INTEGER PRIMARY KEY REFERENCES messages(id),
                text        TEXT NOT NULL
            );

            CREATE TABLE files (
                message_id  INTEGER PRIMARY KEY REFERENCES messages(id),
                file_name   TEXT NOT NULL,
                file_url    TEXT NOT NULL,
                file_size   INTEGER NOT NULL,
                file_type   TEXT NOT NULL
            );

            CREATE TABLE message_users (
                user_id      INTEGER NOT NULL,
                message_id   INTEGER NOT NULL REFERENCES messages(id),
                hidden_since TEXT,
                PRIMARY KEY (user_id, message_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
