//! v001 -- Initial schema creation.
//!
//! Creates the four chat tables: `profiles`, `chats`, `chat_participants`,
//! and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles (read-only projection used for chat headers)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID
    name       TEXT NOT NULL,
    avatar_url TEXT
);

-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    created_at TEXT NOT NULL,               -- RFC-3339, microseconds, UTC
    updated_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Chat membership
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_participants (
    chat_id TEXT NOT NULL,                  -- FK -> chats(id)
    user_id TEXT NOT NULL,                  -- FK -> profiles(id)

    PRIMARY KEY (chat_id, user_id),
    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES profiles(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chat_participants_user ON chat_participants(user_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id         TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    chat_id    TEXT NOT NULL,               -- FK -> chats(id)
    sender_id  TEXT NOT NULL,               -- FK -> profiles(id)
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL,
    read       INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    FOREIGN KEY (sender_id) REFERENCES profiles(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts
    ON messages(chat_id, created_at DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
