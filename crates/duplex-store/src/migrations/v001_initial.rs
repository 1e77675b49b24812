//! v001 -- Initial schema creation.
//!
//! Creates the two core tables: `messages` and `peers`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id           TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    sender_id    TEXT NOT NULL,              -- UUID
    recipient_id TEXT NOT NULL,              -- UUID
    text         TEXT,                       -- nullable: image-only messages
    image        TEXT,                       -- nullable: data URL
    created_at   TEXT NOT NULL,              -- RFC-3339, fixed microsecond width
    seen         INTEGER NOT NULL DEFAULT 0, -- boolean 0/1, flips 0 -> 1 only

    CHECK (text IS NOT NULL OR image IS NOT NULL)
);

-- Conversation fetches scan both directions of a pair.
CREATE INDEX IF NOT EXISTS idx_messages_pair_ts
    ON messages(sender_id, recipient_id, created_at);

-- Unseen-count queries and mark-seen updates.
CREATE INDEX IF NOT EXISTS idx_messages_unseen
    ON messages(recipient_id, sender_id, seen);

-- ----------------------------------------------------------------
-- Peers (known-user directory)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS peers (
    user_id    TEXT PRIMARY KEY NOT NULL,    -- UUID
    first_seen TEXT NOT NULL                 -- RFC-3339
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
