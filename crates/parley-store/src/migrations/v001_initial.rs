//! v001 -- Initial schema creation.
//!
//! Creates the legacy-era `messages` table.  Rows written by this schema
//! carry only `legacy_type`; the delivery columns arrive in v002 and are
//! backfilled at open.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id               TEXT PRIMARY KEY NOT NULL,    -- UUID v4, store-assigned
    remote_jid       TEXT NOT NULL COLLATE NOCASE, -- conversation partner bare address
    local_temp_id    TEXT,                         -- client correlation id
    remote_object_id TEXT,                         -- id assigned by the far end
    legacy_type      TEXT,                         -- 'sent' | 'received'
    markdown         TEXT NOT NULL DEFAULT '',
    plain_text       TEXT NOT NULL DEFAULT '',
    html             TEXT NOT NULL DEFAULT '',
    reply_to_id      TEXT,
    is_edited        INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    metadata         TEXT NOT NULL DEFAULT '{}',   -- JSON object
    created_at       TEXT NOT NULL,                -- ISO-8601 / RFC-3339
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_remote_jid ON messages(remote_jid);
CREATE INDEX IF NOT EXISTS idx_messages_remote_object
    ON messages(remote_jid, remote_object_id);
CREATE INDEX IF NOT EXISTS idx_messages_local_temp
    ON messages(remote_jid, local_temp_id);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
