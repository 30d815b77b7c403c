//! v002 -- Delivery lifecycle columns.
//!
//! Adds the columns the messaging core derives from `legacy_type` on older
//! rows.  They stay nullable at the schema level so pre-migration rows
//! remain readable until the backfill pass has visited them.

use rusqlite::Connection;

const UP_SQL: &str = r#"
ALTER TABLE messages ADD COLUMN original_created_at TEXT;  -- first-ever creation time
ALTER TABLE messages ADD COLUMN direction TEXT;            -- 'outgoing' | 'incoming' | 'system'
ALTER TABLE messages ADD COLUMN delivery_status TEXT;      -- 'pending' .. 'displayed'
ALTER TABLE messages ADD COLUMN content_fingerprint TEXT;  -- base64 SHA-256 of the content triple

CREATE INDEX IF NOT EXISTS idx_messages_jid_created
    ON messages(remote_jid, created_at DESC);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
