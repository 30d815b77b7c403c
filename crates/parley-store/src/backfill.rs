//! One-time backfill of delivery columns on legacy message rows.
//!
//! Rows written before migration v002 lack `original_created_at`,
//! `direction`, `delivery_status`, and `content_fingerprint`.  The backfill
//! derives them from `legacy_type` and the stored content.  Every row is
//! updated individually with `COALESCE`, so the pass is idempotent and an
//! interrupted run resumes where it left off: already-populated fields are
//! never touched and nothing is rolled back.

use rusqlite::{params, Connection};

use parley_shared::fingerprint::content_fingerprint;
use parley_shared::LegacyMessageType;

use crate::error::Result;

struct LegacyRow {
    id: String,
    legacy_type: Option<String>,
    markdown: String,
    plain_text: String,
    html: String,
    created_at: String,
}

/// Scan for rows missing any derived column and fill the gaps.
///
/// Returns the number of rows updated.
pub fn backfill_legacy_records(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare(
        "SELECT id, legacy_type, markdown, plain_text, html, created_at
         FROM messages
         WHERE original_created_at IS NULL
            OR direction IS NULL
            OR delivery_status IS NULL
            OR content_fingerprint IS NULL",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(LegacyRow {
            id: row.get(0)?,
            legacy_type: row.get(1)?,
            markdown: row.get(2)?,
            plain_text: row.get(3)?,
            html: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;

    let mut pending = Vec::new();
    for row in rows {
        pending.push(row?);
    }

    let mut updated = 0;
    for row in pending {
        let legacy = row
            .legacy_type
            .as_deref()
            .and_then(LegacyMessageType::parse)
            .unwrap_or(LegacyMessageType::Sent);
        let fingerprint = content_fingerprint(&row.markdown, &row.plain_text, &row.html);

        updated += conn.execute(
            "UPDATE messages SET
                original_created_at = COALESCE(original_created_at, ?2),
                direction           = COALESCE(direction, ?3),
                delivery_status     = COALESCE(delivery_status, ?4),
                content_fingerprint = COALESCE(content_fingerprint, ?5)
             WHERE id = ?1",
            params![
                row.id,
                row.created_at,
                legacy.direction().as_str(),
                legacy.delivery_status().as_str(),
                fingerprint,
            ],
        )?;
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use parley_shared::{BareJid, DeliveryStatus, Direction};

    use super::*;
    use crate::Database;

    fn insert_legacy_row(db: &Database, id: &str, legacy_type: &str) {
        let now = Utc::now().to_rfc3339();
        db.conn()
            .execute(
                "INSERT INTO messages
                    (id, remote_jid, legacy_type, markdown, plain_text, html,
                     metadata, created_at, updated_at)
                 VALUES (?1, 'alice@example', ?2, '', 'hello', '', '{}', ?3, ?3)",
                params![id, legacy_type, now],
            )
            .unwrap();
    }

    #[test]
    fn derives_missing_fields_from_legacy_type() {
        let db = Database::open_in_memory().unwrap();
        insert_legacy_row(&db, "m-sent", "sent");
        insert_legacy_row(&db, "m-recv", "received");

        let updated = backfill_legacy_records(db.conn()).unwrap();
        assert_eq!(updated, 2);

        let jid = BareJid::new("alice@example").unwrap();
        let sent = db.get(&jid, "m-sent").unwrap().unwrap();
        assert_eq!(sent.direction, Direction::Outgoing);
        assert_eq!(sent.delivery_status, DeliveryStatus::Sent);
        assert_eq!(sent.original_created_at, sent.created_at);
        assert!(!sent.content_fingerprint.is_empty());

        let received = db.get(&jid, "m-recv").unwrap().unwrap();
        assert_eq!(received.direction, Direction::Incoming);
        assert_eq!(received.delivery_status, DeliveryStatus::Received);
    }

    #[test]
    fn is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        insert_legacy_row(&db, "m-1", "sent");

        assert_eq!(backfill_legacy_records(db.conn()).unwrap(), 1);
        assert_eq!(backfill_legacy_records(db.conn()).unwrap(), 0);
    }

    #[test]
    fn populated_fields_survive_a_rerun() {
        let db = Database::open_in_memory().unwrap();
        insert_legacy_row(&db, "m-1", "sent");
        backfill_legacy_records(db.conn()).unwrap();

        // Manually regress one column; the others must keep their values.
        db.conn()
            .execute(
                "UPDATE messages SET delivery_status = NULL, direction = 'incoming'
                 WHERE id = 'm-1'",
                [],
            )
            .unwrap();
        backfill_legacy_records(db.conn()).unwrap();

        let jid = BareJid::new("alice@example").unwrap();
        let row = db.get(&jid, "m-1").unwrap().unwrap();
        assert_eq!(row.delivery_status, DeliveryStatus::Sent);
        assert_eq!(row.direction, Direction::Incoming);
    }

    #[test]
    fn runs_automatically_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let db = Database::open_at(&path).unwrap();
            insert_legacy_row(&db, "m-old", "received");
        }

        let db = Database::open_at(&path).unwrap();
        let jid = BareJid::new("alice@example").unwrap();
        let row = db.get(&jid, "m-old").unwrap().unwrap();
        assert_eq!(row.delivery_status, DeliveryStatus::Received);
    }
}
