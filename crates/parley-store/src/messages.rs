//! Message CRUD, pagination, and identifier resolution.
//!
//! A message is addressable by three ids across its lifetime (local temp id
//! before send, store-assigned object id after persistence, remote object
//! id after the far end acknowledges it) and callers may present any of the
//! three.  Every id-targeted operation funnels through
//! [`Database::resolve_message_id`].

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use parley_shared::{BareJid, ChatMessageDescriptor, DeliveryStatus, LegacyMessageType};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::MessageRecord;

/// Upper bound applied by [`Database::search_messages`].
const SEARCH_RESULT_LIMIT: usize = 100;

const MESSAGE_COLUMNS: &str = "id, remote_jid, local_temp_id, remote_object_id, legacy_type, \
     direction, delivery_status, markdown, plain_text, html, reply_to_id, \
     is_edited, metadata, created_at, updated_at, original_created_at, \
     content_fingerprint";

impl Database {
    /// Insert a new record.  On success the store-assigned object id is
    /// written back into `descriptor.message_id`; a missing fingerprint is
    /// computed before the row is written.
    pub fn save(&self, descriptor: &mut ChatMessageDescriptor) -> Result<()> {
        if descriptor.content_fingerprint.is_empty() {
            descriptor.refresh_fingerprint();
        }

        let mut record = MessageRecord::from_descriptor(descriptor)?;
        record.id = Uuid::new_v4().to_string();

        self.conn().execute(
            "INSERT INTO messages
                (id, remote_jid, local_temp_id, remote_object_id, legacy_type,
                 direction, delivery_status, markdown, plain_text, html,
                 reply_to_id, is_edited, metadata, created_at, updated_at,
                 original_created_at, content_fingerprint)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                     ?14, ?15, ?16, ?17)",
            params![
                record.id,
                record.remote_jid.as_str(),
                record.local_temp_id,
                record.remote_object_id,
                record.legacy_type.map(|t| t.as_str()),
                record.direction.map(|d| d.as_str()),
                record.delivery_status.map(|s| s.as_str()),
                record.markdown,
                record.plain_text,
                record.html,
                record.reply_to_id,
                record.is_edited,
                record.metadata_json,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                record.original_created_at.map(|t| t.to_rfc3339()),
                record.content_fingerprint,
            ],
        )?;

        descriptor.message_id = record.id;
        Ok(())
    }

    /// Full update of an existing record keyed by `descriptor.message_id`.
    /// A cleared fingerprint is recomputed before the row is written.
    pub fn replace(&self, descriptor: &mut ChatMessageDescriptor) -> Result<()> {
        if descriptor.content_fingerprint.is_empty() {
            descriptor.refresh_fingerprint();
        }

        let record = MessageRecord::from_descriptor(descriptor)?;

        let affected = self.conn().execute(
            "UPDATE messages SET
                remote_jid = ?2, local_temp_id = ?3, remote_object_id = ?4,
                legacy_type = ?5, direction = ?6, delivery_status = ?7,
                markdown = ?8, plain_text = ?9, html = ?10, reply_to_id = ?11,
                is_edited = ?12, metadata = ?13, created_at = ?14,
                updated_at = ?15, original_created_at = ?16,
                content_fingerprint = ?17
             WHERE id = ?1",
            params![
                record.id,
                record.remote_jid.as_str(),
                record.local_temp_id,
                record.remote_object_id,
                record.legacy_type.map(|t| t.as_str()),
                record.direction.map(|d| d.as_str()),
                record.delivery_status.map(|s| s.as_str()),
                record.markdown,
                record.plain_text,
                record.html,
                record.reply_to_id,
                record.is_edited,
                record.metadata_json,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
                record.original_created_at.map(|t| t.to_rfc3339()),
                record.content_fingerprint,
            ],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Newest-first page of at most `page_size` messages for a conversation.
    /// A non-positive `page_size` yields an empty page, not an error.
    pub fn load_recent(
        &self,
        remote_jid: &BareJid,
        page_size: i64,
    ) -> Result<Vec<ChatMessageDescriptor>> {
        if page_size <= 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE remote_jid = ?1
             ORDER BY created_at DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![remote_jid.as_str(), page_size], row_to_record)?;

        collect_descriptors(rows)
    }

    /// Backward pagination: messages strictly older than `before`.
    pub fn load_older(
        &self,
        remote_jid: &BareJid,
        before: DateTime<Utc>,
        page_size: i64,
    ) -> Result<Vec<ChatMessageDescriptor>> {
        if page_size <= 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE remote_jid = ?1 AND created_at < ?2
             ORDER BY created_at DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![remote_jid.as_str(), before.to_rfc3339(), page_size],
            row_to_record,
        )?;

        collect_descriptors(rows)
    }

    /// Load one message by any of its three identifiers.
    pub fn get(
        &self,
        remote_jid: &BareJid,
        any_id: &str,
    ) -> Result<Option<ChatMessageDescriptor>> {
        let Some(object_id) = self.resolve_message_id(remote_jid, any_id)? else {
            return Ok(None);
        };

        let record = self
            .conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![object_id],
                row_to_record,
            )
            .optional()?;

        record.map(MessageRecord::into_descriptor).transpose()
    }

    /// Delete one message by any of its three identifiers.  Returns whether
    /// a row was removed; an unresolvable id is not an error.
    pub fn delete(&self, remote_jid: &BareJid, any_id: &str) -> Result<bool> {
        let Some(object_id) = self.resolve_message_id(remote_jid, any_id)? else {
            return Ok(false);
        };

        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE id = ?1", params![object_id])?;
        Ok(affected > 0)
    }

    /// Targeted status + timestamp update.  Silent no-op when the message
    /// cannot be resolved: a receipt for an unknown message is expected and
    /// benign.
    pub fn update_delivery_status(
        &self,
        remote_jid: &BareJid,
        any_id: &str,
        status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let Some(object_id) = self.resolve_message_id(remote_jid, any_id)? else {
            tracing::debug!(jid = %remote_jid, id = any_id, "delivery status update for unknown message, skipping");
            return Ok(());
        };

        self.conn().execute(
            "UPDATE messages SET delivery_status = ?2, updated_at = ?3 WHERE id = ?1",
            params![object_id, status.as_str(), timestamp.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Resolve an externally-supplied identifier to the persisted object id.
    ///
    /// Fallback chain, first match wins:
    /// 1. the id is the object id itself (accepted only when the row belongs
    ///    to the given conversation),
    /// 2. the id is the far end's `remote_object_id`,
    /// 3. the id is the client's `local_temp_id`.
    pub fn resolve_message_id(
        &self,
        remote_jid: &BareJid,
        any_id: &str,
    ) -> Result<Option<String>> {
        let direct: Option<String> = self
            .conn()
            .query_row(
                "SELECT id FROM messages WHERE id = ?1 AND remote_jid = ?2",
                params![any_id, remote_jid.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if direct.is_some() {
            return Ok(direct);
        }

        let by_remote: Option<String> = self
            .conn()
            .query_row(
                "SELECT id FROM messages
                 WHERE remote_jid = ?1 AND remote_object_id = ?2
                 ORDER BY created_at DESC LIMIT 1",
                params![remote_jid.as_str(), any_id],
                |row| row.get(0),
            )
            .optional()?;
        if by_remote.is_some() {
            return Ok(by_remote);
        }

        let by_temp: Option<String> = self
            .conn()
            .query_row(
                "SELECT id FROM messages
                 WHERE remote_jid = ?1 AND local_temp_id = ?2
                 ORDER BY created_at DESC LIMIT 1",
                params![remote_jid.as_str(), any_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(by_temp)
    }

    /// Case-insensitive substring search over message text, newest first,
    /// optionally restricted to one conversation.  Capped at 100 results.
    pub fn search_messages(
        &self,
        query: &str,
        remote_jid: Option<&BareJid>,
    ) -> Result<Vec<ChatMessageDescriptor>> {
        let query_lower = query.to_lowercase();

        let mut results = Vec::new();
        let candidates = match remote_jid {
            Some(jid) => self.load_recent(jid, 10_000)?,
            None => {
                let mut all = Vec::new();
                for (jid, _) in self.list_conversations()? {
                    all.extend(self.load_recent(&jid, 10_000)?);
                }
                // Conversations are loaded one at a time; merge newest-first.
                all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                all
            }
        };

        for descriptor in candidates {
            let haystack = if descriptor.plain_text.is_empty() {
                &descriptor.markdown
            } else {
                &descriptor.plain_text
            };
            if haystack.to_lowercase().contains(&query_lower) {
                results.push(descriptor);
            }
        }

        results.truncate(SEARCH_RESULT_LIMIT);
        Ok(results)
    }

    /// Distinct conversation partners with their last-activity timestamp,
    /// most recently active first.
    pub fn list_conversations(&self) -> Result<Vec<(BareJid, DateTime<Utc>)>> {
        let mut stmt = self.conn().prepare(
            "SELECT remote_jid, MAX(created_at) FROM messages
             GROUP BY remote_jid
             ORDER BY MAX(created_at) DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            let jid: String = row.get(0)?;
            let ts: String = row.get(1)?;
            Ok((jid, ts))
        })?;

        let mut conversations = Vec::new();
        for row in rows {
            let (jid, ts) = row?;
            let Ok(jid) = BareJid::new(jid) else {
                tracing::warn!("skipping conversation row with empty remote_jid");
                continue;
            };
            let ts = DateTime::parse_from_rfc3339(&ts)?.with_timezone(&Utc);
            conversations.push((jid, ts));
        }
        Ok(conversations)
    }

    /// Remove every message exchanged with a partner.  Returns the number
    /// of rows deleted.
    pub fn delete_conversation(&self, remote_jid: &BareJid) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages WHERE remote_jid = ?1",
            params![remote_jid.as_str()],
        )?;
        Ok(affected)
    }
}

fn collect_descriptors(
    rows: impl Iterator<Item = rusqlite::Result<MessageRecord>>,
) -> Result<Vec<ChatMessageDescriptor>> {
    let mut descriptors = Vec::new();
    for row in rows {
        descriptors.push(row?.into_descriptor()?);
    }
    Ok(descriptors)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
    let remote_jid_str: String = row.get(1)?;
    let legacy_str: Option<String> = row.get(4)?;
    let direction_str: Option<String> = row.get(5)?;
    let delivery_str: Option<String> = row.get(6)?;
    let created_str: String = row.get(13)?;
    let updated_str: String = row.get(14)?;
    let original_str: Option<String> = row.get(15)?;

    let remote_jid = BareJid::new(remote_jid_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let created_at = parse_timestamp(&created_str, 13)?;
    let updated_at = parse_timestamp(&updated_str, 14)?;
    let original_created_at = match original_str {
        Some(ts) => Some(parse_timestamp(&ts, 15)?),
        None => None,
    };

    Ok(MessageRecord {
        id: row.get(0)?,
        remote_jid,
        local_temp_id: row.get(2)?,
        remote_object_id: row.get(3)?,
        legacy_type: legacy_str.as_deref().and_then(LegacyMessageType::parse),
        direction: direction_str
            .as_deref()
            .and_then(parley_shared::Direction::parse),
        delivery_status: delivery_str.as_deref().and_then(DeliveryStatus::parse),
        markdown: row.get(7)?,
        plain_text: row.get(8)?,
        html: row.get(9)?,
        reply_to_id: row.get(10)?,
        is_edited: row.get(11)?,
        metadata_json: row.get(12)?,
        created_at,
        updated_at,
        original_created_at,
        content_fingerprint: row.get(16)?,
    })
}

fn parse_timestamp(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
