//! Persisted message record and its descriptor mapping.
//!
//! [`MessageRecord`] is the schema-bound shadow of a
//! [`ChatMessageDescriptor`]: a superset carrying the legacy type column
//! and the raw metadata JSON.  The derived columns are optional here
//! because pre-backfill rows may lack them; conversion falls back to the
//! legacy derivations in that case.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_shared::fingerprint::content_fingerprint;
use parley_shared::{
    BareJid, ChatMessageDescriptor, DeliveryStatus, Direction, LegacyMessageType,
};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub id: String,
    pub remote_jid: BareJid,
    pub local_temp_id: Option<String>,
    pub remote_object_id: Option<String>,
    pub legacy_type: Option<LegacyMessageType>,
    pub direction: Option<Direction>,
    pub delivery_status: Option<DeliveryStatus>,
    pub markdown: String,
    pub plain_text: String,
    pub html: String,
    pub reply_to_id: Option<String>,
    pub is_edited: bool,
    /// Raw metadata JSON exactly as stored.
    pub metadata_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub original_created_at: Option<DateTime<Utc>>,
    pub content_fingerprint: Option<String>,
}

impl MessageRecord {
    pub fn from_descriptor(descriptor: &ChatMessageDescriptor) -> Result<Self> {
        // Older readers still classify by legacy type, so it is written on
        // every insert and update.
        let legacy_type = match descriptor.direction {
            Direction::Outgoing => LegacyMessageType::Sent,
            Direction::Incoming | Direction::System => LegacyMessageType::Received,
        };

        Ok(Self {
            id: descriptor.message_id.clone(),
            remote_jid: descriptor.remote_jid.clone(),
            local_temp_id: descriptor.local_temp_id.clone(),
            remote_object_id: descriptor.remote_object_id.clone(),
            legacy_type: Some(legacy_type),
            direction: Some(descriptor.direction),
            delivery_status: Some(descriptor.delivery_status),
            markdown: descriptor.markdown.clone(),
            plain_text: descriptor.plain_text.clone(),
            html: descriptor.html.clone(),
            reply_to_id: descriptor.reply_to_id.clone(),
            is_edited: descriptor.is_edited,
            metadata_json: serde_json::to_string(&descriptor.metadata)?,
            created_at: descriptor.created_at,
            updated_at: descriptor.updated_at,
            original_created_at: Some(descriptor.original_created_at),
            content_fingerprint: Some(descriptor.content_fingerprint.clone()),
        })
    }

    pub fn into_descriptor(self) -> Result<ChatMessageDescriptor> {
        let metadata: BTreeMap<String, String> = if self.metadata_json.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&self.metadata_json)?
        };

        // Pre-backfill rows derive the delivery columns from the legacy
        // type, mirroring what the backfill pass would persist.
        let direction = self
            .direction
            .or_else(|| self.legacy_type.map(|t| t.direction()))
            .unwrap_or(Direction::Outgoing);
        let delivery_status = self
            .delivery_status
            .or_else(|| self.legacy_type.map(|t| t.delivery_status()))
            .unwrap_or(DeliveryStatus::Sent);
        let content_fingerprint = self.content_fingerprint.unwrap_or_else(|| {
            content_fingerprint(&self.markdown, &self.plain_text, &self.html)
        });

        Ok(ChatMessageDescriptor {
            message_id: self.id,
            remote_jid: self.remote_jid,
            local_temp_id: self.local_temp_id,
            remote_object_id: self.remote_object_id,
            direction,
            delivery_status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            original_created_at: self.original_created_at.unwrap_or(self.created_at),
            is_edited: self.is_edited,
            reply_to_id: self.reply_to_id,
            markdown: self.markdown,
            plain_text: self.plain_text,
            html: self.html,
            content_fingerprint,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_record_round_trip() {
        let jid = BareJid::new("alice@example").unwrap();
        let mut d = ChatMessageDescriptor::new_outgoing(jid, Utc::now());
        d.markdown = "**hi**".into();
        d.plain_text = "hi".into();
        d.html = "<strong>hi</strong>".into();
        d.metadata.insert("k".into(), "v".into());
        d.refresh_fingerprint();

        let record = MessageRecord::from_descriptor(&d).unwrap();
        assert_eq!(record.legacy_type, Some(LegacyMessageType::Sent));

        let back = record.into_descriptor().unwrap();
        assert_eq!(d, back);
    }

    #[test]
    fn legacy_record_without_delivery_columns_derives_them() {
        let jid = BareJid::new("alice@example").unwrap();
        let now = Utc::now();
        let record = MessageRecord {
            id: "m-1".into(),
            remote_jid: jid,
            local_temp_id: None,
            remote_object_id: None,
            legacy_type: Some(LegacyMessageType::Received),
            direction: None,
            delivery_status: None,
            markdown: String::new(),
            plain_text: "hello".into(),
            html: String::new(),
            reply_to_id: None,
            is_edited: false,
            metadata_json: String::new(),
            created_at: now,
            updated_at: now,
            original_created_at: None,
            content_fingerprint: None,
        };

        let d = record.into_descriptor().unwrap();
        assert_eq!(d.direction, Direction::Incoming);
        assert_eq!(d.delivery_status, DeliveryStatus::Received);
        assert_eq!(d.original_created_at, now);
        assert!(!d.content_fingerprint.is_empty());
    }
}
