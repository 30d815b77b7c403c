use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fingerprint::content_fingerprint;
use crate::types::{BareJid, DeliveryStatus, Direction};

/// In-memory, transport-agnostic representation of one chat message.
///
/// A message is addressable by up to three identifiers over its lifetime:
/// `message_id` (the persisted object id once saved, a local temporary id
/// before), `local_temp_id` (client-generated correlation id that survives
/// id renaming), and `remote_object_id` (assigned by the far end once it
/// acknowledges the message).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageDescriptor {
    pub message_id: String,
    pub remote_jid: BareJid,
    pub local_temp_id: Option<String>,
    pub remote_object_id: Option<String>,
    pub direction: Direction,
    pub delivery_status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// First-ever creation time, preserved across edits.
    pub original_created_at: DateTime<Utc>,
    pub is_edited: bool,
    pub reply_to_id: Option<String>,
    pub markdown: String,
    pub plain_text: String,
    pub html: String,
    /// Content hash; empty until computed, recomputed whenever any of the
    /// three content renderings changes.
    pub content_fingerprint: String,
    /// Open key/value map, opaque to the core.
    pub metadata: BTreeMap<String, String>,
}

impl ChatMessageDescriptor {
    /// A fresh outgoing message, not yet persisted.  `message_id` starts out
    /// as the local temporary id and is replaced by the store on save.
    pub fn new_outgoing(remote_jid: BareJid, now: DateTime<Utc>) -> Self {
        let temp_id = Uuid::new_v4().to_string();
        Self {
            message_id: temp_id.clone(),
            remote_jid,
            local_temp_id: Some(temp_id),
            remote_object_id: None,
            direction: Direction::Outgoing,
            delivery_status: DeliveryStatus::Pending,
            created_at: now,
            updated_at: now,
            original_created_at: now,
            is_edited: false,
            reply_to_id: None,
            markdown: String::new(),
            plain_text: String::new(),
            html: String::new(),
            content_fingerprint: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// A fresh incoming message as raised by the transport.  No correlation
    /// id: those only exist for locally originated messages.
    pub fn new_incoming(remote_jid: BareJid, received_at: DateTime<Utc>) -> Self {
        Self {
            local_temp_id: None,
            direction: Direction::Incoming,
            delivery_status: DeliveryStatus::Received,
            ..Self::new_outgoing(remote_jid, received_at)
        }
    }

    /// True once at least one content rendering is non-empty.
    pub fn has_content(&self) -> bool {
        !self.markdown.is_empty() || !self.plain_text.is_empty() || !self.html.is_empty()
    }

    /// Recompute the fingerprint from the current content renderings.
    pub fn refresh_fingerprint(&mut self) {
        self.content_fingerprint =
            content_fingerprint(&self.markdown, &self.plain_text, &self.html);
    }

    pub fn ensure_local_temp_id(&mut self) {
        if self.local_temp_id.is_none() {
            self.local_temp_id = Some(Uuid::new_v4().to_string());
        }
    }

    /// Identifier the far end knows this message by, used when dispatching a
    /// correction: the acknowledged remote id when present, else the
    /// correlation id, else the persisted id.
    pub fn correction_target_id(&self) -> &str {
        self.remote_object_id
            .as_deref()
            .or(self.local_temp_id.as_deref())
            .unwrap_or(&self.message_id)
    }
}

/// What a [`ChatSessionEvent`] announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatSessionEventKind {
    MessagesAppended,
    MessageUpdated,
    DeliveryReceipt,
}

/// One entry in a conversation's event queue, produced by the message
/// service and drained by a UI-side consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSessionEvent {
    pub kind: ChatSessionEventKind,
    pub remote_jid: BareJid,
    pub messages: Vec<ChatMessageDescriptor>,
    pub additional_data: BTreeMap<String, String>,
}

impl ChatSessionEvent {
    pub fn appended(remote_jid: BareJid, messages: Vec<ChatMessageDescriptor>) -> Self {
        Self {
            kind: ChatSessionEventKind::MessagesAppended,
            remote_jid,
            messages,
            additional_data: BTreeMap::new(),
        }
    }

    pub fn updated(remote_jid: BareJid, message: ChatMessageDescriptor) -> Self {
        Self {
            kind: ChatSessionEventKind::MessageUpdated,
            remote_jid,
            messages: vec![message],
            additional_data: BTreeMap::new(),
        }
    }

    pub fn delivery_receipt(
        remote_jid: BareJid,
        additional_data: BTreeMap<String, String>,
    ) -> Self {
        Self {
            kind: ChatSessionEventKind::DeliveryReceipt,
            remote_jid,
            messages: Vec::new(),
            additional_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jid(s: &str) -> BareJid {
        BareJid::new(s).unwrap()
    }

    #[test]
    fn new_outgoing_starts_pending_with_temp_id() {
        let d = ChatMessageDescriptor::new_outgoing(jid("alice@example"), Utc::now());

        assert_eq!(d.direction, Direction::Outgoing);
        assert_eq!(d.delivery_status, DeliveryStatus::Pending);
        assert_eq!(d.local_temp_id.as_deref(), Some(d.message_id.as_str()));
        assert_eq!(d.created_at, d.original_created_at);
        assert!(!d.is_edited);
        assert!(!d.has_content());
    }

    #[test]
    fn refresh_fingerprint_tracks_content() {
        let mut d = ChatMessageDescriptor::new_outgoing(jid("alice@example"), Utc::now());
        d.markdown = "**hi**".into();
        d.plain_text = "hi".into();
        d.refresh_fingerprint();
        let first = d.content_fingerprint.clone();

        d.plain_text = "bye".into();
        d.refresh_fingerprint();

        assert!(!first.is_empty());
        assert_ne!(first, d.content_fingerprint);
    }

    #[test]
    fn correction_target_prefers_remote_object_id() {
        let mut d = ChatMessageDescriptor::new_outgoing(jid("alice@example"), Utc::now());
        d.local_temp_id = Some("temp-1".into());
        assert_eq!(d.correction_target_id(), "temp-1");

        d.remote_object_id = Some("remote-9".into());
        assert_eq!(d.correction_target_id(), "remote-9");
    }

    #[test]
    fn descriptor_serde_round_trip() {
        let mut d = ChatMessageDescriptor::new_outgoing(jid("alice@example"), Utc::now());
        d.markdown = "hello".into();
        d.metadata.insert("origin".into(), "test".into());

        let json = serde_json::to_string(&d).unwrap();
        let back: ChatMessageDescriptor = serde_json::from_str(&json).unwrap();

        assert_eq!(d, back);
    }
}
