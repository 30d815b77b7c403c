//! Transport boundary.
//!
//! The core never inspects protocol internals; it reacts to the success or
//! failure of these calls and to the inbound events the host's transport
//! loop feeds into [`ChatMessageService::handle_transport_event`].
//!
//! [`ChatMessageService::handle_transport_event`]: crate::service::ChatMessageService::handle_transport_event

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use parley_shared::{BareJid, ChatMessageDescriptor, ChatState, DeliveryStatus};

/// Errors raised by a transport implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,

    #[error("Operation timed out")]
    Timeout,

    #[error("Rejected by the far end: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport-layer payload for an outgoing message or correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundChatMessage {
    pub remote_jid: BareJid,
    pub markdown: String,
    pub plain_text: String,
    pub html: String,
    pub reply_to_id: Option<String>,
    pub local_temp_id: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl OutboundChatMessage {
    pub fn from_descriptor(descriptor: &ChatMessageDescriptor) -> Self {
        Self {
            remote_jid: descriptor.remote_jid.clone(),
            markdown: descriptor.markdown.clone(),
            plain_text: descriptor.plain_text.clone(),
            html: descriptor.html.clone(),
            reply_to_id: descriptor.reply_to_id.clone(),
            local_temp_id: descriptor.local_temp_id.clone(),
            metadata: descriptor.metadata.clone(),
        }
    }
}

/// An inbound message or edit as raised by the remote protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundChatMessage {
    pub remote_jid: BareJid,
    /// Id the far end assigned to its own message, when carried.
    pub remote_object_id: Option<String>,
    /// Plain-text body as carried on the wire.
    pub body: String,
    pub html: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<String, String>,
}

/// Events the host's transport loop delivers to the message service.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A new message arrived.
    Message(InboundChatMessage),
    /// The far end corrected a previously sent message.
    Updated(InboundChatMessage),
    /// A delivery receipt for one of our messages.
    Receipt {
        remote_jid: BareJid,
        message_id: String,
        status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    },
}

/// Outbound side of the chat protocol.
///
/// `ensure_session` blocks until the underlying connection is usable,
/// bounded by the implementation's connect timeout.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn ensure_session(&self, remote_jid: &BareJid) -> Result<(), TransportError>;

    /// Send a new message.  Returns the transport-assigned id, if any.
    async fn send(&self, message: &OutboundChatMessage) -> Result<Option<String>, TransportError>;

    /// Resend a previously sent message's content under the id the far end
    /// knows it by, signaling an edit.
    async fn send_correction(
        &self,
        remote_jid: &BareJid,
        target_id: &str,
        message: &OutboundChatMessage,
    ) -> Result<(), TransportError>;

    /// Confirm receipt of a remote message.
    async fn acknowledge(
        &self,
        remote_jid: &BareJid,
        remote_object_id: &str,
    ) -> Result<(), TransportError>;

    /// Tell the far end one of its messages has been displayed.
    async fn send_displayed_marker(
        &self,
        remote_jid: &BareJid,
        remote_object_id: &str,
    ) -> Result<(), TransportError>;

    async fn send_chat_state(
        &self,
        remote_jid: &BareJid,
        state: ChatState,
    ) -> Result<(), TransportError>;

    fn is_chat_state_supported(&self, remote_jid: &BareJid) -> bool;
}
