//! Message orchestration: the only write path for outgoing content.
//!
//! Sending is optimistic-local-then-confirm-remote: the message is
//! persisted and announced before the transport is asked to deliver it,
//! then reconciled to `Sent` or `Failed` with a delivery-receipt event
//! either way.  A failed dispatch leaves a durable, inspectable record and
//! re-raises the transport error to the caller.
//!
//! The service assumes a single writer per message id; concurrent edits of
//! the same message from two call sites are outside its contract.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use parley_shared::{
    BareJid, ChatMessageDescriptor, ChatSessionEvent, ChatState, DeliveryStatus,
};

use crate::error::{Result, ServiceError};
use crate::event_stream::ChatEventStream;
use crate::render::{html_to_plain_text, MarkdownRenderer};
use crate::render_cache::RenderCache;
use crate::repository::MessageRepository;
use crate::transport::{
    ChatTransport, InboundChatMessage, InboundEvent, OutboundChatMessage, TransportError,
};

/// Orchestrates sending, editing, and inbound reconciliation of chat
/// messages.  All collaborators are constructor-injected.
pub struct ChatMessageService {
    repository: Mutex<Box<dyn MessageRepository>>,
    transport: Arc<dyn ChatTransport>,
    events: Arc<ChatEventStream>,
    renderer: Arc<dyn MarkdownRenderer>,
    render_cache: Arc<RenderCache>,
}

impl ChatMessageService {
    pub fn new(
        repository: Box<dyn MessageRepository>,
        transport: Arc<dyn ChatTransport>,
        events: Arc<ChatEventStream>,
        renderer: Arc<dyn MarkdownRenderer>,
        render_cache: Arc<RenderCache>,
    ) -> Self {
        Self {
            repository: Mutex::new(repository),
            transport,
            events,
            renderer,
            render_cache,
        }
    }

    /// Send new markdown content, or edit an earlier message when
    /// `replace_message_id` resolves to one.
    ///
    /// The returned descriptor reflects the post-dispatch state
    /// (`DeliveryStatus::Sent` plus any transport-assigned remote id).  On
    /// dispatch failure the error is re-raised after the record has been
    /// persisted as `Failed`.
    pub async fn send_markdown(
        &self,
        remote_jid: &BareJid,
        markdown: &str,
        reply_to_id: Option<&str>,
        replace_message_id: Option<&str>,
    ) -> Result<ChatMessageDescriptor> {
        if markdown.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("markdown must not be empty"));
        }

        let rendered = self.renderer.render_markdown(markdown);
        // Always keep a non-empty human-readable fallback.
        let plain_text = if rendered.plain_text.trim().is_empty() {
            markdown.to_string()
        } else {
            rendered.plain_text
        };

        let now = Utc::now();
        let existing = match replace_message_id {
            Some(id) => self.repo()?.get(remote_jid, id)?,
            None => None,
        };

        let (mut descriptor, is_correction) = match existing {
            Some(mut d) => {
                d.markdown = markdown.to_string();
                d.plain_text = plain_text;
                d.html = rendered.html;
                d.updated_at = now;
                d.is_edited = true;
                d.reply_to_id = reply_to_id.map(str::to_string);
                d.delivery_status = DeliveryStatus::Pending;
                // Recomputed on persist, after the content settles.
                d.content_fingerprint.clear();
                d.ensure_local_temp_id();

                self.repo()?.replace(&mut d)?;
                self.render_cache.invalidate(&d.message_id);
                self.events
                    .publish(ChatSessionEvent::updated(remote_jid.clone(), d.clone()));

                tracing::debug!(jid = %remote_jid, id = %d.message_id, "message edited locally");
                (d, true)
            }
            None => {
                let mut d = ChatMessageDescriptor::new_outgoing(remote_jid.clone(), now);
                d.markdown = markdown.to_string();
                d.plain_text = plain_text;
                d.html = rendered.html;
                d.reply_to_id = reply_to_id.map(str::to_string);

                self.repo()?.save(&mut d)?;
                self.events.publish(ChatSessionEvent::appended(
                    remote_jid.clone(),
                    vec![d.clone()],
                ));

                tracing::debug!(jid = %remote_jid, id = %d.message_id, "message appended locally");
                (d, false)
            }
        };

        self.dispatch_outbound(&mut descriptor, is_correction)
            .await?;
        Ok(descriptor)
    }

    /// Feed one inbound transport event through storage and the event
    /// stream.
    pub async fn handle_transport_event(&self, event: InboundEvent) -> Result<()> {
        match event {
            InboundEvent::Message(message) => self.handle_inbound_message(message).await,
            InboundEvent::Updated(message) => self.handle_inbound_update(message),
            InboundEvent::Receipt {
                remote_jid,
                message_id,
                status,
                timestamp,
            } => {
                self.repo()?
                    .update_delivery_status(&remote_jid, &message_id, status, timestamp)?;

                let mut data = BTreeMap::new();
                data.insert("message_id".to_string(), message_id);
                data.insert("delivery_status".to_string(), status.as_str().to_string());
                self.events
                    .publish(ChatSessionEvent::delivery_receipt(remote_jid, data));
                Ok(())
            }
        }
    }

    /// Mark a remote message as displayed locally and tell the far end.
    /// The local update always lands; the marker is best-effort.
    pub async fn mark_displayed(&self, remote_jid: &BareJid, message_id: &str) -> Result<()> {
        let Some(descriptor) = self.repo()?.get(remote_jid, message_id)? else {
            return Ok(());
        };

        let now = Utc::now();
        self.repo()?
            .update_delivery_status(remote_jid, message_id, DeliveryStatus::Displayed, now)?;

        let mut data = BTreeMap::new();
        data.insert("message_id".to_string(), descriptor.message_id.clone());
        data.insert(
            "delivery_status".to_string(),
            DeliveryStatus::Displayed.as_str().to_string(),
        );
        self.events
            .publish(ChatSessionEvent::delivery_receipt(remote_jid.clone(), data));

        if let Some(remote_object_id) = &descriptor.remote_object_id {
            if let Err(error) = self
                .transport
                .send_displayed_marker(remote_jid, remote_object_id)
                .await
            {
                tracing::warn!(jid = %remote_jid, error = %error, "failed to send displayed marker");
            }
        }
        Ok(())
    }

    /// Forward a typing/attention indicator when the far end supports it.
    pub async fn set_chat_state(&self, remote_jid: &BareJid, state: ChatState) -> Result<()> {
        if !self.transport.is_chat_state_supported(remote_jid) {
            return Ok(());
        }
        self.transport.send_chat_state(remote_jid, state).await?;
        Ok(())
    }

    /// Newest-first page of a conversation's history.
    pub fn load_recent(
        &self,
        remote_jid: &BareJid,
        page_size: i64,
    ) -> Result<Vec<ChatMessageDescriptor>> {
        Ok(self.repo()?.load_recent(remote_jid, page_size)?)
    }

    /// Backward pagination past `before`.
    pub fn load_older(
        &self,
        remote_jid: &BareJid,
        before: DateTime<Utc>,
        page_size: i64,
    ) -> Result<Vec<ChatMessageDescriptor>> {
        Ok(self.repo()?.load_older(remote_jid, before, page_size)?)
    }

    /// Load one message by any of its identifiers.
    pub fn get(
        &self,
        remote_jid: &BareJid,
        any_id: &str,
    ) -> Result<Option<ChatMessageDescriptor>> {
        Ok(self.repo()?.get(remote_jid, any_id)?)
    }

    async fn handle_inbound_message(&self, message: InboundChatMessage) -> Result<()> {
        let now = Utc::now();
        let mut descriptor =
            ChatMessageDescriptor::new_incoming(message.remote_jid.clone(), message.timestamp.unwrap_or(now));
        descriptor.remote_object_id = message.remote_object_id.clone();
        descriptor.html = message.html.clone().unwrap_or_default();
        descriptor.plain_text = if message.body.is_empty() {
            html_to_plain_text(&descriptor.html)
        } else {
            message.body.clone()
        };
        descriptor.metadata = message.metadata.clone();

        self.repo()?.save(&mut descriptor)?;
        self.events.publish(ChatSessionEvent::appended(
            message.remote_jid.clone(),
            vec![descriptor],
        ));

        if let Some(remote_object_id) = &message.remote_object_id {
            if let Err(error) = self
                .transport
                .acknowledge(&message.remote_jid, remote_object_id)
                .await
            {
                tracing::warn!(jid = %message.remote_jid, error = %error, "failed to acknowledge inbound message");
            }
        }
        Ok(())
    }

    fn handle_inbound_update(&self, message: InboundChatMessage) -> Result<()> {
        let Some(target_id) = message.remote_object_id.clone() else {
            // A correction without a target degenerates to a fresh message;
            // persist it rather than drop it.
            let mut descriptor =
                ChatMessageDescriptor::new_incoming(message.remote_jid.clone(), Utc::now());
            descriptor.plain_text = message.body;
            descriptor.html = message.html.unwrap_or_default();
            descriptor.metadata = message.metadata;
            self.repo()?.save(&mut descriptor)?;
            self.events.publish(ChatSessionEvent::appended(
                message.remote_jid.clone(),
                vec![descriptor],
            ));
            return Ok(());
        };

        let existing = self.repo()?.get(&message.remote_jid, &target_id)?;
        match existing {
            Some(mut d) => {
                d.plain_text = message.body;
                d.html = message.html.unwrap_or_default();
                d.updated_at = message.timestamp.unwrap_or_else(Utc::now);
                d.is_edited = true;
                d.content_fingerprint.clear();

                self.repo()?.replace(&mut d)?;
                self.render_cache.invalidate(&d.message_id);
                self.events
                    .publish(ChatSessionEvent::updated(message.remote_jid, d));
                Ok(())
            }
            None => {
                // Unknown edit target: treat as a new arrival.
                let mut d = ChatMessageDescriptor::new_incoming(
                    message.remote_jid.clone(),
                    message.timestamp.unwrap_or_else(Utc::now),
                );
                d.remote_object_id = Some(target_id);
                d.plain_text = message.body;
                d.html = message.html.unwrap_or_default();
                d.metadata = message.metadata;
                self.repo()?.save(&mut d)?;
                self.events
                    .publish(ChatSessionEvent::appended(message.remote_jid, vec![d]));
                Ok(())
            }
        }
    }

    /// Shared dispatch tail of both send paths: deliver over the
    /// transport, then reconcile the durable record and publish a
    /// delivery-receipt event.
    async fn dispatch_outbound(
        &self,
        descriptor: &mut ChatMessageDescriptor,
        is_correction: bool,
    ) -> Result<()> {
        let outbound = OutboundChatMessage::from_descriptor(descriptor);

        let send_result: std::result::Result<Option<String>, TransportError> = async {
            self.transport
                .ensure_session(&descriptor.remote_jid)
                .await?;
            if is_correction {
                let target_id = descriptor.correction_target_id().to_string();
                self.transport
                    .send_correction(&descriptor.remote_jid, &target_id, &outbound)
                    .await?;
                Ok(None)
            } else {
                self.transport.send(&outbound).await
            }
        }
        .await;

        let now = Utc::now();
        match send_result {
            Ok(remote_id) => {
                if let Some(remote_id) = remote_id.filter(|id| !id.is_empty()) {
                    descriptor.remote_object_id = Some(remote_id);
                }
                descriptor.delivery_status = DeliveryStatus::Sent;
                descriptor.updated_at = now;
                self.repo()?.replace(descriptor)?;

                self.events.publish(ChatSessionEvent::delivery_receipt(
                    descriptor.remote_jid.clone(),
                    receipt_data(descriptor, None),
                ));
                tracing::debug!(jid = %descriptor.remote_jid, id = %descriptor.message_id, "message dispatched");
                Ok(())
            }
            Err(error) => {
                descriptor.delivery_status = DeliveryStatus::Failed;
                descriptor.updated_at = now;
                self.repo()?.replace(descriptor)?;

                self.events.publish(ChatSessionEvent::delivery_receipt(
                    descriptor.remote_jid.clone(),
                    receipt_data(descriptor, Some(&error)),
                ));
                tracing::warn!(jid = %descriptor.remote_jid, id = %descriptor.message_id, error = %error, "message dispatch failed");
                Err(error.into())
            }
        }
    }

    fn repo(&self) -> Result<MutexGuard<'_, Box<dyn MessageRepository>>> {
        self.repository
            .lock()
            .map_err(|_| ServiceError::LockPoisoned)
    }
}

fn receipt_data(
    descriptor: &ChatMessageDescriptor,
    error: Option<&TransportError>,
) -> BTreeMap<String, String> {
    let mut data = BTreeMap::new();
    data.insert("message_id".to_string(), descriptor.message_id.clone());
    if let Some(local_temp_id) = &descriptor.local_temp_id {
        data.insert("local_temp_id".to_string(), local_temp_id.clone());
    }
    data.insert(
        "delivery_status".to_string(),
        descriptor.delivery_status.as_str().to_string(),
    );
    if let Some(error) = error {
        data.insert("error".to_string(), error.to_string());
    }
    data
}
