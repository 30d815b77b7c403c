//! Per-conversation event batching.
//!
//! Producers (the message service, transport callbacks) append events here
//! without ever blocking on a consumer; a UI-side consumer drains a
//! conversation's queue whenever it gets around to it and still receives
//! every event in publish order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

use parley_shared::{BareJid, ChatSessionEvent};

/// In-memory FIFO queues of [`ChatSessionEvent`]s, one per conversation.
///
/// Queues for different conversations are independently ordered and never
/// interleave.  The availability signal is fan-out notification, not
/// delivery: zero or more listeners may be waiting at any time.
#[derive(Default)]
pub struct ChatEventStream {
    queues: Mutex<HashMap<BareJid, VecDeque<ChatSessionEvent>>>,
    notify: Notify,
}

impl ChatEventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the tail of its conversation's queue, creating
    /// the queue on first use, then signal availability.
    pub fn publish(&self, event: ChatSessionEvent) {
        {
            let mut queues = self.lock();
            queues
                .entry(event.remote_jid.clone())
                .or_default()
                .push_back(event);
        }
        self.notify.notify_waiters();
    }

    /// Atomically remove and return all queued events for a conversation,
    /// in FIFO order.  An untouched conversation yields an empty list.
    ///
    /// The whole queue is swapped out in one map operation under the lock,
    /// so a cancelled caller either receives everything or the queue is
    /// untouched; no event can be dequeued and then dropped.
    pub fn drain(&self, remote_jid: &BareJid) -> Vec<ChatSessionEvent> {
        self.lock()
            .remove(remote_jid)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Discard queued events without returning them.  Used when a
    /// conversation is being torn down.
    pub fn clear(&self, remote_jid: &BareJid) {
        self.lock().remove(remote_jid);
    }

    /// Number of events currently queued for a conversation.
    pub fn pending(&self, remote_jid: &BareJid) -> usize {
        self.lock().get(remote_jid).map_or(0, VecDeque::len)
    }

    /// Future that resolves at the next `publish` on any conversation.
    /// Returned (rather than awaited here) so it is registered with the
    /// notifier from the moment of creation.
    pub fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.notify.notified()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<BareJid, VecDeque<ChatSessionEvent>>> {
        // Publishing never panics while holding the lock, but a poisoned
        // queue map is still preferable to a wedged UI.
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use parley_shared::ChatSessionEventKind;

    use super::*;

    fn jid(s: &str) -> BareJid {
        BareJid::new(s).unwrap()
    }

    fn event(jid_str: &str, tag: &str) -> ChatSessionEvent {
        let mut e = ChatSessionEvent::appended(jid(jid_str), Vec::new());
        e.additional_data.insert("tag".into(), tag.into());
        e
    }

    #[test]
    fn drain_returns_events_in_publish_order() {
        let stream = ChatEventStream::new();
        stream.publish(event("alice@example", "e1"));
        stream.publish(event("alice@example", "e2"));
        stream.publish(event("alice@example", "e3"));

        let drained = stream.drain(&jid("alice@example"));
        let tags: Vec<_> = drained
            .iter()
            .map(|e| e.additional_data["tag"].as_str())
            .collect();
        assert_eq!(tags, ["e1", "e2", "e3"]);
    }

    #[test]
    fn drain_empties_the_queue() {
        let stream = ChatEventStream::new();
        stream.publish(event("alice@example", "e1"));

        assert_eq!(stream.drain(&jid("alice@example")).len(), 1);
        assert!(stream.drain(&jid("alice@example")).is_empty());
    }

    #[test]
    fn untouched_conversation_drains_empty() {
        let stream = ChatEventStream::new();
        assert!(stream.drain(&jid("nobody@example")).is_empty());
    }

    #[test]
    fn conversations_do_not_interleave() {
        let stream = ChatEventStream::new();
        stream.publish(event("alice@example", "a1"));
        stream.publish(event("bob@example", "b1"));
        stream.publish(event("alice@example", "a2"));

        let alice = stream.drain(&jid("alice@example"));
        assert_eq!(alice.len(), 2);
        assert_eq!(stream.pending(&jid("bob@example")), 1);
    }

    #[test]
    fn clear_discards_without_returning() {
        let stream = ChatEventStream::new();
        stream.publish(event("alice@example", "e1"));

        stream.clear(&jid("alice@example"));
        assert!(stream.drain(&jid("alice@example")).is_empty());
    }

    #[test]
    fn jid_case_does_not_split_queues() {
        let stream = ChatEventStream::new();
        stream.publish(event("Alice@Example", "e1"));

        let drained = stream.drain(&jid("alice@example"));
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].kind, ChatSessionEventKind::MessagesAppended);
    }

    #[tokio::test]
    async fn publish_wakes_a_waiting_consumer() {
        let stream = ChatEventStream::new();

        // A Notified future created before the publish is guaranteed to see
        // the notify_waiters call.
        let notified = stream.notified();
        stream.publish(event("alice@example", "e1"));
        notified.await;

        assert_eq!(stream.drain(&jid("alice@example")).len(), 1);
    }
}
