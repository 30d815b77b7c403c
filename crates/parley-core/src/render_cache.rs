//! Memoized message rendering.
//!
//! Rendering a message's content into UI-agnostic segments is repeated for
//! every scroll-through of a conversation; the cache serves each
//! `(message id, content fingerprint)` pair at most once computed.  A
//! content change yields a new fingerprint and therefore a new key, so
//! entries are immutable once created.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use parley_shared::ChatMessageDescriptor;

use crate::render::{html_to_plain_text, MarkdownRenderer};

/// Default number of cached renders before strict-LRU eviction kicks in.
pub const DEFAULT_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Text,
    Block,
}

/// One ordered piece of a rendered message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedSegment {
    pub kind: SegmentKind,
    pub value: String,
    pub attributes: BTreeMap<String, String>,
}

impl RenderedSegment {
    fn text(value: String) -> Self {
        Self {
            kind: SegmentKind::Text,
            value,
            attributes: BTreeMap::new(),
        }
    }

    fn block(value: String) -> Self {
        Self {
            kind: SegmentKind::Block,
            value,
            attributes: BTreeMap::new(),
        }
    }
}

/// Cached result of rendering one message's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub segments: Vec<RenderedSegment>,
    /// Locale the segments were rendered under.
    pub locale: String,
}

/// What to render.  Content precedence: markdown, then HTML, then plain
/// text passthrough.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub message_id: String,
    pub content_fingerprint: String,
    pub markdown: String,
    pub html: String,
    pub plain_text: String,
    pub locale: String,
}

impl RenderRequest {
    pub fn from_descriptor(descriptor: &ChatMessageDescriptor, locale: impl Into<String>) -> Self {
        Self {
            message_id: descriptor.message_id.clone(),
            content_fingerprint: descriptor.content_fingerprint.clone(),
            markdown: descriptor.markdown.clone(),
            html: descriptor.html.clone(),
            plain_text: descriptor.plain_text.clone(),
            locale: locale.into(),
        }
    }
}

struct CacheSlot {
    result: RenderedMessage,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<String, CacheSlot>,
    clock: u64,
}

/// Bounded render memo with strict LRU eviction.
///
/// The mutex guards only the slot map; rendering happens outside the
/// critical section.
pub struct RenderCache {
    renderer: Arc<dyn MarkdownRenderer>,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl RenderCache {
    pub fn new(renderer: Arc<dyn MarkdownRenderer>) -> Self {
        Self::with_capacity(renderer, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(renderer: Arc<dyn MarkdownRenderer>, capacity: usize) -> Self {
        Self {
            renderer,
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Serve the rendering for a request, computing it on first sight.
    /// Both hits and fresh inserts count as a use for LRU purposes.
    pub fn render(&self, request: &RenderRequest) -> RenderedMessage {
        let key = cache_key(&request.message_id, &request.content_fingerprint);
        if let Some(hit) = self.probe(&key) {
            return hit;
        }

        let result = self.render_uncached(request);

        let mut state = self.lock();
        state.clock += 1;
        let stamp = state.clock;
        state.slots.insert(
            key,
            CacheSlot {
                result: result.clone(),
                last_used: stamp,
            },
        );

        while state.slots.len() > self.capacity {
            let Some(oldest) = state
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            state.slots.remove(&oldest);
        }

        result
    }

    /// Read-only probe with the same promotion-on-hit behavior as
    /// [`RenderCache::render`].
    pub fn try_get_cached(
        &self,
        message_id: &str,
        content_fingerprint: &str,
    ) -> Option<RenderedMessage> {
        self.probe(&cache_key(message_id, content_fingerprint))
    }

    /// Remove every cached entry for a message regardless of fingerprint.
    /// A confirmed edit naturally misses the cache under its new
    /// fingerprint; this cleans up orphaned prior-fingerprint entries.
    pub fn invalidate(&self, message_id: &str) -> usize {
        let prefix = cache_key(message_id, "");
        let mut state = self.lock();
        let before = state.slots.len();
        state.slots.retain(|key, _| !key.starts_with(&prefix));
        before - state.slots.len()
    }

    /// Number of live cache entries.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn probe(&self, key: &str) -> Option<RenderedMessage> {
        let mut state = self.lock();
        state.clock += 1;
        let stamp = state.clock;
        let slot = state.slots.get_mut(key)?;
        slot.last_used = stamp;
        Some(slot.result.clone())
    }

    fn render_uncached(&self, request: &RenderRequest) -> RenderedMessage {
        let (html, plain_text) = if !request.markdown.trim().is_empty() {
            let rendered = self.renderer.render_markdown(&request.markdown);
            let plain = if rendered.plain_text.trim().is_empty() {
                request.markdown.clone()
            } else {
                rendered.plain_text
            };
            (rendered.html, plain)
        } else if !request.html.trim().is_empty() {
            (request.html.clone(), html_to_plain_text(&request.html))
        } else {
            (String::new(), request.plain_text.clone())
        };

        let mut segments = Vec::new();
        if !html.is_empty() {
            segments.push(RenderedSegment::block(html));
        }
        if !plain_text.is_empty() {
            segments.push(RenderedSegment::text(plain_text));
        }
        if segments.is_empty() {
            segments.push(RenderedSegment::text(String::new()));
        }

        RenderedMessage {
            segments,
            locale: request.locale.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn cache_key(message_id: &str, content_fingerprint: &str) -> String {
    format!("{message_id}:{content_fingerprint}")
}

#[cfg(test)]
mod tests {
    use crate::render::CommonMarkRenderer;

    use super::*;

    fn cache(capacity: usize) -> RenderCache {
        RenderCache::with_capacity(Arc::new(CommonMarkRenderer), capacity)
    }

    fn plain_request(id: &str, fingerprint: &str, text: &str) -> RenderRequest {
        RenderRequest {
            message_id: id.into(),
            content_fingerprint: fingerprint.into(),
            markdown: String::new(),
            html: String::new(),
            plain_text: text.into(),
            locale: "en-US".into(),
        }
    }

    #[test]
    fn markdown_render_produces_block_then_text() {
        let cache = cache(8);
        let request = RenderRequest {
            message_id: "m-1".into(),
            content_fingerprint: "fp-1".into(),
            markdown: "**hi**".into(),
            html: String::new(),
            plain_text: String::new(),
            locale: "en-US".into(),
        };

        let rendered = cache.render(&request);

        assert_eq!(rendered.segments.len(), 2);
        assert_eq!(rendered.segments[0].kind, SegmentKind::Block);
        assert!(rendered.segments[0].value.contains("<strong>hi</strong>"));
        assert_eq!(rendered.segments[1].kind, SegmentKind::Text);
        assert_eq!(rendered.segments[1].value, "hi");
        assert_eq!(rendered.locale, "en-US");
    }

    #[test]
    fn html_only_content_is_tag_stripped_for_text() {
        let cache = cache(8);
        let request = RenderRequest {
            message_id: "m-1".into(),
            content_fingerprint: "fp-1".into(),
            markdown: String::new(),
            html: "<p>fish &amp; chips</p>".into(),
            plain_text: String::new(),
            locale: "en-US".into(),
        };

        let rendered = cache.render(&request);

        assert_eq!(rendered.segments[0].kind, SegmentKind::Block);
        assert_eq!(rendered.segments[1].value, "fish & chips");
    }

    #[test]
    fn empty_content_yields_one_empty_text_segment() {
        let cache = cache(8);
        let rendered = cache.render(&plain_request("m-1", "fp-1", ""));

        assert_eq!(rendered.segments.len(), 1);
        assert_eq!(rendered.segments[0].kind, SegmentKind::Text);
        assert!(rendered.segments[0].value.is_empty());
    }

    #[test]
    fn repeated_render_is_served_from_cache() {
        let cache = cache(8);
        let request = plain_request("m-1", "fp-1", "hello");

        let first = cache.render(&request);
        let second = cache.render(&request);

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn filling_past_capacity_evicts_the_least_recently_used() {
        let cache = cache(128);
        for i in 0..128 {
            cache.render(&plain_request(&format!("m-{i}"), "fp", "x"));
        }
        assert_eq!(cache.len(), 128);

        // Touch the would-be victim so eviction falls on the next oldest.
        assert!(cache.try_get_cached("m-0", "fp").is_some());

        cache.render(&plain_request("m-128", "fp", "x"));

        assert_eq!(cache.len(), 128);
        assert!(cache.try_get_cached("m-0", "fp").is_some());
        assert!(cache.try_get_cached("m-1", "fp").is_none());
        assert!(cache.try_get_cached("m-128", "fp").is_some());
    }

    #[test]
    fn invalidate_drops_all_fingerprints_for_a_message() {
        let cache = cache(8);
        cache.render(&plain_request("m-1", "fp-old", "old"));
        cache.render(&plain_request("m-1", "fp-new", "new"));
        cache.render(&plain_request("m-2", "fp", "other"));

        assert_eq!(cache.invalidate("m-1"), 2);
        assert!(cache.try_get_cached("m-1", "fp-old").is_none());
        assert!(cache.try_get_cached("m-1", "fp-new").is_none());
        assert!(cache.try_get_cached("m-2", "fp").is_some());
    }

    #[test]
    fn blank_plain_render_falls_back_to_raw_markdown() {
        let cache = cache(8);
        let request = RenderRequest {
            message_id: "m-1".into(),
            content_fingerprint: "fp-1".into(),
            // An image-only message has no text content of its own.
            markdown: "![](https://example.org/cat.png)".into(),
            html: String::new(),
            plain_text: String::new(),
            locale: "en-US".into(),
        };

        let rendered = cache.render(&request);
        let text = rendered
            .segments
            .iter()
            .find(|s| s.kind == SegmentKind::Text)
            .unwrap();
        assert_eq!(text.value, "![](https://example.org/cat.png)");
    }
}
