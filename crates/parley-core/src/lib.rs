//! # parley-core
//!
//! Orchestration layer of the parley messaging core: the message service
//! (optimistic-local-then-confirm-remote send and edit flows), the
//! per-conversation event stream, the render cache, and the transport and
//! markdown-render boundaries.
//!
//! The core is reactive: every operation runs on the caller's task, there
//! is no background scheduler.  Collaborators are constructor-injected;
//! nothing here reaches for ambient state.

pub mod error;
pub mod event_stream;
pub mod render;
pub mod render_cache;
pub mod repository;
pub mod service;
pub mod transport;

pub use error::ServiceError;
pub use event_stream::ChatEventStream;
pub use render::{html_to_plain_text, CommonMarkRenderer, MarkdownRenderer, RenderedContent};
pub use render_cache::{
    RenderCache, RenderRequest, RenderedMessage, RenderedSegment, SegmentKind,
};
pub use repository::MessageRepository;
pub use service::ChatMessageService;
pub use transport::{
    ChatTransport, InboundChatMessage, InboundEvent, OutboundChatMessage, TransportError,
};
