//! # parley-shared
//!
//! Transport-agnostic domain types for the parley messaging core: bare
//! addresses, message descriptors, session events, and the content
//! fingerprint used for change detection.
//!
//! Everything here is pure data.  Persistence lives in `parley-store` and
//! orchestration in `parley-core`.

pub mod fingerprint;
pub mod message;
pub mod types;

pub use message::{ChatMessageDescriptor, ChatSessionEvent, ChatSessionEventKind};
pub use types::{AddressError, BareJid, ChatState, DeliveryStatus, Direction, LegacyMessageType};
