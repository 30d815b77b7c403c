//! Repository port for message persistence.
//!
//! The message service talks to storage through this trait so tests and
//! alternative hosts can substitute their own store.  The port is
//! synchronous: the reference implementation is SQLite via `parley-store`,
//! and callers that need off-thread I/O wrap calls in `spawn_blocking`.

use chrono::{DateTime, Utc};

use parley_shared::{BareJid, ChatMessageDescriptor, DeliveryStatus};
use parley_store::{Database, StoreError};

pub type RepositoryResult<T> = Result<T, StoreError>;

/// Port for durable message state.
///
/// Implementations must uphold:
/// - `save` assigns the persisted object id and writes it back into the
///   descriptor;
/// - id-targeted operations resolve any of the three message identifiers
///   (object id, remote object id, local temp id);
/// - `update_delivery_status` is a silent no-op for unresolvable ids.
pub trait MessageRepository: Send {
    fn load_recent(
        &self,
        remote_jid: &BareJid,
        page_size: i64,
    ) -> RepositoryResult<Vec<ChatMessageDescriptor>>;

    fn load_older(
        &self,
        remote_jid: &BareJid,
        before: DateTime<Utc>,
        page_size: i64,
    ) -> RepositoryResult<Vec<ChatMessageDescriptor>>;

    fn save(&self, descriptor: &mut ChatMessageDescriptor) -> RepositoryResult<()>;

    fn replace(&self, descriptor: &mut ChatMessageDescriptor) -> RepositoryResult<()>;

    fn update_delivery_status(
        &self,
        remote_jid: &BareJid,
        any_id: &str,
        status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    fn get(
        &self,
        remote_jid: &BareJid,
        any_id: &str,
    ) -> RepositoryResult<Option<ChatMessageDescriptor>>;

    fn delete(&self, remote_jid: &BareJid, any_id: &str) -> RepositoryResult<bool>;
}

impl MessageRepository for Database {
    fn load_recent(
        &self,
        remote_jid: &BareJid,
        page_size: i64,
    ) -> RepositoryResult<Vec<ChatMessageDescriptor>> {
        Database::load_recent(self, remote_jid, page_size)
    }

    fn load_older(
        &self,
        remote_jid: &BareJid,
        before: DateTime<Utc>,
        page_size: i64,
    ) -> RepositoryResult<Vec<ChatMessageDescriptor>> {
        Database::load_older(self, remote_jid, before, page_size)
    }

    fn save(&self, descriptor: &mut ChatMessageDescriptor) -> RepositoryResult<()> {
        Database::save(self, descriptor)
    }

    fn replace(&self, descriptor: &mut ChatMessageDescriptor) -> RepositoryResult<()> {
        Database::replace(self, descriptor)
    }

    fn update_delivery_status(
        &self,
        remote_jid: &BareJid,
        any_id: &str,
        status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        Database::update_delivery_status(self, remote_jid, any_id, status, timestamp)
    }

    fn get(
        &self,
        remote_jid: &BareJid,
        any_id: &str,
    ) -> RepositoryResult<Option<ChatMessageDescriptor>> {
        Database::get(self, remote_jid, any_id)
    }

    fn delete(&self, remote_jid: &BareJid, any_id: &str) -> RepositoryResult<bool> {
        Database::delete(self, remote_jid, any_id)
    }
}
