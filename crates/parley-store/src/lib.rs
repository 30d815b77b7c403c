//! # parley-store
//!
//! Local persistence for the parley messaging core, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection` with typed CRUD helpers for message records.
//! Schema migrations and the legacy-record backfill run before the handle
//! is handed out, so callers never observe a partially migrated store.

pub mod backfill;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::MessageRecord;
