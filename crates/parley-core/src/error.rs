use thiserror::Error;

use parley_store::StoreError;

use crate::transport::TransportError;

/// Errors produced by the message service.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A required argument was empty or malformed.  Raised before any side
    /// effect and never retried automatically.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Persistence failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Dispatch failure.  By the time this surfaces the message has already
    /// been persisted with a `Failed` delivery status.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The repository lock was poisoned by a panicking writer.
    #[error("Repository lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, ServiceError>;
