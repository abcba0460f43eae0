//! Error types for rmq
//!
//! Two layers: `StoreError` for backing-store transport failures, and
//! `RmqError` for everything the protocol can report on top of them
//! (settling a delivery twice, double consumption, post-condition
//! violations).

use thiserror::Error;

/// Backing-store transport and protocol errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not reach the store at all
    #[error("failed to connect to backing store at '{url}': {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// A store command failed
    #[error("backing store error: {0}")]
    Redis(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Redis(err.to_string())
    }
}

/// Top-level error type for rmq
#[derive(Error, Debug)]
pub enum RmqError {
    /// Backing-store failure surfaced by a one-shot operation
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The delivery was already acked or rejected
    #[error("delivery was already acked or rejected")]
    AlreadySettled,

    /// `prepare_consumption` was called twice on the same queue
    #[error("queue '{queue}' is already consuming")]
    AlreadyConsuming { queue: String },

    /// An unacked list still held deliveries after a full repatriation
    #[error("unacked list '{key}' still holds {remaining} deliveries after returning")]
    UnackedRemain { key: String, remaining: i64 },

    /// Rejected configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RmqError>;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
