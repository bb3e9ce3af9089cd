//! Typed error definitions for the ticker monitor.
//!
//! Each stage of the pipeline has its own error enum so callers can apply the
//! right policy: decode failures drop one message, sink failures drop one
//! record, connect failures are surfaced to whoever owns the feed. All
//! variants implement `std::error::Error` via `thiserror`, so they integrate
//! with `anyhow::Result` in the runner.

use thiserror::Error;

/// A wire payload or wire field could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid JSON or does not match the ticker shape.
    #[error("malformed payload: {0}")]
    Payload(String),

    /// A wire-flexible integer field held something that is not a number.
    #[error("invalid integer value: {0}")]
    Integer(String),
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Payload(e.to_string())
    }
}

/// Streaming connection errors.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Endpoint parsing, TCP/TLS connect or WebSocket handshake failure.
    #[error("connect error: {0}")]
    Connect(String),

    /// `listen` was called before a successful `connect`.
    #[error("feed client is not connected")]
    NotConnected,

    /// Releasing the connection failed.
    #[error("close error: {0}")]
    Close(String),
}

/// Row-store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not obtain a connection from the pool.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The insert (or schema statement) was rejected.
    #[error("store write error: {0}")]
    Write(String),

    /// Releasing the store failed.
    #[error("store close error: {0}")]
    Close(String),
}

/// Errors reported by a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing buffered records to the file failed. The records are discarded.
    #[error("flush error: {0}")]
    Flush(String),

    /// The row-store write failed. The record is dropped.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Releasing the underlying resource failed.
    #[error("close error: {0}")]
    Close(String),

    /// The sink was already closed.
    #[error("sink is closed")]
    Closed,
}
