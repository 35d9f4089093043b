//! Error types for the S3 data watcher
//!
//! This module defines the error taxonomy shared by the bus connection
//! manager and the event pipeline, using `thiserror` for ergonomic error
//! handling.

use thiserror::Error;

/// Main error type for watcher operations
///
/// Every variant is recoverable from the point of view of the running
/// service: the caller logs it and either defers (`NotReady`), retries on the
/// next interval (`Transport`), or drops the affected message or job
/// (`Malformed`, `Spawn`).
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Reconnect requested before the rate-limit interval elapsed, or while
    /// another attempt was in flight
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Connect or subscribe failure on the message bus
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unparseable message payload or job table content
    #[error("Malformed input: {0}")]
    Malformed(String),

    /// A job process could not be started or written to
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A panic contained at a public boundary
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WatcherError {
    /// Returns true for the rate-limit signal from the connection manager.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, WatcherError::NotReady(_))
    }
}

impl From<serde_json::Error> for WatcherError {
    fn from(err: serde_json::Error) -> Self {
        WatcherError::Malformed(err.to_string())
    }
}

impl From<serde_yaml::Error> for WatcherError {
    fn from(err: serde_yaml::Error) -> Self {
        WatcherError::Malformed(err.to_string())
    }
}

/// Result type alias for watcher operations
pub type Result<T> = std::result::Result<T, WatcherError>;
