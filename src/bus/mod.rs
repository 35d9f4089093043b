//! Message bus integration
//!
//! This module owns everything between the watcher and the publish/subscribe
//! bus carrying object-store notifications:
//!
//! - [`BusConnector`], [`BusConnection`] and [`Subscription`]: the transport
//!   seam. [`nats`] implements it over NATS; [`fake`] implements it in
//!   process for tests.
//! - [`MessageHandler`]: the callback receiving each raw payload.
//! - [`manager::ConnectionManager`]: the connection lifecycle with
//!   rate-limited reconnect.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bytes::Bytes;
//! use s3_data_watcher::bus::{MessageHandler, manager::ConnectionManager, nats::NatsConnector};
//! use s3_data_watcher::config::NatsConfig;
//! use s3_data_watcher::watcher::logging::ComponentLog;
//!
//! struct PrintHandler;
//!
//! #[async_trait::async_trait]
//! impl MessageHandler for PrintHandler {
//!     async fn handle(&self, payload: Bytes) -> s3_data_watcher::Result<()> {
//!         println!("received {} bytes", payload.len());
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = NatsConfig {
//!     subject: "minio.events".to_string(),
//!     ..NatsConfig::default()
//! };
//! let manager = ConnectionManager::start(
//!     Arc::new(NatsConnector::new(config.clone())),
//!     config.subject.clone(),
//!     Duration::from_secs(60),
//!     Arc::new(PrintHandler),
//!     ComponentLog::new("connection_manager"),
//! )
//! .await;
//! manager.release().await;
//! # }
//! ```

pub mod fake;
pub mod manager;
pub mod nats;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Callback for raw messages delivered on the subscription.
///
/// Messages of one subscription are handed over one at a time; the next
/// message is not delivered until `handle` returns. An error is logged by
/// the delivery task and never ends the subscription.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one raw payload.
    async fn handle(&self, payload: Bytes) -> Result<()>;
}

/// Opens connections to the bus.
#[async_trait]
pub trait BusConnector: Send + Sync {
    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::Transport` if the bus cannot be reached.
    async fn connect(&self) -> Result<Box<dyn BusConnection>>;
}

/// An open connection to the bus.
#[async_trait]
pub trait BusConnection: Send + Sync {
    /// Subscribe to `subject`.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::Transport` if the subscription is refused.
    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>>;

    /// Whether the transport still considers the connection usable.
    fn is_open(&self) -> bool;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&mut self);
}

/// An active subscription.
#[async_trait]
pub trait Subscription: Send {
    /// Next message payload, or `None` once the transport has closed the
    /// subscription.
    async fn next_message(&mut self) -> Option<Bytes>;

    /// Stop receiving messages.
    async fn unsubscribe(&mut self) -> Result<()>;
}
