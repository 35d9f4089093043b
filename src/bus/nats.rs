//! NATS transport.
//!
//! Client-side reconnect behaviour (`max_reconnects`, `reconnect_wait`) and
//! the request timeout come from [`NatsConfig`]. When the client gives up,
//! its subscriptions end and the connection manager takes over with its own
//! rate-limited reconnect.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::bus::{BusConnection, BusConnector, Subscription};
use crate::config::NatsConfig;
use crate::error::{Result, WatcherError};

/// Connects to a NATS server.
#[derive(Debug, Clone)]
pub struct NatsConnector {
    config: NatsConfig,
}

impl NatsConnector {
    /// Create a connector for the configured server.
    pub fn new(config: NatsConfig) -> Self {
        Self { config }
    }

    fn options(&self) -> async_nats::ConnectOptions {
        let mut options = async_nats::ConnectOptions::new();

        if let Some(max_reconnects) = self.config.max_reconnects() {
            options = options.max_reconnects(max_reconnects);
        }

        if let Some(wait) = self.config.reconnect_wait() {
            options = options.reconnect_delay_callback(move |_attempts| wait);
        }

        if let Some(timeout) = self.config.request_timeout() {
            options = options.request_timeout(Some(timeout));
        }

        options
    }
}

#[async_trait]
impl BusConnector for NatsConnector {
    async fn connect(&self) -> Result<Box<dyn BusConnection>> {
        tracing::info!(url = %self.config.url, "connecting to NATS");

        let client = self
            .options()
            .connect(self.config.url.as_str())
            .await
            .map_err(|e| {
                WatcherError::Transport(format!(
                    "failed to connect to {}: {}",
                    self.config.url, e
                ))
            })?;

        Ok(Box::new(NatsConnection {
            client: Some(client),
        }))
    }
}

/// An open NATS client.
pub struct NatsConnection {
    client: Option<async_nats::Client>,
}

#[async_trait]
impl BusConnection for NatsConnection {
    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| WatcherError::Transport("connection already closed".to_string()))?;

        let subscriber = client.subscribe(subject.to_string()).await.map_err(|e| {
            WatcherError::Transport(format!("failed to subscribe to {}: {}", subject, e))
        })?;

        Ok(Box::new(NatsSubscription { subscriber }))
    }

    /// Open until [`close`](BusConnection::close) is called.
    ///
    /// async-nats has no terminal "closed" state: while disconnected the
    /// client keeps reconnecting on its own. Once it gives up, the subscriber
    /// stream ends, which stops the delivery task, and the connection manager
    /// treats the connection as lost.
    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.flush().await {
                tracing::debug!(error = %e, "flush before close failed");
            }
            // Dropping the last client handle shuts the connection down.
            drop(client);
        }
    }
}

/// A NATS subscription.
pub struct NatsSubscription {
    subscriber: async_nats::Subscriber,
}

#[async_trait]
impl Subscription for NatsSubscription {
    async fn next_message(&mut self) -> Option<Bytes> {
        self.subscriber.next().await.map(|message| message.payload)
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        self.subscriber
            .unsubscribe()
            .await
            .map_err(|e| WatcherError::Transport(format!("failed to unsubscribe: {}", e)))
    }
}
