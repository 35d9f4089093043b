//! Connection lifecycle with rate-limited reconnect
//!
//! [`ConnectionManager`] owns at most one connection and one subscription.
//! Connecting and subscribing form a single unit: a subscribe failure closes
//! the fresh connection again. Connect attempts are spaced at least one
//! reconnect interval apart, whether or not the previous attempt succeeded,
//! and a call arriving while another attempt is in flight returns
//! `WatcherError::NotReady` instead of waiting.
//!
//! Messages are delivered by a background task that hands each payload to the
//! [`MessageHandler`] in arrival order. A panicking or failing handler is
//! logged and delivery continues with the next message.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::bus::{BusConnection, BusConnector, MessageHandler, Subscription};
use crate::error::{Result, WatcherError};
use crate::watcher::guard::contain;
use crate::watcher::logging::ComponentLog;

/// Connection state as seen by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in flight
    Disconnected,
    /// An attempt is in flight
    Connecting,
    /// Connected and subscribed
    Connected,
}

struct Delivery {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    state: ConnectionState,
    last_attempt: Option<Instant>,
    connection: Option<Box<dyn BusConnection>>,
    delivery: Option<Delivery>,
}

impl Inner {
    fn is_live(&self) -> bool {
        let connection_open = self
            .connection
            .as_ref()
            .is_some_and(|connection| connection.is_open());
        let delivering = self
            .delivery
            .as_ref()
            .is_some_and(|delivery| !delivery.handle.is_finished());

        self.state == ConnectionState::Connected && connection_open && delivering
    }
}

/// Owns the bus connection and its subscription.
pub struct ConnectionManager {
    connector: Arc<dyn BusConnector>,
    subject: String,
    reconnect_interval: Duration,
    handler: Arc<dyn MessageHandler>,
    inner: Mutex<Inner>,
    log: ComponentLog,
}

impl ConnectionManager {
    /// Create a manager without connecting.
    pub fn new(
        connector: Arc<dyn BusConnector>,
        subject: String,
        reconnect_interval: Duration,
        handler: Arc<dyn MessageHandler>,
        log: ComponentLog,
    ) -> Self {
        Self {
            connector,
            subject,
            reconnect_interval,
            handler,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                last_attempt: None,
                connection: None,
                delivery: None,
            }),
            log,
        }
    }

    /// Create a manager and make the first connect attempt.
    ///
    /// A failed first attempt is logged and left to the periodic
    /// [`ensure_connected`](Self::ensure_connected) calls to recover from.
    pub async fn start(
        connector: Arc<dyn BusConnector>,
        subject: String,
        reconnect_interval: Duration,
        handler: Arc<dyn MessageHandler>,
        log: ComponentLog,
    ) -> Self {
        let manager = Self::new(connector, subject, reconnect_interval, handler, log);

        if let Err(e) = manager.ensure_connected().await {
            tracing::warn!(
                subject = %manager.subject,
                error = %e,
                "initial connection failed, will retry"
            );
        }

        manager
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Subject the manager subscribes to.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Make sure a live connection and subscription exist.
    ///
    /// Does nothing when already connected. Otherwise connects and subscribes,
    /// unless the previous attempt was less than one reconnect interval ago.
    ///
    /// # Errors
    ///
    /// - `WatcherError::NotReady` if another attempt is in flight or the
    ///   reconnect interval has not yet elapsed
    /// - `WatcherError::Transport` if connecting or subscribing fails
    pub async fn ensure_connected(&self) -> Result<()> {
        let span = self.log.span("ensure_connected");
        contain(self.log, "ensure_connected", self.ensure_connected_inner())
            .instrument(span)
            .await
    }

    async fn ensure_connected_inner(&self) -> Result<()> {
        let Ok(mut inner) = self.inner.try_lock() else {
            return Err(WatcherError::NotReady(
                "connection attempt already in progress".to_string(),
            ));
        };

        if inner.is_live() {
            return Ok(());
        }

        if inner.state == ConnectionState::Connected {
            tracing::warn!(subject = %self.subject, "connection lost");
            self.teardown(&mut inner).await;
        }

        if let Some(last_attempt) = inner.last_attempt {
            let elapsed = last_attempt.elapsed();
            if elapsed < self.reconnect_interval {
                let remaining = self.reconnect_interval - elapsed;
                return Err(WatcherError::NotReady(format!(
                    "ignore reconnect request. will try after {} seconds",
                    remaining.as_secs_f64().ceil() as u64
                )));
            }
        }

        self.connect(&mut inner).await
    }

    async fn connect(&self, inner: &mut Inner) -> Result<()> {
        inner.last_attempt = Some(Instant::now());
        inner.state = ConnectionState::Connecting;

        if self.subject.is_empty() {
            inner.state = ConnectionState::Disconnected;
            return Err(WatcherError::Transport(
                "subscription subject is empty".to_string(),
            ));
        }

        let mut connection = match self.connector.connect().await {
            Ok(connection) => connection,
            Err(e) => {
                inner.state = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        let subscription = match connection.subscribe(&self.subject).await {
            Ok(subscription) => subscription,
            Err(e) => {
                connection.close().await;
                inner.state = ConnectionState::Disconnected;
                return Err(WatcherError::Transport(format!(
                    "failed to subscribe to {}: {}",
                    self.subject, e
                )));
            }
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            deliver(subscription, self.handler.clone(), cancel.clone(), self.log)
                .instrument(self.log.span("deliver")),
        );

        inner.connection = Some(connection);
        inner.delivery = Some(Delivery { cancel, handle });
        inner.state = ConnectionState::Connected;

        tracing::info!(subject = %self.subject, "connected and subscribed");

        Ok(())
    }

    /// Unsubscribe and close the connection.
    ///
    /// Waits for an in-flight attempt or message to finish first. Releasing a
    /// manager that holds no connection is a no-op.
    pub async fn release(&self) -> Result<()> {
        let span = self.log.span("release");
        contain(self.log, "release", async {
            let mut inner = self.inner.lock().await;
            self.teardown(&mut inner).await;
            Ok(())
        })
        .instrument(span)
        .await
    }

    async fn teardown(&self, inner: &mut Inner) {
        if let Some(delivery) = inner.delivery.take() {
            delivery.cancel.cancel();
            if let Err(e) = delivery.handle.await {
                tracing::error!(error = %e, "delivery task ended abnormally");
            }
        }

        if let Some(mut connection) = inner.connection.take() {
            if connection.is_open() {
                connection.close().await;
                tracing::info!(subject = %self.subject, "connection closed");
            }
        }

        inner.state = ConnectionState::Disconnected;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(delivery) = self.inner.get_mut().delivery.as_ref() {
            delivery.cancel.cancel();
        }
    }
}

enum Next {
    Cancelled,
    Message(Bytes),
    Closed,
}

async fn deliver(
    mut subscription: Box<dyn Subscription>,
    handler: Arc<dyn MessageHandler>,
    cancel: CancellationToken,
    log: ComponentLog,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => Next::Cancelled,
            message = subscription.next_message() => match message {
                Some(payload) => Next::Message(payload),
                None => Next::Closed,
            },
        };

        match next {
            Next::Cancelled => {
                if let Err(e) = subscription.unsubscribe().await {
                    tracing::warn!(error = %e, "unsubscribe failed");
                }
                break;
            }
            Next::Message(payload) => {
                if let Err(e) = contain(log, "handle_message", handler.handle(payload)).await {
                    tracing::error!(error = %e, "message dropped");
                }
            }
            Next::Closed => {
                tracing::warn!("subscription closed by transport");
                break;
            }
        }
    }
}
