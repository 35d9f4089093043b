//! In-process fake bus for unit and integration tests
//!
//! [`FakeBus`] implements [`BusConnector`] with in-memory channels so the
//! connection manager and the full pipeline can be exercised without a NATS
//! server. The test side uses the same handle to:
//!
//! - publish payloads to the current subscription: [`FakeBus::publish`]
//! - make connects or subscribes fail: [`FakeBus::set_fail_connect`],
//!   [`FakeBus::set_fail_subscribe`]
//! - slow connects down: [`FakeBus::set_connect_delay`]
//! - simulate the transport dropping the connection:
//!   [`FakeBus::drop_connection`]
//! - inspect what happened: attempt times, opened/closed connections,
//!   unsubscribes
//!
//! # Example
//!
//! ```
//! use s3_data_watcher::bus::fake::FakeBus;
//! use s3_data_watcher::bus::{BusConnection, BusConnector, Subscription};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = FakeBus::new();
//! let connection = bus.connect().await.unwrap();
//! let mut subscription = connection.subscribe("minio.events").await.unwrap();
//!
//! assert!(bus.publish(&b"{}"[..]));
//! assert_eq!(subscription.next_message().await.unwrap().as_ref(), b"{}");
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::bus::{BusConnection, BusConnector, Subscription};
use crate::error::{Result, WatcherError};

#[derive(Default)]
struct FakeBusState {
    fail_connect: AtomicBool,
    fail_subscribe: AtomicBool,
    connect_delay: Mutex<Duration>,
    attempts: Mutex<Vec<Instant>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    unsubscribed: AtomicUsize,
    subjects: Mutex<Vec<String>>,
    current: Mutex<Option<CurrentLink>>,
}

struct CurrentLink {
    connection_id: usize,
    open: Arc<AtomicBool>,
    sender: Option<mpsc::UnboundedSender<Bytes>>,
}

/// Handle to an in-memory bus.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct FakeBus {
    state: Arc<FakeBusState>,
}

impl FakeBus {
    /// Create a bus that accepts connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent connects fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent subscribes fail.
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.state.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Delay every connect by `delay` before it resolves.
    pub fn set_connect_delay(&self, delay: Duration) {
        *lock(&self.state.connect_delay) = delay;
    }

    /// Deliver `payload` to the current subscription.
    ///
    /// Returns false if nothing is subscribed.
    pub fn publish(&self, payload: impl Into<Bytes>) -> bool {
        let current = lock(&self.state.current);
        match current.as_ref().and_then(|link| link.sender.as_ref()) {
            Some(sender) => sender.send(payload.into()).is_ok(),
            None => false,
        }
    }

    /// Simulate the transport closing the current connection.
    pub fn drop_connection(&self) {
        if let Some(link) = lock(&self.state.current).as_mut() {
            link.open.store(false, Ordering::SeqCst);
            link.sender = None;
        }
    }

    /// Start times of all connect attempts, including failed ones.
    pub fn connect_attempts(&self) -> Vec<Instant> {
        lock(&self.state.attempts).clone()
    }

    /// Number of connections successfully opened.
    pub fn connections_opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Number of connections closed by the client.
    pub fn connections_closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Number of explicit unsubscribes.
    pub fn unsubscribes(&self) -> usize {
        self.state.unsubscribed.load(Ordering::SeqCst)
    }

    /// Subjects subscribed to, in order.
    pub fn subscribed_subjects(&self) -> Vec<String> {
        lock(&self.state.subjects).clone()
    }

    /// Identifier of the connection holding the current subscription.
    pub fn current_connection_id(&self) -> Option<usize> {
        lock(&self.state.current)
            .as_ref()
            .map(|link| link.connection_id)
    }

    /// Whether a subscription is currently able to receive messages.
    pub fn has_subscriber(&self) -> bool {
        lock(&self.state.current)
            .as_ref()
            .is_some_and(|link| link.sender.as_ref().is_some_and(|s| !s.is_closed()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl BusConnector for FakeBus {
    async fn connect(&self) -> Result<Box<dyn BusConnection>> {
        lock(&self.state.attempts).push(Instant::now());

        let delay = *lock(&self.state.connect_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(WatcherError::Transport("fake bus refused connection".to_string()));
        }

        let id = self.state.opened.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(Box::new(FakeConnection {
            id,
            open: Arc::new(AtomicBool::new(true)),
            bus: self.clone(),
        }))
    }
}

struct FakeConnection {
    id: usize,
    open: Arc<AtomicBool>,
    bus: FakeBus,
}

#[async_trait]
impl BusConnection for FakeConnection {
    async fn subscribe(&self, subject: &str) -> Result<Box<dyn Subscription>> {
        if self.bus.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(WatcherError::Transport("fake bus refused subscription".to_string()));
        }

        let (sender, receiver) = mpsc::unbounded_channel();

        lock(&self.bus.state.subjects).push(subject.to_string());
        *lock(&self.bus.state.current) = Some(CurrentLink {
            connection_id: self.id,
            open: self.open.clone(),
            sender: Some(sender),
        });

        Ok(Box::new(FakeSubscription {
            receiver,
            bus: self.bus.clone(),
        }))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        if self.open.swap(false, Ordering::SeqCst) {
            self.bus.state.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct FakeSubscription {
    receiver: mpsc::UnboundedReceiver<Bytes>,
    bus: FakeBus,
}

#[async_trait]
impl Subscription for FakeSubscription {
    async fn next_message(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        self.receiver.close();
        self.bus.state.unsubscribed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
