//! Watcher service
//!
//! Wires the pipeline together: the connection manager delivers raw payloads
//! to a [`PipelineHandler`], which converts them into canonical records and
//! hands them to the dispatcher, which launches matching jobs. [`Watcher::run`]
//! supervises the bus connection until shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::bus::manager::{ConnectionManager, ConnectionState};
use crate::bus::nats::NatsConnector;
use crate::bus::{BusConnector, MessageHandler};
use crate::config::Config;
use crate::error::{Result, WatcherError};
use crate::watcher::dispatch::Dispatcher;
use crate::watcher::event::EventConverter;
use crate::watcher::jobs::expand_home_dir;
use crate::watcher::logging::ComponentLog;
use crate::watcher::runner::{JobLauncher, ProcessJobRunner};

/// Main watcher service
///
/// # Example
///
/// ```rust,no_run
/// use s3_data_watcher::config::Config;
/// use s3_data_watcher::watcher::Watcher;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load("/etc/s3_data_watcher/config.yml")?;
/// config.validate()?;
///
/// let watcher = Watcher::start(&config).await;
/// watcher.run(async { tokio::signal::ctrl_c().await.ok(); }).await;
/// watcher.release().await?;
/// # Ok(())
/// # }
/// ```
pub struct Watcher {
    manager: ConnectionManager,
    reconnect_interval: Duration,
    log: ComponentLog,
}

impl Watcher {
    /// Build the pipeline over NATS and make the first connect attempt.
    ///
    /// Never fails on an unreachable bus; the watcher starts disconnected and
    /// [`run`](Self::run) keeps retrying.
    pub async fn start(config: &Config) -> Self {
        let connector = Arc::new(NatsConnector::new(config.nats_config.clone()));
        let launcher = Arc::new(ProcessJobRunner::new(ComponentLog::new("job_runner")));
        Self::start_with(config, connector, launcher).await
    }

    /// Build the pipeline over an arbitrary transport and job launcher.
    pub async fn start_with(
        config: &Config,
        connector: Arc<dyn BusConnector>,
        launcher: Arc<dyn JobLauncher>,
    ) -> Self {
        let log = ComponentLog::new("watcher");
        let job_file_path = expand_home_dir(&config.job_file_path);

        info!(
            url = %config.nats_config.url,
            subject = %config.nats_config.subject,
            job_file = %job_file_path.display(),
            reconnect_interval_secs = config.reconnect_interval_secs,
            "Starting watcher service"
        );

        let handler = PipelineHandler {
            converter: EventConverter::new(ComponentLog::new("event_converter")),
            dispatcher: Dispatcher::new(job_file_path, launcher, ComponentLog::new("dispatcher")),
            include_payload: config.logging.include_payload,
            log: ComponentLog::new("pipeline"),
        };

        let manager = ConnectionManager::start(
            connector,
            config.nats_config.subject.clone(),
            config.reconnect_interval(),
            Arc::new(handler),
            ComponentLog::new("connection_manager"),
        )
        .await;

        Self {
            manager,
            reconnect_interval: config.reconnect_interval(),
            log,
        }
    }

    /// Current bus connection state.
    pub async fn state(&self) -> ConnectionState {
        self.manager.state().await
    }

    /// Make sure the bus connection is up.
    ///
    /// # Errors
    ///
    /// See [`ConnectionManager::ensure_connected`].
    pub async fn ensure_connected(&self) -> Result<()> {
        self.manager.ensure_connected().await
    }

    /// Supervise the connection until `shutdown` resolves.
    ///
    /// Every reconnect interval the connection is checked and re-established
    /// if it was never up or has been closed by the transport.
    pub async fn run<S>(&self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let period = self.reconnect_interval.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(component = self.log.component(), "Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    match self.manager.ensure_connected().await {
                        Ok(()) => {}
                        Err(WatcherError::NotReady(reason)) => {
                            debug!(component = self.log.component(), reason = %reason, "Reconnect skipped");
                        }
                        Err(e) => {
                            warn!(component = self.log.component(), error = %e, "Reconnect failed");
                        }
                    }
                }
            }
        }
    }

    /// Unsubscribe and close the bus connection.
    ///
    /// No job is launched after this returns.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::Internal` if teardown panicked.
    pub async fn release(&self) -> Result<()> {
        info!(component = self.log.component(), "Releasing watcher");
        self.manager.release().await
    }
}

/// Message handler running convert then dispatch for every payload.
struct PipelineHandler {
    converter: EventConverter,
    dispatcher: Dispatcher,
    include_payload: bool,
    log: ComponentLog,
}

#[async_trait]
impl MessageHandler for PipelineHandler {
    async fn handle(&self, payload: Bytes) -> Result<()> {
        if self.include_payload {
            debug!(
                component = self.log.component(),
                payload = %String::from_utf8_lossy(&payload),
                "Received message"
            );
        }

        let records = match self.converter.convert(&payload) {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    component = self.log.component(),
                    error = %e,
                    "Failed to convert message, dropping it"
                );
                return Ok(());
            }
        };

        if records.is_empty() {
            debug!(component = self.log.component(), "Message carried no records");
            return Ok(());
        }

        self.dispatcher.dispatch(&records).await.map(|_| ())
    }
}
