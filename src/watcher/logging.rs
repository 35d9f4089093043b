//! Structured logging for the watcher
//!
//! Provides JSON-formatted and human-readable logging with optional file
//! output, plus [`ComponentLog`], the `{component, operation}` tag handed to
//! each pipeline component at construction.

use crate::config::LoggingConfig;
use anyhow::Result;
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging based on configuration.
///
/// `RUST_LOG` takes precedence over the configured level. When `debug` is
/// set the level is forced to `debug` regardless of either.
///
/// # Errors
///
/// Returns error if the level is not a valid filter directive or the log
/// file cannot be opened
///
/// # Examples
///
/// ```no_run
/// use s3_data_watcher::config::LoggingConfig;
/// use s3_data_watcher::watcher::logging::init_logging;
///
/// let config = LoggingConfig::default();
/// init_logging(&config, false).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig, debug: bool) -> Result<()> {
    let env_filter = if debug {
        EnvFilter::try_new("debug")?
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    let file = match &config.file_path {
        Some(path) => Some(Arc::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => None,
    };

    if config.json_format {
        let stderr_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr);

        if let Some(file) = file {
            let file_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(file);

            registry.with(stderr_layer).with(file_layer).try_init()?;
        } else {
            registry.with(stderr_layer).try_init()?;
        }
    } else {
        let stderr_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_writer(std::io::stderr);

        if let Some(file) = file {
            let file_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .with_writer(file);

            registry.with(stderr_layer).with(file_layer).try_init()?;
        } else {
            registry.with(stderr_layer).try_init()?;
        }
    }

    Ok(())
}

/// Logging tag for one pipeline component.
///
/// Each component receives one of these when it is built and opens a span per
/// operation, so every log line carries `component` and `operation` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentLog {
    component: &'static str,
}

impl ComponentLog {
    /// Create a tag for the named component.
    pub const fn new(component: &'static str) -> Self {
        Self { component }
    }

    /// Component label.
    pub fn component(&self) -> &'static str {
        self.component
    }

    /// Span for one operation of this component.
    pub fn span(&self, operation: &'static str) -> tracing::Span {
        tracing::info_span!("op", component = self.component, operation = operation)
    }
}
