//! s3-data-watcher - run jobs on object-store notifications
//!
//! This library subscribes to S3-style bucket notifications published on a
//! NATS subject, matches every notification record against a YAML job table
//! and launches each matching job as a child process with the record as JSON
//! on its standard input.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `bus`: Transport seam, NATS implementation, and the connection manager
//!   with rate-limited reconnect
//! - `watcher`: Event conversion, job table, filtering, dispatch, job
//!   launching, and the service tying them together
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use s3_data_watcher::{Config, Watcher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/s3_data_watcher/config.yml")?;
//!     config.validate()?;
//!
//!     let watcher = Watcher::start(&config).await;
//!     watcher.run(async { tokio::signal::ctrl_c().await.ok(); }).await;
//!     watcher.release().await?;
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod cli;
pub mod config;
pub mod error;
pub mod watcher;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, WatcherError};
pub use watcher::Watcher;
