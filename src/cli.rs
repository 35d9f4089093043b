//! Command-line interface definition for s3-data-watcher
//!
//! This module defines the CLI structure using clap's derive API.

use clap::Parser;

/// s3-data-watcher - run jobs on object-store notifications
///
/// Subscribes to bucket notifications on a NATS subject and launches the
/// jobs whose filters match each event.
#[derive(Parser, Debug, Clone)]
#[command(name = "s3-data-watcher")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file [default: /etc/s3_data_watcher/config.yml]
    ///
    /// A file given here must exist; the default location may be absent.
    #[arg(short, long, env = "S3_DATA_WATCHER_CONFIG")]
    pub config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: None,
            debug: false,
        }
    }
}
