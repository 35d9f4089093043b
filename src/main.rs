//! s3-data-watcher
//!
#![doc = "s3-data-watcher - run jobs on object-store notifications"]
#![doc = "Main entry point for the watcher service."]

use anyhow::{Context, Result};

use s3_data_watcher::cli::Cli;
use s3_data_watcher::config::{Config, CONFIG_FILE_PATH_DEFAULT};
use s3_data_watcher::watcher::logging::init_logging;
use s3_data_watcher::Watcher;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load and validate configuration. The configured subscriber does not
    // exist yet, so warnings raised here go to a plain stderr one.
    let bootstrap = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .finish();
    let config = tracing::subscriber::with_default(bootstrap, || load_config(&cli))?;
    config.validate()?;

    init_logging(&config.logging, cli.debug)?;

    let shutdown = shutdown_signal()?;
    let watcher = Watcher::start(&config).await;

    watcher.run(shutdown).await;

    watcher.release().await?;
    tracing::info!("Watcher stopped");

    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    match cli.config.as_deref() {
        Some(path) => Config::load_required(path)
            .with_context(|| format!("failed to load config from {}", path)),
        None => Config::load(CONFIG_FILE_PATH_DEFAULT)
            .with_context(|| format!("failed to load config from {}", CONFIG_FILE_PATH_DEFAULT)),
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
///
/// Handlers are installed before returning so a signal arriving during
/// startup is not lost.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    Ok(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                }
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
    })
}
