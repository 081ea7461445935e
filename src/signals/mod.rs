// Unix signal handling for graceful shutdown
// Captures SIGTERM and SIGINT so the server can flush its snapshot before exit

use anyhow::Result;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use futures::StreamExt;
use tracing::{info, debug};

/// Create a future that resolves when a shutdown signal is received
/// Listens for SIGTERM and SIGINT (Ctrl+C)
pub fn create_shutdown_listener() -> Result<impl std::future::Future<Output = ()>> {
    let signals = Signals::new([SIGTERM, SIGINT])?;

    Ok(async move {
        let mut signals = signals;

        while let Some(signal) = signals.next().await {
            match signal {
                SIGTERM => {
                    info!("Received SIGTERM - graceful shutdown initiated");
                    break;
                }
                SIGINT => {
                    info!("Received SIGINT (Ctrl+C) - graceful shutdown initiated");
                    break;
                }
                _ => {
                    debug!("Received unexpected signal: {}", signal);
                }
            }
        }
    })
}

/// Notifies background tasks (persister, reporter) that the process is stopping
#[derive(Clone)]
pub struct ShutdownCoordinator {
    tx: tokio::sync::broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(16);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown across all subscribers
    pub fn trigger(&self) {
        let receivers = self.tx.send(()).unwrap_or(0);
        info!(receivers = receivers, "Shutdown signal broadcast to background tasks");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
