//! Graceful shutdown for the reconciliation loop and the HTTP API.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal;
use tokio::sync::broadcast;

/// The OS signal that stopped the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        })
    }
}

/// Broadcasts one shutdown to every subscriber. The reconciliation loop and
/// the HTTP server each hold a receiver and `select!` on it.
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Notify every subscriber once. Returns how many subsystems were
    /// listening; later calls notify nobody and return 0.
    pub fn shutdown(&self) -> usize {
        if self.triggered.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let notified = self.tx.send(()).unwrap_or(0);
        tracing::info!(subsystems = notified, "shutdown broadcast");
        notified
    }

    /// Wait for SIGINT or SIGTERM, then trigger shutdown.
    pub async fn wait_for_signal(&self) -> ShutdownSignal {
        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let received = tokio::select! {
            _ = ctrl_c => ShutdownSignal::Interrupt,
            _ = terminate => ShutdownSignal::Terminate,
        };
        tracing::info!(signal = %received, "signal received");
        self.shutdown();
        received
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
