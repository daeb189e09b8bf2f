//! Signal handling and cancellation for long-running commands

use std::sync::Arc;
use tokio::sync::watch;

/// Cancellation token for async operations
#[derive(Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Create a new cancellation token
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Cancel the token
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until cancelled
    pub async fn cancelled(&mut self) {
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancel `token` on SIGINT/SIGTERM (Ctrl+C elsewhere).
///
/// Returns an error if the handlers could not be installed; the token is
/// left untouched in that case.
pub async fn setup_signal_handlers(token: CancellationToken) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!(signal = "SIGINT", "Shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!(signal = "SIGTERM", "Shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!(signal = "ctrl-c", "Shutting down");
    }

    token.cancel();
    Ok(())
}
