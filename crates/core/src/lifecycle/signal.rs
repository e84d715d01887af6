//! Signal handling: SIGINT/SIGTERM shut down, SIGHUP reloads configuration.

use tokio::sync::watch;

pub struct SignalHandler {
    shutdown_tx: watch::Sender<bool>,
}

impl SignalHandler {
    /// Returns the handler and a receiver that flips to `true` on shutdown.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    /// Wait for signals until shutdown is requested, calling `reload_fn`
    /// on every SIGHUP (unix only).
    pub async fn run<F>(self, reload_fn: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
                (Ok(mut sigterm), Ok(mut sighup)) => loop {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {
                            tracing::info!(signal = "SIGINT", "Shutdown requested");
                            break;
                        }
                        _ = sigterm.recv() => {
                            tracing::info!(signal = "SIGTERM", "Shutdown requested");
                            break;
                        }
                        _ = sighup.recv() => {
                            tracing::info!(signal = "SIGHUP", "Reload requested");
                            reload_fn();
                        }
                    }
                },
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!("Failed to install unix signal handlers ({e}), Ctrl+C only");
                    wait_for_ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = &reload_fn;
            wait_for_ctrl_c().await;
        }

        self.trigger();
    }

    /// Request shutdown without waiting for a signal.
    pub fn trigger(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "SIGINT", "Shutdown requested"),
        Err(e) => tracing::error!("Failed to listen for Ctrl+C: {e}"),
    }
}
