//! Service lifecycle: readiness notification, signal handling, and logging.

pub mod logging;
pub mod notify;
pub mod signal;

/// Lifecycle event sink (foreground vs systemd).
pub trait Lifecycle: Send + Sync {
    /// The listener is bound and accepting connections.
    fn on_ready(&self);
    fn on_reloading(&self);
    fn on_reloaded(&self);
    /// Graceful shutdown has begun.
    fn on_stopping(&self);
}

/// Foreground lifecycle: logs events only.
pub struct ForegroundLifecycle;

impl Lifecycle for ForegroundLifecycle {
    fn on_ready(&self) {
        tracing::info!("keymeter ready");
    }

    fn on_reloading(&self) {
        tracing::info!("Reloading configuration...");
    }

    fn on_reloaded(&self) {
        tracing::info!("Configuration reloaded");
    }

    fn on_stopping(&self) {
        tracing::info!("keymeter stopping...");
    }
}

/// Systemd lifecycle: sends sd-notify state changes, then logs.
pub struct SystemdLifecycle;

impl Lifecycle for SystemdLifecycle {
    fn on_ready(&self) {
        notify::sd_ready();
        tracing::info!(systemd = true, "keymeter ready");
    }

    fn on_reloading(&self) {
        notify::sd_reloading();
        tracing::info!(systemd = true, "Reloading configuration...");
    }

    fn on_reloaded(&self) {
        notify::sd_ready();
        tracing::info!(systemd = true, "Configuration reloaded");
    }

    fn on_stopping(&self) {
        notify::sd_stopping();
        tracing::info!(systemd = true, "keymeter stopping...");
    }
}

/// `SystemdLifecycle` when `NOTIFY_SOCKET` is set, else `ForegroundLifecycle`.
pub fn detect_lifecycle() -> Box<dyn Lifecycle> {
    if std::env::var_os("NOTIFY_SOCKET").is_some() {
        Box::new(SystemdLifecycle)
    } else {
        Box::new(ForegroundLifecycle)
    }
}
