//! Cooperative cancellation shared by every blocking call in the pipeline.
//!
//! A `watch::Receiver<bool>` is handed to each long-running task; the value
//! flips to `true` once when the process starts shutting down.

use tokio::sync::watch;

pub type ShutdownReceiver = watch::Receiver<bool>;
pub type ShutdownSender = watch::Sender<bool>;

/// Create a fresh shutdown channel in the "running" state.
pub fn shutdown_channel() -> (ShutdownSender, ShutdownReceiver) {
    watch::channel(false)
}

/// Resolve once shutdown has been requested.
///
/// If the sender is dropped without ever signalling, this never resolves.
pub async fn wait_for_shutdown(rx: &mut ShutdownReceiver) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Non-blocking check.
pub fn is_shutdown(rx: &ShutdownReceiver) -> bool {
    *rx.borrow()
}
