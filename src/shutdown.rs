//! Process-wide shutdown signal.
//!
//! Set once when the process is asked to stop. Reader threads poll
//! [`ShutdownCoordinator::is_shutdown`] between reads; async stream loops can
//! do the same or await [`ShutdownCoordinator::wait`]. Nothing is interrupted
//! forcibly, so shutdown latency is about one loop iteration per loop.

use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Later calls are no-ops.
    pub fn trigger(&self, reason: &str) {
        if !self.token.is_cancelled() {
            info!("Shutdown signal raised: {}", reason);
            self.token.cancel();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal has been raised
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
