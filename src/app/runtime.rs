use super::{SentrycamOrchestrator, ShutdownReason};
use crate::error::{Result, SentrycamError};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

impl SentrycamOrchestrator {
    /// Run until a signal arrives or the shutdown coordinator is triggered,
    /// then shut down gracefully
    pub async fn run(&mut self) -> Result<i32> {
        info!("Sentrycam system is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| SentrycamError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| SentrycamError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender);

        let shutdown_reason = tokio::select! {
            reason = shutdown_receiver => reason.map_err(|_| {
                SentrycamError::system("Shutdown channel closed unexpectedly")
            })?,
            _ = self.shutdown.wait() => ShutdownReason::Requested,
        };

        info!("Shutdown initiated: {}", shutdown_reason.describe());

        let exit_code = self.shutdown(&shutdown_reason).await?;

        info!("Sentrycam system shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::spawn(async move {
                        if sigterm.recv().await.is_some() {
                            info!("Received SIGTERM signal");
                            if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                                let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                            }
                        }
                    });
                }
                Err(e) => error!("Failed to register SIGTERM handler: {}", e),
            }
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
