use super::{ComponentState, SentrycamOrchestrator, ShutdownReason};
use crate::error::{Result, SentrycamError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// How long one reader's capture thread may take to exit
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
#[cfg(feature = "streaming")]
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(10);
const PIPELINE_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl SentrycamOrchestrator {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self, reason: &ShutdownReason) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Stream loops and reader threads observe this on their next cycle
        self.shutdown.trigger(&reason.describe());

        let mut exit_code = match reason {
            ShutdownReason::Error(_) => 1,
            _ => 0,
        };

        // Stop components in reverse dependency order
        #[cfg(feature = "streaming")]
        if let Err(e) = self.stop_streaming().await {
            error!("Error stopping streaming: {}", e);
            exit_code = 1;
        }

        if let Err(e) = self.stop_pipeline().await {
            error!("Error stopping pipeline: {}", e);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    #[cfg(feature = "streaming")]
    async fn stop_streaming(&mut self) -> Result<()> {
        let component = "streaming";
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        let Some(task) = self.server_task.take() else {
            self.set_component_state(component, ComponentState::Stopped)
                .await;
            return Ok(());
        };

        self.finish_stop(component, SERVER_STOP_TIMEOUT, async move {
            task.await.map_err(|e| {
                SentrycamError::component("streaming", format!("server task failed: {}", e))
            })?
        })
        .await
    }

    /// Stop every shared reader and wait for the capture threads, off the
    /// async runtime
    async fn stop_pipeline(&mut self) -> Result<()> {
        let component = "pipeline";
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        let pipeline = Arc::clone(&self.pipeline);
        self.finish_stop(component, PIPELINE_STOP_TIMEOUT, async move {
            let stuck = tokio::task::spawn_blocking(move || pipeline.stop_readers(READER_JOIN_TIMEOUT))
                .await
                .map_err(|e| SentrycamError::component("pipeline", e.to_string()))?;
            if stuck > 0 {
                warn!("Abandoning {} capture threads blocked in I/O", stuck);
            }
            Ok(())
        })
        .await
    }

    /// Await a component's stop future and record the resulting state
    async fn finish_stop<F>(&self, component: &str, limit: Duration, stop: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        match timeout(limit, stop).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("Error stopping {} component: {}", component, e);
                Err(e)
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("{} component stop timeout", component);
                Err(SentrycamError::system(format!(
                    "{} component stop timeout",
                    component
                )))
            }
        }
    }
}
