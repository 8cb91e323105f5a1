use super::{ComponentState, SentrycamOrchestrator};
use crate::error::Result;
use tracing::{error, info};

impl SentrycamOrchestrator {
    /// Initialize all system components
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing Sentrycam system components");

        self.set_component_state("pipeline", ComponentState::Stopped)
            .await;
        #[cfg(feature = "streaming")]
        self.set_component_state("streaming", ComponentState::Stopped)
            .await;

        info!(
            "{} cameras configured, reader mode {:?}",
            self.config.cameras.len(),
            self.config.pipeline.reader_mode
        );
        Ok(())
    }

    /// Start all system components
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting Sentrycam system");

        // Readers start lazily with the first stream of each camera
        self.set_component_state("pipeline", ComponentState::Running)
            .await;

        #[cfg(feature = "streaming")]
        self.start_stream_server().await?;

        info!("Sentrycam system started successfully");
        Ok(())
    }

    #[cfg(feature = "streaming")]
    async fn start_stream_server(&mut self) -> Result<()> {
        use crate::streaming::StreamServerBuilder;
        use std::sync::Arc;

        self.set_component_state("streaming", ComponentState::Starting)
            .await;

        let server = StreamServerBuilder::new()
            .config(self.config.server.clone())
            .pipeline(Arc::clone(&self.pipeline))
            .shutdown(self.shutdown.clone())
            .components(self.component_states.clone())
            .build()?;
        let address = server.address();

        let shutdown = self.shutdown.clone();
        self.server_task = Some(tokio::spawn(async move {
            let result = server.start().await;
            if let Err(e) = &result {
                error!("Stream server error: {}", e);
                shutdown.trigger("stream server failed");
            }
            result
        }));

        self.set_component_state("streaming", ComponentState::Running)
            .await;
        info!("Streaming server started on {}", address);
        Ok(())
    }
}
