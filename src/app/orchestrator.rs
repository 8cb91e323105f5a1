use super::state::ComponentStates;
use super::types::ShutdownReason;
use crate::config::SentrycamConfig;
use crate::error::Result;
use crate::pipeline::VideoPipeline;
use crate::shutdown::ShutdownCoordinator;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Main application coordinator: owns the video pipeline, the HTTP front
/// end and the process-wide shutdown signal
pub struct SentrycamOrchestrator {
    pub(super) config: SentrycamConfig,
    pub(super) pipeline: Arc<VideoPipeline>,
    pub(super) shutdown: ShutdownCoordinator,

    // Components
    pub(super) server_task: Option<JoinHandle<Result<()>>>,

    // Lifecycle management
    pub(super) component_states: ComponentStates,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
}

impl SentrycamOrchestrator {
    /// Create a new orchestrator, wiring the pipeline from configuration
    pub async fn new(config: SentrycamConfig) -> Result<Self> {
        let shutdown = ShutdownCoordinator::new();
        let pipeline = VideoPipeline::builder()
            .config(config.clone())
            .shutdown(shutdown.clone())
            .build()?;

        Ok(Self::with_pipeline(config, Arc::new(pipeline)))
    }

    /// Create an orchestrator around an already assembled pipeline. The
    /// pipeline's coordinator becomes the process-wide one.
    pub fn with_pipeline(config: SentrycamConfig, pipeline: Arc<VideoPipeline>) -> Self {
        let shutdown = pipeline.shutdown_coordinator().clone();
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Self {
            config,
            pipeline,
            shutdown,
            server_task: None,
            component_states: ComponentStates::new(),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
        }
    }

    pub fn pipeline(&self) -> &Arc<VideoPipeline> {
        &self.pipeline
    }

    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }
}
