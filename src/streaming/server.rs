use crate::app::ComponentStates;
use crate::config::ServerConfig;
use crate::error::{Result, SentrycamError, StreamError};
use crate::pipeline::VideoPipeline;
use crate::shutdown::ShutdownCoordinator;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{annotated_stream_handler, health_handler, raw_stream_handler};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) pipeline: Arc<VideoPipeline>,
    pub(crate) components: Option<ComponentStates>,
}

/// HTTP front end serving multipart camera streams
pub struct StreamServer {
    pub(crate) config: ServerConfig,
    pub(crate) pipeline: Arc<VideoPipeline>,
    pub(crate) shutdown: ShutdownCoordinator,
    pub(crate) components: Option<ComponentStates>,
}

impl StreamServer {
    pub fn new(
        config: ServerConfig,
        pipeline: Arc<VideoPipeline>,
        shutdown: ShutdownCoordinator,
    ) -> Self {
        Self {
            config,
            pipeline,
            shutdown,
            components: None,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.ip, self.config.port)
    }

    pub(crate) fn router(&self) -> Router {
        let state = ServerState {
            pipeline: Arc::clone(&self.pipeline),
            components: self.components.clone(),
        };

        Router::new()
            .route("/video/stream/:camera_id", get(annotated_stream_handler))
            .route("/video/raw/:camera_id", get(raw_stream_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve until the shutdown signal is raised
    pub async fn start(&self) -> Result<()> {
        let addr = self.address();
        let app = self.router();

        info!("Starting stream server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| StreamError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;

        self.serve(listener, app).await
    }

    pub(crate) async fn serve(&self, listener: tokio::net::TcpListener, app: Router) -> Result<()> {
        let local = listener.local_addr().map_err(SentrycamError::Io)?;
        info!("Stream server listening on {}", local);

        let shutdown = self.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await
            .map_err(|e| StreamError::StartupFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("Stream server stopped");
        Ok(())
    }
}

/// Stream server builder for configuration
pub struct StreamServerBuilder {
    config: Option<ServerConfig>,
    pipeline: Option<Arc<VideoPipeline>>,
    shutdown: Option<ShutdownCoordinator>,
    components: Option<ComponentStates>,
}

impl StreamServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            pipeline: None,
            shutdown: None,
            components: None,
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn pipeline(mut self, pipeline: Arc<VideoPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Defaults to the pipeline's own coordinator
    pub fn shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Component states reported by `/health`
    pub fn components(mut self, components: ComponentStates) -> Self {
        self.components = Some(components);
        self
    }

    pub fn build(self) -> Result<StreamServer> {
        let config = self.config.ok_or_else(|| {
            SentrycamError::Stream(StreamError::StartupFailed {
                details: "Server configuration is required".to_string(),
            })
        })?;

        let pipeline = self.pipeline.ok_or_else(|| {
            SentrycamError::Stream(StreamError::StartupFailed {
                details: "Video pipeline is required".to_string(),
            })
        })?;

        let shutdown = self
            .shutdown
            .unwrap_or_else(|| pipeline.shutdown_coordinator().clone());

        let mut server = StreamServer::new(config, pipeline, shutdown);
        server.components = self.components;
        Ok(server)
    }
}

impl Default for StreamServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
