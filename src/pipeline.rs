use crate::config::{ReaderConfig, ReaderMode, SentrycamConfig};
use crate::detect::{Detector, NullDetector, ThresholdDetector};
use crate::error::{Result, SentrycamError};
use crate::reader::{FrameReader, FrameSource, ReaderHub};
use crate::recorder::{EventRecorder, EventStore, JsonlEventStore, Notifier, TracingNotifier};
use crate::registry::{CameraRegistry, ConfigCameraRegistry};
use crate::shutdown::ShutdownCoordinator;
use crate::source::{default_backend, CaptureBackend, SourceResolver};
use crate::streaming::{ActiveStreamGuard, OverlayRenderer, SessionContext, StreamMode, StreamSession};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Point-in-time counters for the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub reader_mode: ReaderMode,
    pub active_streams: usize,
    pub shared_readers: usize,
    pub events_recorded: u64,
    pub events_suppressed: u64,
    pub capture_backend: &'static str,
}

/// Entry point for stream sessions.
///
/// Looks cameras up in the registry, attaches a frame source per the
/// configured reader mode and hands back a [`StreamSession`].
pub struct VideoPipeline {
    ctx: Arc<SessionContext>,
    resolver: Arc<SourceResolver>,
    hub: ReaderHub,
    reader_config: ReaderConfig,
    reader_mode: ReaderMode,
    active_streams: Arc<AtomicUsize>,
}

impl VideoPipeline {
    pub fn builder() -> VideoPipelineBuilder {
        VideoPipelineBuilder::new()
    }

    /// Open a stream for `camera_id`.
    ///
    /// Never fails: unknown or inactive cameras get a session that sends a
    /// single OFFLINE frame.
    pub fn open_stream(&self, camera_id: &str, mode: StreamMode) -> StreamSession {
        let camera_id = camera_id.trim();

        if !self.ctx.registry.is_active(camera_id) {
            info!("Camera {} offline/inactive ({})", camera_id, mode.as_str());
            return self.closing(camera_id, mode, &format!("OFFLINE: {}", camera_id));
        }
        let Some(source) = self.ctx.registry.source(camera_id) else {
            warn!("Camera {} has no usable source", camera_id);
            return self.closing(camera_id, mode, &format!("OFFLINE: {}", camera_id));
        };

        let frames: Result<Box<dyn FrameSource>> = match self.reader_mode {
            ReaderMode::Shared => self
                .hub
                .subscribe(camera_id, &source)
                .map(|lease| Box::new(lease) as Box<dyn FrameSource>),
            ReaderMode::PerClient => FrameReader::start(
                camera_id,
                source,
                Arc::clone(&self.resolver),
                self.reader_config.clone(),
                self.ctx.shutdown.clone(),
            )
            .map(|reader| Box::new(reader) as Box<dyn FrameSource>),
        };

        match frames {
            Ok(frames) => self.attach(camera_id, mode, frames),
            Err(e) => {
                error!("Failed to start reader for camera {}: {}", camera_id, e);
                self.closing(camera_id, mode, "SERVER ERROR")
            }
        }
    }

    /// Run a session over an arbitrary frame source
    pub fn attach(
        &self,
        camera_id: &str,
        mode: StreamMode,
        source: Box<dyn FrameSource>,
    ) -> StreamSession {
        StreamSession::live(
            camera_id,
            mode,
            Arc::clone(&self.ctx),
            source,
            ActiveStreamGuard::new(&self.active_streams),
        )
    }

    fn closing(&self, camera_id: &str, mode: StreamMode, message: &str) -> StreamSession {
        StreamSession::closing(camera_id, mode, Arc::clone(&self.ctx), message)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            reader_mode: self.reader_mode,
            active_streams: self.active_streams.load(Ordering::SeqCst),
            shared_readers: self.hub.active_readers(),
            events_recorded: self.ctx.recorder.events_recorded(),
            events_suppressed: self.ctx.recorder.events_suppressed(),
            capture_backend: self.resolver.backend_name(),
        }
    }

    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.ctx.shutdown
    }

    pub fn hub(&self) -> &ReaderHub {
        &self.hub
    }

    /// Stop every shared reader and wait up to `timeout` for each capture
    /// thread. Blocks; call from a blocking context. Returns the number of
    /// readers that did not exit in time.
    pub fn stop_readers(&self, timeout: Duration) -> usize {
        let readers = self.hub.stop_all();
        let stuck = readers
            .iter()
            .filter(|reader| !reader.join(timeout))
            .count();
        if stuck > 0 {
            warn!("{} readers still blocked in capture I/O", stuck);
        }
        stuck
    }
}

/// Assembles a [`VideoPipeline`]. Anything not supplied falls back to the
/// adapters named by the configuration.
pub struct VideoPipelineBuilder {
    config: Option<SentrycamConfig>,
    registry: Option<Arc<dyn CameraRegistry>>,
    backend: Option<Arc<dyn CaptureBackend>>,
    detector: Option<Arc<dyn Detector>>,
    store: Option<Arc<dyn EventStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    overlay: Option<OverlayRenderer>,
    shutdown: Option<ShutdownCoordinator>,
}

impl VideoPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            registry: None,
            backend: None,
            detector: None,
            store: None,
            notifier: None,
            overlay: None,
            shutdown: None,
        }
    }

    pub fn config(mut self, config: SentrycamConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn CameraRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Detection model. Results below the configured confidence threshold
    /// are filtered out.
    pub fn detector(mut self, detector: Arc<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn event_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn overlay(mut self, overlay: OverlayRenderer) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build(self) -> Result<VideoPipeline> {
        let config = self
            .config
            .ok_or_else(|| SentrycamError::component("pipeline", "Configuration is required"))?;

        let registry: Arc<dyn CameraRegistry> = match self.registry {
            Some(registry) => registry,
            None => Arc::new(ConfigCameraRegistry::from_entries(&config.cameras)?),
        };
        let backend = self.backend.unwrap_or_else(default_backend);
        let detector: Arc<dyn Detector> = Arc::new(ThresholdDetector::new(
            self.detector.unwrap_or_else(|| Arc::new(NullDetector)),
            config.events.confidence_threshold,
        ));
        let store: Arc<dyn EventStore> = self
            .store
            .unwrap_or_else(|| Arc::new(JsonlEventStore::new(&config.events.store_path)));
        let notifier: Arc<dyn Notifier> =
            self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier));
        let overlay = self
            .overlay
            .unwrap_or_else(|| OverlayRenderer::from_config(&config.overlay));
        let shutdown = self.shutdown.unwrap_or_default();

        let recorder = Arc::new(EventRecorder::new(
            &config.events,
            config.notifications.clone(),
            store,
            notifier,
        ));
        let resolver = Arc::new(SourceResolver::new(backend, config.source.clone()));
        let hub = ReaderHub::new(
            Arc::clone(&resolver),
            config.reader.clone(),
            shutdown.clone(),
        );

        info!(
            "Video pipeline ready: reader mode {:?}, backend {}, detection every {} frames",
            config.pipeline.reader_mode,
            resolver.backend_name(),
            config.pipeline.frame_skip
        );

        Ok(VideoPipeline {
            ctx: Arc::new(SessionContext {
                registry,
                detector,
                recorder,
                overlay: Arc::new(overlay),
                shutdown,
                config: config.pipeline.clone(),
            }),
            resolver,
            hub,
            reader_config: config.reader,
            reader_mode: config.pipeline.reader_mode,
            active_streams: Arc::new(AtomicUsize::new(0)),
        })
    }
}

impl Default for VideoPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
