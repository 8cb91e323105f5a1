use super::backend::{CaptureBackend, CaptureHandle, OpenRequest, OpenStrategy, OpenTarget};
use super::descriptor::{normalize_rtsp_url, CameraSource};
use crate::config::SourceConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Turns a [`CameraSource`] into a capture handle, picking the transport
/// strategy per source kind and falling back for RTSP.
///
/// Never fails outright: callers get a handle whose `is_open()` may be false
/// and apply their own reconnect policy.
pub struct SourceResolver {
    backend: Arc<dyn CaptureBackend>,
    config: SourceConfig,
}

impl SourceResolver {
    pub fn new(backend: Arc<dyn CaptureBackend>, config: SourceConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn open(&self, source: &CameraSource) -> Box<dyn CaptureHandle> {
        debug!("Resolving source {} via {}", source, self.backend.name());

        match source {
            CameraSource::WebcamIndex(index) => self.open_webcam(*index),
            CameraSource::NetworkStream(url) if source.is_rtsp() => self.open_rtsp(url),
            CameraSource::NetworkStream(url) => self.open_generic(url.clone()),
            CameraSource::FilePath(path) => self.open_generic(path.to_string_lossy().into_owned()),
        }
    }

    fn open_webcam(&self, index: u32) -> Box<dyn CaptureHandle> {
        info!("Opening webcam index {}", index);
        let mut handle = self.backend.open(&OpenRequest {
            target: OpenTarget::Device(index),
            strategy: OpenStrategy::NativeDevice,
            timeout: None,
        });
        if handle.is_open() {
            handle.set_buffer_size(1);
        } else {
            warn!("Webcam index {} did not open", index);
        }
        handle
    }

    fn open_rtsp(&self, url: &str) -> Box<dyn CaptureHandle> {
        let normalized = normalize_rtsp_url(url);
        let target = OpenTarget::Location(normalized);

        info!("Opening RTSP {} over TCP (low latency)", target);
        let mut handle = self.backend.open(&OpenRequest {
            target: target.clone(),
            strategy: OpenStrategy::RtspTcpLowLatency,
            timeout: Some(Duration::from_millis(self.config.tcp_timeout_ms)),
        });
        if verify(handle.as_mut()) {
            handle.set_buffer_size(1);
            info!("RTSP {} verified over TCP", target);
            return handle;
        }

        warn!(
            "RTSP {} failed verification over TCP, retrying with default transport",
            target
        );
        handle.release();

        let mut fallback = self.backend.open(&OpenRequest {
            target: target.clone(),
            strategy: OpenStrategy::RtspDefault,
            timeout: Some(Duration::from_millis(self.config.fallback_timeout_ms)),
        });
        if verify(fallback.as_mut()) {
            fallback.set_buffer_size(1);
            info!("RTSP {} verified with default transport", target);
        } else {
            warn!("RTSP {} failed verification with default transport", target);
        }
        fallback
    }

    fn open_generic(&self, location: String) -> Box<dyn CaptureHandle> {
        let target = OpenTarget::Location(location);
        info!("Opening generic source {}", target);
        let mut handle = self.backend.open(&OpenRequest {
            target,
            strategy: OpenStrategy::Generic,
            timeout: None,
        });
        if handle.is_open() && !handle.set_buffer_size(1) {
            debug!("Backend does not support limiting the buffer size");
        }
        handle
    }
}

/// An RTSP session only counts once it actually delivers a frame
fn verify(handle: &mut dyn CaptureHandle) -> bool {
    handle.is_open() && handle.read().is_some()
}
