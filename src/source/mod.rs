//! Source classification and capture backends

mod backend;
mod descriptor;
mod resolver;

#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;


pub use backend::{
    CaptureBackend, CaptureHandle, ClosedHandle, OpenRequest, OpenStrategy, OpenTarget,
    UnavailableBackend,
};
pub use descriptor::{normalize_rtsp_url, redact_credentials, CameraSource};
pub use resolver::SourceResolver;

#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GstreamerBackend;

use std::sync::Arc;
use tracing::{info, warn};

/// The best capture backend compiled into this build
pub fn default_backend() -> Arc<dyn CaptureBackend> {
    #[cfg(all(feature = "camera", target_os = "linux"))]
    {
        match GstreamerBackend::new() {
            Ok(backend) => {
                info!("Using GStreamer capture backend");
                return Arc::new(backend);
            }
            Err(e) => warn!("GStreamer unavailable, falling back: {}", e),
        }
    }

    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    info!("Built without a capture backend");

    warn!("Cameras will report as not open");
    Arc::new(UnavailableBackend)
}
