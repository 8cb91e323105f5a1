use super::descriptor::redact_credentials;
use image::RgbImage;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// What to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenTarget {
    /// Local capture device index
    Device(u32),
    /// URL or filesystem path
    Location(String),
}

impl fmt::Display for OpenTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenTarget::Device(index) => write!(f, "device {}", index),
            OpenTarget::Location(location) => write!(f, "{}", redact_credentials(location)),
        }
    }
}

/// How to open it. Every option travels with the request, so one attempt
/// can never leave transport settings behind for the next open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenStrategy {
    /// Platform's fastest native device API
    NativeDevice,
    /// RTSP forced over TCP with low-latency decode flags
    RtspTcpLowLatency,
    /// RTSP with whatever transport the server negotiates
    RtspDefault,
    /// Default demuxer for files and generic URLs
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub target: OpenTarget,
    pub strategy: OpenStrategy,
    /// Connection timeout, when the strategy supports one
    pub timeout: Option<Duration>,
}

/// An opened (or failed) capture session.
///
/// Handles are owned by exactly one reader thread; `read` may block for up
/// to the backend's I/O timeout.
pub trait CaptureHandle: Send {
    /// False once the session failed to open, hit end-of-stream or errored
    fn is_open(&self) -> bool;

    /// Pull the next decoded frame, `None` on a failed read
    fn read(&mut self) -> Option<RgbImage>;

    /// Limit internal buffering to `frames`. Returns false if unsupported.
    fn set_buffer_size(&mut self, frames: u32) -> bool;

    /// Tear the session down. Safe to call more than once.
    fn release(&mut self);
}

/// Media framework that turns an [`OpenRequest`] into a [`CaptureHandle`].
///
/// `open` never fails: an unusable source yields a handle whose
/// `is_open()` is false.
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, request: &OpenRequest) -> Box<dyn CaptureHandle>;
}

/// Handle that was never opened
#[derive(Debug, Default)]
pub struct ClosedHandle;

impl CaptureHandle for ClosedHandle {
    fn is_open(&self) -> bool {
        false
    }

    fn read(&mut self) -> Option<RgbImage> {
        None
    }

    fn set_buffer_size(&mut self, _frames: u32) -> bool {
        false
    }

    fn release(&mut self) {}
}

/// Backend used when no media framework is compiled in
#[derive(Debug, Default)]
pub struct UnavailableBackend;

impl CaptureBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn open(&self, request: &OpenRequest) -> Box<dyn CaptureHandle> {
        warn!(
            "No capture backend available, cannot open {} (build with the `camera` feature on Linux)",
            request.target
        );
        Box::new(ClosedHandle)
    }
}
