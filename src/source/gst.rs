use super::backend::{CaptureBackend, CaptureHandle, ClosedHandle, OpenRequest, OpenStrategy, OpenTarget};
use crate::error::{CameraError, Result};
use gstreamer::prelude::*;
use gstreamer::{ClockTime, Pipeline};
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use image::RgbImage;
use std::cell::Cell;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

const SINK: &str = "videoconvert ! video/x-raw,format=RGB ! \
                    appsink name=sink sync=false max-buffers=1 drop=true enable-last-sample=false";

/// Longest a single `read` waits for a sample
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// GStreamer-backed capture
pub struct GstreamerBackend;

impl GstreamerBackend {
    pub fn new() -> Result<Self> {
        gstreamer::init().map_err(|e| CameraError::BackendUnavailable {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;
        Ok(Self)
    }
}

impl CaptureBackend for GstreamerBackend {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn open(&self, request: &OpenRequest) -> Box<dyn CaptureHandle> {
        match GstCaptureHandle::open(request) {
            Ok(handle) => Box::new(handle),
            Err(e) => {
                warn!("Failed to open {}: {}", request.target, e);
                Box::new(ClosedHandle)
            }
        }
    }
}

/// Build the launch line for a request
pub(crate) fn pipeline_description(request: &OpenRequest) -> String {
    let timeout_us = request
        .timeout
        .map(|t| t.as_micros() as u64)
        .unwrap_or(0);

    match (&request.target, request.strategy) {
        (OpenTarget::Device(index), _) => {
            format!("v4l2src device=/dev/video{} ! decodebin ! {}", index, SINK)
        }
        (OpenTarget::Location(url), OpenStrategy::RtspTcpLowLatency) => format!(
            "rtspsrc location=\"{}\" protocols=tcp latency=0 drop-on-latency=true \
             buffer-mode=none tcp-timeout={} ! decodebin ! {}",
            url, timeout_us, SINK
        ),
        (OpenTarget::Location(url), OpenStrategy::RtspDefault) => format!(
            "rtspsrc location=\"{}\" tcp-timeout={} timeout={} ! decodebin ! {}",
            url, timeout_us, timeout_us, SINK
        ),
        (OpenTarget::Location(location), _) if location.contains("://") => {
            format!("uridecodebin uri=\"{}\" ! {}", location, SINK)
        }
        (OpenTarget::Location(path), _) => {
            format!("filesrc location=\"{}\" ! decodebin ! {}", path, SINK)
        }
    }
}

struct GstCaptureHandle {
    pipeline: Option<Pipeline>,
    appsink: Option<AppSink>,
    failed: Cell<bool>,
}

impl GstCaptureHandle {
    fn open(request: &OpenRequest) -> Result<Self> {
        let description = pipeline_description(request);
        debug!("Creating GStreamer pipeline for {}", request.target);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Configuration {
                details: "appsink element missing from pipeline".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to start pipeline: {}", e),
            })?;

        let wait = request.timeout.unwrap_or(Duration::from_secs(5));
        let (result, _, _) = pipeline.state(ClockTime::from_mseconds(wait.as_millis() as u64));
        if let Err(e) = result {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CameraError::CaptureStream {
                details: format!("Pipeline failed to reach Playing: {}", e),
            }
            .into());
        }

        Ok(Self {
            pipeline: Some(pipeline),
            appsink: Some(appsink),
            failed: Cell::new(false),
        })
    }

    fn poll_bus(&self) {
        let Some(bus) = self.pipeline.as_ref().and_then(|p| p.bus()) else {
            return;
        };
        while let Some(message) = bus.pop() {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    error!(
                        "GStreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    );
                    self.failed.set(true);
                }
                MessageView::Eos(..) => {
                    debug!("GStreamer pipeline reached end of stream");
                    self.failed.set(true);
                }
                _ => {}
            }
        }
    }
}

impl CaptureHandle for GstCaptureHandle {
    fn is_open(&self) -> bool {
        self.poll_bus();
        self.pipeline.is_some() && !self.failed.get()
    }

    fn read(&mut self) -> Option<RgbImage> {
        if !self.is_open() {
            return None;
        }
        let appsink = self.appsink.as_ref()?;

        let Some(sample) =
            appsink.try_pull_sample(ClockTime::from_mseconds(READ_TIMEOUT.as_millis() as u64))
        else {
            if appsink.is_eos() {
                self.failed.set(true);
            }
            return None;
        };

        match sample_to_image(&sample) {
            Ok(image) => {
                trace!("Pulled {}x{} frame", image.width(), image.height());
                Some(image)
            }
            Err(e) => {
                warn!("Dropping undecodable sample: {}", e);
                None
            }
        }
    }

    fn set_buffer_size(&mut self, frames: u32) -> bool {
        match &self.appsink {
            Some(appsink) => {
                appsink.set_max_buffers(frames.max(1));
                appsink.set_drop(true);
                true
            }
            None => false,
        }
    }

    fn release(&mut self) {
        self.appsink = None;
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop pipeline: {}", e);
            }
        }
    }
}

impl Drop for GstCaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

fn sample_to_image(sample: &gstreamer::Sample) -> Result<RgbImage> {
    let stream_error = |details: &str| CameraError::CaptureStream {
        details: details.to_string(),
    };

    let buffer = sample.buffer().ok_or_else(|| stream_error("No buffer in sample"))?;
    let caps = sample.caps().ok_or_else(|| stream_error("No caps in sample"))?;
    let info = VideoInfo::from_caps(caps).map_err(|e| CameraError::CaptureStream {
        details: format!("Failed to get video info: {}", e),
    })?;

    let width = info.width();
    let height = info.height();
    let row_bytes = width as usize * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer
        .map_readable()
        .map_err(|e| CameraError::CaptureStream {
            details: format!("Failed to map buffer: {}", e),
        })?;
    let data = map.as_slice();

    let pixels = if stride == row_bytes {
        data.get(..row_bytes * height as usize)
            .ok_or_else(|| stream_error("Buffer shorter than frame"))?
            .to_vec()
    } else {
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            pixels.extend_from_slice(
                data.get(start..start + row_bytes)
                    .ok_or_else(|| stream_error("Buffer row out of bounds"))?,
            );
        }
        pixels
    };

    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| stream_error("Pixel buffer does not match frame size").into())
}
