use super::encode::{encode_jpeg, multipart_part};
use super::overlay::OverlayRenderer;
use crate::config::PipelineConfig;
use crate::detect::{CycleSummary, Detection, Detector};
use crate::frame::Frame;
use crate::reader::FrameSource;
use crate::recorder::EventRecorder;
use crate::registry::CameraRegistry;
use crate::shutdown::ShutdownCoordinator;
use bytes::Bytes;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

pub(super) const PLACEHOLDER_QUALITY: u8 = 90;

/// Poll interval while no frame has been streamed yet
const STARTUP_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Detection, overlays and event recording
    Annotated,
    /// Frames only, for diagnostics
    Raw,
}

impl StreamMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamMode::Annotated => "annotated",
            StreamMode::Raw => "raw",
        }
    }
}

/// Collaborators shared by every session of a pipeline
pub(crate) struct SessionContext {
    pub(crate) registry: Arc<dyn CameraRegistry>,
    pub(crate) detector: Arc<dyn Detector>,
    pub(crate) recorder: Arc<EventRecorder>,
    pub(crate) overlay: Arc<OverlayRenderer>,
    pub(crate) shutdown: ShutdownCoordinator,
    pub(crate) config: PipelineConfig,
}

impl SessionContext {
    pub(crate) fn placeholder_part(&self, message: &str) -> Option<Bytes> {
        match encode_jpeg(&self.overlay.placeholder(message), PLACEHOLDER_QUALITY) {
            Ok(jpeg) => Some(multipart_part(&jpeg)),
            Err(e) => {
                warn!("Failed to encode '{}' placeholder: {}", message, e);
                None
            }
        }
    }
}

/// Counts a session as active for its whole lifetime
pub(crate) struct ActiveStreamGuard(Arc<AtomicUsize>);

impl ActiveStreamGuard {
    pub(crate) fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveStreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Detections of the last detection cycle, redrawn until the next one
#[derive(Debug, Default)]
struct DetectionCycle {
    detections: Vec<Detection>,
    summary: CycleSummary,
}

impl DetectionCycle {
    fn new(detections: Vec<Detection>) -> Self {
        let summary = CycleSummary::from_detections(&detections);
        Self {
            detections,
            summary,
        }
    }
}

enum Step {
    Emit(Bytes),
    /// End the session, optionally after one last part
    Finish(Option<Bytes>),
    Idle(Duration),
    Skip,
}

/// One client's stream: pulls the latest frame, annotates, encodes and hands
/// out multipart parts until a terminal condition.
///
/// Dropping the session (e.g. when the HTTP client disconnects) releases its
/// frame source exactly once.
pub struct StreamSession {
    camera_id: String,
    mode: StreamMode,
    ctx: Arc<SessionContext>,
    source: Option<Box<dyn FrameSource>>,
    /// Sent once before the session ends, e.g. the OFFLINE frame
    final_part: Option<Bytes>,
    finished: bool,
    cycles: u64,
    frame_count: u64,
    last_frame_id: Option<u64>,
    last_placeholder: Option<Instant>,
    cycle: Arc<DetectionCycle>,
    parts_sent: u64,
    _active: Option<ActiveStreamGuard>,
}

impl StreamSession {
    pub(crate) fn live(
        camera_id: &str,
        mode: StreamMode,
        ctx: Arc<SessionContext>,
        source: Box<dyn FrameSource>,
        active: ActiveStreamGuard,
    ) -> Self {
        info!("Stream for camera {} started ({})", camera_id, mode.as_str());
        Self {
            camera_id: camera_id.to_string(),
            mode,
            ctx,
            source: Some(source),
            final_part: None,
            finished: false,
            cycles: 0,
            frame_count: 0,
            last_frame_id: None,
            last_placeholder: None,
            cycle: Arc::new(DetectionCycle::default()),
            parts_sent: 0,
            _active: Some(active),
        }
    }

    /// A session that only sends `message` and ends
    pub(crate) fn closing(
        camera_id: &str,
        mode: StreamMode,
        ctx: Arc<SessionContext>,
        message: &str,
    ) -> Self {
        let final_part = ctx.placeholder_part(message);
        Self {
            camera_id: camera_id.to_string(),
            mode,
            ctx,
            source: None,
            final_part,
            finished: false,
            cycles: 0,
            frame_count: 0,
            last_frame_id: None,
            last_placeholder: None,
            cycle: Arc::new(DetectionCycle::default()),
            parts_sent: 0,
            _active: None,
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    /// Frames taken from the reader so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next multipart part, or `None` once the stream is over
    pub async fn next_part(&mut self) -> Option<Bytes> {
        if let Some(part) = self.final_part.take() {
            self.finish();
            return Some(self.sent(part));
        }
        if self.finished {
            return None;
        }

        loop {
            match self.step().await {
                Step::Emit(part) => return Some(self.sent(part)),
                Step::Finish(part) => {
                    self.finish();
                    return part.map(|part| self.sent(part));
                }
                Step::Idle(delay) => tokio::time::sleep(delay).await,
                Step::Skip => {}
            }
        }
    }

    fn sent(&mut self, part: Bytes) -> Bytes {
        self.parts_sent += 1;
        part
    }

    async fn step(&mut self) -> Step {
        if self.ctx.shutdown.is_shutdown() {
            info!("Shutdown signal, ending stream for camera {}", self.camera_id);
            return Step::Finish(None);
        }

        self.cycles += 1;
        let check_every = u64::from(self.ctx.config.active_check_interval.max(1));
        if self.cycles % check_every == 0 && !self.ctx.registry.is_active(&self.camera_id) {
            info!("Camera {} was deactivated, ending stream", self.camera_id);
            return Step::Finish(None);
        }

        let Some(source) = self.source.as_ref() else {
            return Step::Finish(None);
        };

        let failures = source.consecutive_failures();
        if failures >= self.ctx.config.max_consecutive_fails {
            warn!(
                "Camera {} connection lost after {} failed reads",
                self.camera_id, failures
            );
            return Step::Finish(self.ctx.placeholder_part("CONNECTION LOST"));
        }

        let snapshot = source.read();
        let Some(frame) = snapshot.usable().cloned() else {
            return self.waiting();
        };

        if self.last_frame_id == Some(frame.id) {
            return Step::Idle(self.idle_poll());
        }
        self.last_frame_id = Some(frame.id);
        self.frame_count += 1;

        let run_detection = self.mode == StreamMode::Annotated
            && self.frame_count % u64::from(self.ctx.config.frame_skip.max(1)) == 0;

        let job = RenderJob {
            ctx: Arc::clone(&self.ctx),
            camera_id: self.camera_id.clone(),
            frame,
            annotate: self.mode == StreamMode::Annotated,
            run_detection,
            cycle: Arc::clone(&self.cycle),
        };

        match tokio::task::spawn_blocking(move || job.run()).await {
            Ok(rendered) => {
                if let Some(cycle) = rendered.cycle {
                    self.cycle = cycle;
                }
                match rendered.jpeg {
                    Some(jpeg) => Step::Emit(multipart_part(&jpeg)),
                    None => Step::Skip,
                }
            }
            Err(e) => {
                error!("Frame processing for camera {} failed: {}", self.camera_id, e);
                Step::Finish(self.ctx.placeholder_part("SERVER ERROR"))
            }
        }
    }

    /// No usable frame yet: a throttled LOADING frame before the first
    /// streamed frame, silent polling afterwards
    fn waiting(&mut self) -> Step {
        if self.frame_count > 0 {
            return Step::Idle(self.idle_poll());
        }

        let interval = Duration::from_millis(self.ctx.config.placeholder_interval_ms);
        let due = self
            .last_placeholder
            .map(|sent| sent.elapsed() >= interval)
            .unwrap_or(true);
        if due {
            self.last_placeholder = Some(Instant::now());
            if let Some(part) = self.ctx.placeholder_part("LOADING...") {
                return Step::Emit(part);
            }
        }
        Step::Idle(STARTUP_POLL)
    }

    fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.ctx.config.idle_poll_ms.max(1))
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(source) = self.source.take() {
            source.stop();
            info!(
                "Stream for camera {} released after {} frames ({} parts sent)",
                self.camera_id, self.frame_count, self.parts_sent
            );
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.source.is_some() {
            debug!("Client left stream for camera {}", self.camera_id);
        }
        self.finish();
    }
}

struct Rendered {
    jpeg: Option<Vec<u8>>,
    /// Set when this frame ran a detection cycle
    cycle: Option<Arc<DetectionCycle>>,
}

/// Per-frame CPU work, run on the blocking pool
struct RenderJob {
    ctx: Arc<SessionContext>,
    camera_id: String,
    frame: Arc<Frame>,
    annotate: bool,
    run_detection: bool,
    cycle: Arc<DetectionCycle>,
}

impl RenderJob {
    fn run(self) -> Rendered {
        let (width, height) = self.ctx.config.stream_resolution;
        let mut image = self.frame.resized(width, height);
        let mut fresh_cycle = None;

        if self.annotate {
            let cycle = if self.run_detection {
                let detections = self.ctx.detector.detect(&image);
                trace!(
                    "Camera {} frame {}: {} detections",
                    self.camera_id,
                    self.frame.id,
                    detections.len()
                );
                let cycle = Arc::new(DetectionCycle::new(detections));
                fresh_cycle = Some(Arc::clone(&cycle));
                cycle
            } else {
                self.cycle
            };

            self.ctx.overlay.draw_detections(&mut image, &cycle.detections);
            if self.run_detection {
                self.ctx
                    .recorder
                    .record_cycle(&self.camera_id, &cycle.summary, &image, Utc::now());
            }
            self.ctx.overlay.draw_info(&mut image, &self.camera_id, &cycle.summary);
        }

        let jpeg = match encode_jpeg(&image, self.ctx.config.jpeg_quality) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                warn!(
                    "Dropping frame {} of camera {}: {}",
                    self.frame.id, self.camera_id, e
                );
                None
            }
        };

        Rendered {
            jpeg,
            cycle: fresh_cycle,
        }
    }
}
