//! Test doubles shared by the module test suites

use crate::config::NotificationSettings;
use crate::detect::{Detection, Detector};
use crate::error::{EventError, Result};
use crate::frame::{Frame, FrameSnapshot};
use crate::reader::FrameSource;
use crate::recorder::{EventRecord, Notifier};
use crate::source::{CaptureBackend, CaptureHandle, OpenRequest};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// What a scripted handle does once its queued reads run out
#[derive(Debug, Clone)]
pub enum Tail {
    /// Every read fails
    Fail,
    /// Every read returns a `width`x`height` frame filled with the read count
    Counting { width: u32, height: u32 },
}

/// Behaviour of one handle handed out by [`ScriptedBackend`]
#[derive(Debug, Clone)]
pub struct HandlePlan {
    pub open: bool,
    /// `None` entries are failed reads
    pub reads: VecDeque<Option<RgbImage>>,
    pub tail: Tail,
    pub read_delay: Option<Duration>,
}

impl HandlePlan {
    pub fn closed() -> Self {
        Self {
            open: false,
            reads: VecDeque::new(),
            tail: Tail::Fail,
            read_delay: None,
        }
    }

    pub fn streaming(width: u32, height: u32) -> Self {
        Self {
            open: true,
            reads: VecDeque::new(),
            tail: Tail::Counting { width, height },
            read_delay: Some(Duration::from_millis(1)),
        }
    }

    pub fn failing() -> Self {
        Self {
            open: true,
            reads: VecDeque::new(),
            tail: Tail::Fail,
            read_delay: None,
        }
    }

    pub fn with_reads(mut self, reads: Vec<Option<RgbImage>>) -> Self {
        self.reads = reads.into();
        self
    }
}

/// Counters shared by every handle of one backend
#[derive(Debug, Default)]
pub struct HandleStats {
    pub reads: AtomicUsize,
    pub releases: AtomicUsize,
    pub live: AtomicUsize,
}

/// Backend that replays a queue of [`HandlePlan`]s and records every request
pub struct ScriptedBackend {
    plans: Mutex<VecDeque<HandlePlan>>,
    fallback: HandlePlan,
    requests: Mutex<Vec<OpenRequest>>,
    pub stats: Arc<HandleStats>,
}

impl ScriptedBackend {
    /// Hand out `plans` in order, then `fallback` forever
    pub fn new(plans: Vec<HandlePlan>, fallback: HandlePlan) -> Self {
        Self {
            plans: Mutex::new(plans.into()),
            fallback,
            requests: Mutex::new(Vec::new()),
            stats: Arc::new(HandleStats::default()),
        }
    }

    pub fn always(plan: HandlePlan) -> Self {
        Self::new(Vec::new(), plan)
    }

    pub fn requests(&self) -> Vec<OpenRequest> {
        self.requests.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl CaptureBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open(&self, request: &OpenRequest) -> Box<dyn CaptureHandle> {
        self.requests.lock().push(request.clone());
        let plan = self
            .plans
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        self.stats.live.fetch_add(1, Ordering::SeqCst);
        Box::new(ScriptedHandle {
            plan,
            released: false,
            counter: 0,
            stats: Arc::clone(&self.stats),
        })
    }
}

struct ScriptedHandle {
    plan: HandlePlan,
    released: bool,
    counter: u32,
    stats: Arc<HandleStats>,
}

impl CaptureHandle for ScriptedHandle {
    fn is_open(&self) -> bool {
        self.plan.open && !self.released
    }

    fn read(&mut self) -> Option<RgbImage> {
        if !self.is_open() {
            return None;
        }
        if let Some(delay) = self.plan.read_delay {
            std::thread::sleep(delay);
        }
        self.stats.reads.fetch_add(1, Ordering::SeqCst);

        if let Some(outcome) = self.plan.reads.pop_front() {
            return outcome;
        }
        match self.plan.tail {
            Tail::Fail => None,
            Tail::Counting { width, height } => {
                self.counter = self.counter.wrapping_add(1);
                let fill = (self.counter % 256) as u8;
                Some(RgbImage::from_pixel(width, height, Rgb([fill, fill, fill])))
            }
        }
    }

    fn set_buffer_size(&mut self, _frames: u32) -> bool {
        true
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stats.releases.fetch_add(1, Ordering::SeqCst);
            self.stats.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ScriptedHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// In-memory [`FrameSource`] driven directly by a test
#[derive(Default)]
pub struct FakeFrameSource {
    snapshot: Mutex<FrameSnapshot>,
    failures: AtomicU32,
    /// Publish a fresh frame on every read
    auto_advance: Option<(u32, u32)>,
    next_id: AtomicU64,
    pub reads: AtomicUsize,
    pub stops: AtomicUsize,
}

impl FakeFrameSource {
    /// Nothing published yet
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A new `width`x`height` frame on every read
    pub fn streaming(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            auto_advance: Some((width, height)),
            ..Self::default()
        })
    }

    /// Reads fail and the failure streak is already `failures`
    pub fn failing(failures: u32) -> Arc<Self> {
        let source = Self::default();
        source.failures.store(failures, Ordering::SeqCst);
        Arc::new(source)
    }

    pub fn set_failures(&self, failures: u32) {
        self.failures.store(failures, Ordering::SeqCst);
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl FrameSource for FakeFrameSource {
    fn read(&self) -> FrameSnapshot {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some((width, height)) = self.auto_advance {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let frame = Frame::new(
                id,
                SystemTime::now(),
                RgbImage::from_pixel(width, height, Rgb([40, 40, 40])),
            );
            *self.snapshot.lock() = FrameSnapshot {
                success: true,
                frame: Some(Arc::new(frame)),
            };
        }
        self.snapshot.lock().clone()
    }

    fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Detector returning a fixed result and counting calls
pub struct CountingDetector {
    detections: Vec<Detection>,
    pub calls: AtomicUsize,
}

impl CountingDetector {
    pub fn new(detections: Vec<Detection>) -> Arc<Self> {
        Arc::new(Self {
            detections,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for CountingDetector {
    fn detect(&self, _image: &RgbImage) -> Vec<Detection> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.detections.clone()
    }
}

/// Detector that panics, standing in for a crashing model
pub struct PanickingDetector;

impl Detector for PanickingDetector {
    fn detect(&self, _image: &RgbImage) -> Vec<Detection> {
        panic!("model crashed");
    }
}

/// Notifier that keeps every record it was handed
#[derive(Default)]
pub struct RecordingNotifier {
    pub records: Mutex<Vec<EventRecord>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        Arc::new(notifier)
    }

    pub fn count(&self) -> usize {
        self.records.lock().len()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, record: &EventRecord, _settings: &NotificationSettings) -> Result<()> {
        self.records.lock().push(record.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(EventError::Notification {
                details: "webhook unreachable".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
