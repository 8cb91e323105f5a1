use crate::frame::{Frame, FrameSnapshot};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Single-slot latest-frame buffer.
///
/// One writer (the reader thread) swaps whole `Arc<Frame>`s in under the
/// lock, so any number of readers see either the previous or the next
/// complete frame, never a partially written one.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    slot: Mutex<Slot>,
    published: AtomicU64,
}

#[derive(Debug, Default)]
struct Slot {
    success: bool,
    frame: Option<Arc<Frame>>,
    consecutive_failures: u32,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a good frame and clear the failure streak
    pub fn publish(&self, frame: Frame) {
        let frame = Arc::new(frame);
        {
            let mut slot = self.slot.lock();
            slot.success = true;
            slot.frame = Some(frame);
            slot.consecutive_failures = 0;
        }
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed read. The last good frame stays in the slot.
    /// Returns the updated failure streak.
    pub fn record_failure(&self) -> u32 {
        let mut slot = self.slot.lock();
        slot.success = false;
        slot.consecutive_failures = slot.consecutive_failures.saturating_add(1);
        slot.consecutive_failures
    }

    pub fn reset_failures(&self) {
        self.slot.lock().consecutive_failures = 0;
    }

    pub fn snapshot(&self) -> FrameSnapshot {
        let slot = self.slot.lock();
        FrameSnapshot {
            success: slot.success,
            frame: slot.frame.clone(),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.slot.lock().consecutive_failures
    }

    pub fn frames_published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
