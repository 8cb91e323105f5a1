use super::buffer::FrameBuffer;
use super::FrameSource;
use crate::config::ReaderConfig;
use crate::error::{CameraError, Result};
use crate::frame::{Frame, FrameSnapshot};
use crate::shutdown::ShutdownCoordinator;
use crate::source::{CameraSource, CaptureHandle, SourceResolver};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, trace, warn};

/// Lifecycle of a [`FrameReader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReaderState {
    Connecting = 0,
    Streaming = 1,
    Reconnecting = 2,
    /// Terminal
    Stopped = 3,
}

impl ReaderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReaderState::Connecting,
            1 => ReaderState::Streaming,
            2 => ReaderState::Reconnecting,
            _ => ReaderState::Stopped,
        }
    }
}

/// Owns one capture handle and keeps the latest frame of it in a
/// [`FrameBuffer`], reconnecting whenever the handle closes.
///
/// All I/O happens on a dedicated thread; `read()` only copies the last
/// published snapshot out from under the buffer lock.
pub struct FrameReader {
    shared: Arc<ReaderShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

struct ReaderShared {
    label: String,
    buffer: FrameBuffer,
    state: AtomicU8,
    stopped: AtomicBool,
    /// Dropping the sender wakes the capture thread out of a back-off sleep
    wake: Mutex<Option<Sender<()>>>,
}

impl ReaderShared {
    fn set_state(&self, state: ReaderState) {
        let previous = self.state.swap(state as u8, Ordering::AcqRel);
        if previous != state as u8 {
            debug!(
                "Reader {} {:?} -> {:?}",
                self.label,
                ReaderState::from_u8(previous),
                state
            );
        }
    }

    fn should_stop(&self, shutdown: &ShutdownCoordinator) -> bool {
        self.stopped.load(Ordering::Acquire) || shutdown.is_shutdown()
    }
}

impl FrameReader {
    /// Spawn the capture thread and return immediately.
    ///
    /// Opening the source happens on that thread, so this never blocks on
    /// the network or hardware.
    pub fn start(
        label: impl Into<String>,
        source: CameraSource,
        resolver: Arc<SourceResolver>,
        config: ReaderConfig,
        shutdown: ShutdownCoordinator,
    ) -> Result<Self> {
        let label = label.into();
        let (wake_tx, wake_rx) = channel::bounded::<()>(1);

        let shared = Arc::new(ReaderShared {
            label: label.clone(),
            buffer: FrameBuffer::new(),
            state: AtomicU8::new(ReaderState::Connecting as u8),
            stopped: AtomicBool::new(false),
            wake: Mutex::new(Some(wake_tx)),
        });

        info!("Starting frame reader {} for {}", label, source);

        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name(format!("reader-{}", label))
            .spawn(move || {
                capture_loop(thread_shared, wake_rx, source, resolver, config, shutdown)
            })
            .map_err(CameraError::Spawn)?;

        Ok(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn state(&self) -> ReaderState {
        ReaderState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn frames_published(&self) -> u64 {
        self.shared.buffer.frames_published()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for the capture thread to exit.
    /// Returns false if it is still running (e.g. stuck in a blocking read).
    pub fn join(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = self.thread.lock();
        let Some(handle) = slot.as_ref() else {
            return true;
        };

        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("Reader {} did not exit within {:?}", self.shared.label, timeout);
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        if let Some(handle) = slot.take() {
            if handle.join().is_err() {
                warn!("Reader {} thread panicked", self.shared.label);
            }
        }
        true
    }
}

impl FrameSource for FrameReader {
    fn read(&self) -> FrameSnapshot {
        self.shared.buffer.snapshot()
    }

    fn consecutive_failures(&self) -> u32 {
        self.shared.buffer.consecutive_failures()
    }

    /// Ask the capture thread to exit. The handle is released by that thread,
    /// never here, since it may be in the middle of a read on it.
    fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Stopping frame reader {}", self.shared.label);
        self.shared.wake.lock().take();
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep for `duration` unless a stop is requested first.
/// Returns true when the reader should exit.
fn back_off(wake: &Receiver<()>, duration: Duration) -> bool {
    !matches!(wake.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
}

fn capture_loop(
    shared: Arc<ReaderShared>,
    wake: Receiver<()>,
    source: CameraSource,
    resolver: Arc<SourceResolver>,
    config: ReaderConfig,
    shutdown: ShutdownCoordinator,
) {
    let read_retry = Duration::from_millis(config.read_retry_ms);
    let reconnect_delay = Duration::from_millis(config.reconnect_delay_ms);

    let mut handle: Box<dyn CaptureHandle> = resolver.open(&source);
    let mut next_frame_id = 0u64;

    loop {
        if shared.should_stop(&shutdown) {
            break;
        }

        if !handle.is_open() {
            shared.set_state(ReaderState::Reconnecting);
            handle.release();
            if back_off(&wake, reconnect_delay) || shared.should_stop(&shutdown) {
                break;
            }

            handle = resolver.open(&source);
            if !handle.is_open() {
                let failures = shared.buffer.record_failure();
                debug!(
                    "Reader {} reconnect failed ({} consecutive failures)",
                    shared.label, failures
                );
                continue;
            }
            info!("Reader {} reconnected to {}", shared.label, source);
            shared.buffer.reset_failures();
        }

        shared.set_state(ReaderState::Streaming);

        match handle.read() {
            Some(image) => {
                next_frame_id += 1;
                shared
                    .buffer
                    .publish(Frame::new(next_frame_id, SystemTime::now(), image));
                trace!("Reader {} published frame {}", shared.label, next_frame_id);
            }
            None => {
                let failures = shared.buffer.record_failure();
                trace!(
                    "Reader {} read failed ({} consecutive failures)",
                    shared.label,
                    failures
                );
                if back_off(&wake, read_retry) {
                    break;
                }
            }
        }
    }

    handle.release();
    shared.stopped.store(true, Ordering::Release);
    shared.set_state(ReaderState::Stopped);
    info!("Frame reader {} stopped", shared.label);
}
