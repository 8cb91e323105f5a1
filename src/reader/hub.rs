use super::frame_reader::FrameReader;
use super::FrameSource;
use crate::config::ReaderConfig;
use crate::error::Result;
use crate::frame::FrameSnapshot;
use crate::shutdown::ShutdownCoordinator;
use crate::source::{CameraSource, SourceResolver};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One [`FrameReader`] per camera id, shared by every stream of that camera.
///
/// Each subscriber holds a [`SharedReader`] lease; the reader starts with the
/// first lease and is stopped when the last one is released, so N viewers
/// cost one capture session instead of N.
#[derive(Clone)]
pub struct ReaderHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    resolver: Arc<SourceResolver>,
    config: ReaderConfig,
    shutdown: ShutdownCoordinator,
    readers: Mutex<HashMap<String, HubEntry>>,
}

struct HubEntry {
    reader: Arc<FrameReader>,
    source: CameraSource,
    subscribers: usize,
}

impl ReaderHub {
    pub fn new(
        resolver: Arc<SourceResolver>,
        config: ReaderConfig,
        shutdown: ShutdownCoordinator,
    ) -> Self {
        Self {
            inner: Arc::new(HubInner {
                resolver,
                config,
                shutdown,
                readers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Join the shared reader of `camera_id`, starting it if needed
    pub fn subscribe(&self, camera_id: &str, source: &CameraSource) -> Result<SharedReader> {
        let mut readers = self.inner.readers.lock();

        if let Some(entry) = readers.get_mut(camera_id) {
            if entry.source != *source {
                warn!(
                    "Camera {} source changed to {} while its reader is shared; keeping {} until the last viewer leaves",
                    camera_id, source, entry.source
                );
            }
            entry.subscribers += 1;
            debug!(
                "Camera {} reader now has {} subscribers",
                camera_id, entry.subscribers
            );
            return Ok(self.lease(camera_id, Arc::clone(&entry.reader)));
        }

        let reader = Arc::new(FrameReader::start(
            camera_id,
            source.clone(),
            Arc::clone(&self.inner.resolver),
            self.inner.config.clone(),
            self.inner.shutdown.clone(),
        )?);
        readers.insert(
            camera_id.to_string(),
            HubEntry {
                reader: Arc::clone(&reader),
                source: source.clone(),
                subscribers: 1,
            },
        );
        info!("Started shared reader for camera {}", camera_id);

        Ok(self.lease(camera_id, reader))
    }

    fn lease(&self, camera_id: &str, reader: Arc<FrameReader>) -> SharedReader {
        SharedReader {
            camera_id: camera_id.to_string(),
            reader,
            hub: Arc::clone(&self.inner),
            released: AtomicBool::new(false),
        }
    }

    /// Number of cameras with a running shared reader
    pub fn active_readers(&self) -> usize {
        self.inner.readers.lock().len()
    }

    pub fn subscriber_count(&self, camera_id: &str) -> usize {
        self.inner
            .readers
            .lock()
            .get(camera_id)
            .map(|entry| entry.subscribers)
            .unwrap_or(0)
    }

    /// The running reader of a camera, if any
    pub fn reader(&self, camera_id: &str) -> Option<Arc<FrameReader>> {
        self.inner
            .readers
            .lock()
            .get(camera_id)
            .map(|entry| Arc::clone(&entry.reader))
    }

    /// Stop every reader regardless of subscribers. Used at shutdown.
    pub fn stop_all(&self) -> Vec<Arc<FrameReader>> {
        let drained: Vec<_> = self.inner.readers.lock().drain().collect();
        drained
            .into_iter()
            .map(|(camera_id, entry)| {
                debug!("Stopping shared reader for camera {}", camera_id);
                entry.reader.stop();
                entry.reader
            })
            .collect()
    }
}

impl HubInner {
    fn release(&self, camera_id: &str, reader: &Arc<FrameReader>) {
        let mut readers = self.readers.lock();
        let Some(entry) = readers.get_mut(camera_id) else {
            return;
        };
        // The entry may belong to a newer reader if this one was force-stopped
        if !Arc::ptr_eq(&entry.reader, reader) {
            return;
        }

        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0 {
            if let Some(entry) = readers.remove(camera_id) {
                info!("Last viewer left camera {}, stopping shared reader", camera_id);
                entry.reader.stop();
            }
        }
    }
}

/// A stream's lease on a shared reader
pub struct SharedReader {
    camera_id: String,
    reader: Arc<FrameReader>,
    hub: Arc<HubInner>,
    released: AtomicBool,
}

impl FrameSource for SharedReader {
    fn read(&self) -> FrameSnapshot {
        self.reader.read()
    }

    fn consecutive_failures(&self) -> u32 {
        self.reader.consecutive_failures()
    }

    /// Give the lease back; the reader itself only stops with the last lease
    fn stop(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.hub.release(&self.camera_id, &self.reader);
        }
    }
}

impl Drop for SharedReader {
    fn drop(&mut self) {
        self.stop();
    }
}
