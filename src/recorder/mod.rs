//! Cooldown-gated event persistence.
//!
//! Once per detection cycle the stream loop hands the recorder its summary
//! and the annotated frame. The recorder decides whether the cycle becomes
//! an event, writes the snapshot, stores the record and notifies.

mod notify;
mod store;

#[cfg(test)]
mod tests;

pub use notify::{Notifier, TracingNotifier};
pub use store::{EventRecord, EventStore, JsonlEventStore, MemoryEventStore, NewEvent};

use crate::config::{EventsConfig, NotificationSettings};
use crate::detect::{AnomalyKind, CycleSummary};
use crate::error::{EventError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SNAPSHOT_QUALITY: u8 = 95;

pub struct EventRecorder {
    store: Arc<dyn EventStore>,
    notifier: Arc<dyn Notifier>,
    notifications: NotificationSettings,
    media_dir: PathBuf,
    cooldown: ChronoDuration,
    /// Camera id -> time of its last event
    last_event: Mutex<HashMap<String, DateTime<Utc>>>,
    recorded: AtomicU64,
    suppressed: AtomicU64,
}

impl EventRecorder {
    pub fn new(
        config: &EventsConfig,
        notifications: NotificationSettings,
        store: Arc<dyn EventStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            notifier,
            notifications,
            media_dir: PathBuf::from(&config.media_dir),
            cooldown: ChronoDuration::seconds(config.cooldown_seconds as i64),
            last_event: Mutex::new(HashMap::new()),
            recorded: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Evaluate one detection cycle.
    ///
    /// Returns the new record, or `None` when the cycle had no anomaly, fell
    /// inside the camera's cooldown, or could not be persisted.
    pub fn record_cycle(
        &self,
        camera_id: &str,
        summary: &CycleSummary,
        snapshot: &RgbImage,
        now: DateTime<Utc>,
    ) -> Option<EventRecord> {
        let kind = summary.anomaly()?;
        let previous = self.reserve(camera_id, now)?;

        match self.persist(camera_id, kind, summary, snapshot, now) {
            Ok(record) => {
                self.recorded.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Recorded {} event for camera {} ({:.2}): {}",
                    kind, camera_id, record.confidence, record.image_path
                );
                if let Err(e) = self.notifier.notify(&record, &self.notifications) {
                    warn!("Notification for event {} failed: {}", record.id, e);
                }
                Some(record)
            }
            Err(e) => {
                warn!("Failed to persist {} event for camera {}: {}", kind, camera_id, e);
                self.restore(camera_id, now, previous);
                None
            }
        }
    }

    /// Claim the cooldown slot. Check and update happen under one lock so two
    /// streams of the same camera can't both pass.
    /// Returns `None` if suppressed, else the previous timestamp.
    fn reserve(&self, camera_id: &str, now: DateTime<Utc>) -> Option<Option<DateTime<Utc>>> {
        let mut last_event = self.last_event.lock();
        if let Some(last) = last_event.get(camera_id) {
            if now.signed_duration_since(*last) <= self.cooldown {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                debug!("Event for camera {} suppressed by cooldown", camera_id);
                return None;
            }
        }
        Some(last_event.insert(camera_id.to_string(), now))
    }

    fn restore(&self, camera_id: &str, reserved: DateTime<Utc>, previous: Option<DateTime<Utc>>) {
        let mut last_event = self.last_event.lock();
        // Leave the slot alone if a later cycle already took it
        if last_event.get(camera_id) != Some(&reserved) {
            return;
        }
        match previous {
            Some(previous) => {
                last_event.insert(camera_id.to_string(), previous);
            }
            None => {
                last_event.remove(camera_id);
            }
        }
    }

    fn persist(
        &self,
        camera_id: &str,
        kind: AnomalyKind,
        summary: &CycleSummary,
        snapshot: &RgbImage,
        now: DateTime<Utc>,
    ) -> Result<EventRecord> {
        let filename = snapshot_filename(camera_id, now);
        write_snapshot(&self.media_dir.join(&filename), snapshot)?;

        self.store.create_event(NewEvent {
            camera_id: camera_id.to_string(),
            event_type: kind,
            confidence: summary.best_confidence,
            description: summary.description(),
            image_path: format!("media/{}", filename),
            created_at: now,
        })
    }

    /// Time of the last event for a camera
    pub fn last_event(&self, camera_id: &str) -> Option<DateTime<Utc>> {
        self.last_event.lock().get(camera_id).copied()
    }

    pub fn events_recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    pub fn events_suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }
}

/// `{camera}_{unix seconds}.jpg`, with path separators in the id replaced
pub(crate) fn snapshot_filename(camera_id: &str, now: DateTime<Utc>) -> String {
    let safe: String = camera_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}.jpg", safe, now.timestamp())
}

fn write_snapshot(path: &Path, image: &RgbImage) -> Result<()> {
    let snapshot_error = |details: String| EventError::Snapshot {
        path: path.display().to_string(),
        details,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| snapshot_error(e.to_string()))?;
    }
    let file = fs::File::create(path).map_err(|e| snapshot_error(e.to_string()))?;
    let mut writer = BufWriter::new(file);

    JpegEncoder::new_with_quality(&mut writer, SNAPSHOT_QUALITY)
        .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
        .map_err(|e| snapshot_error(e.to_string()))?;
    writer.flush().map_err(|e| snapshot_error(e.to_string()))?;

    debug!("Wrote snapshot {}", path.display());
    Ok(())
}
