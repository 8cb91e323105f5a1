use crate::detect::AnomalyKind;
use crate::error::{EventError, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Fields the pipeline supplies for a new event
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub camera_id: String,
    pub event_type: AnomalyKind,
    pub confidence: f32,
    pub description: String,
    pub image_path: String,
    /// Detection cycle time, also encoded in the snapshot filename
    pub created_at: DateTime<Utc>,
}

/// A persisted event. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub camera_id: String,
    pub event_type: AnomalyKind,
    pub confidence: f32,
    pub description: String,
    pub image_path: String,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    fn from_new(event: NewEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            camera_id: event.camera_id,
            event_type: event.event_type,
            confidence: event.confidence,
            description: event.description,
            image_path: event.image_path,
            created_at: event.created_at,
        }
    }
}

/// Destination for event records. Must tolerate concurrent calls.
pub trait EventStore: Send + Sync {
    fn create_event(&self, event: NewEvent) -> Result<EventRecord>;
}

/// Append-only JSON-lines file, one record per line
pub struct JsonlEventStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlEventStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record written so far, oldest first
    pub fn load(&self) -> Result<Vec<EventRecord>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

impl EventStore for JsonlEventStore {
    fn create_event(&self, event: NewEvent) -> Result<EventRecord> {
        let record = EventRecord::from_new(event);
        let line = serde_json::to_string(&record)?;

        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| EventError::Store {
                details: format!("cannot open {}: {}", self.path.display(), e),
            })?;
        writeln!(file, "{}", line)?;

        debug!("Appended event {} to {}", record.id, self.path.display());
        Ok(record)
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    records: Mutex<Vec<EventRecord>>,
    reject: bool,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that refuses every record
    pub fn rejecting() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl EventStore for MemoryEventStore {
    fn create_event(&self, event: NewEvent) -> Result<EventRecord> {
        if self.reject {
            return Err(EventError::Store {
                details: "store is read-only".to_string(),
            }
            .into());
        }
        let record = EventRecord::from_new(event);
        self.records.lock().push(record.clone());
        Ok(record)
    }
}
