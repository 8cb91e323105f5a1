use crate::config::CameraEntry;
use crate::error::Result;
use crate::source::CameraSource;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{info, warn};

/// Where the pipeline looks cameras up. Polled, never pushed.
pub trait CameraRegistry: Send + Sync {
    fn is_active(&self, camera_id: &str) -> bool;

    fn source_descriptor(&self, camera_id: &str) -> Option<String>;

    /// Classified source of a camera. Registries that classify at
    /// registration time should override this.
    fn source(&self, camera_id: &str) -> Option<CameraSource> {
        let descriptor = self.source_descriptor(camera_id)?;
        match CameraSource::parse(&descriptor) {
            Ok(source) => Some(source),
            Err(e) => {
                warn!("Camera {} has an unusable source: {}", camera_id, e);
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
struct RegisteredCamera {
    descriptor: String,
    source: CameraSource,
    active: bool,
}

/// Cameras from the configuration file, with a runtime-toggleable active flag
#[derive(Debug, Default)]
pub struct ConfigCameraRegistry {
    cameras: RwLock<HashMap<String, RegisteredCamera>>,
}

impl ConfigCameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[CameraEntry]) -> Result<Self> {
        let registry = Self::new();
        for entry in entries {
            registry.register(&entry.id, &entry.source, entry.active)?;
        }
        Ok(registry)
    }

    /// Add or replace a camera. The source is classified here, once.
    pub fn register(&self, camera_id: &str, descriptor: &str, active: bool) -> Result<()> {
        let source = CameraSource::parse(descriptor)?;
        info!("Registered camera {} -> {} (active: {})", camera_id.trim(), source, active);
        self.cameras.write().insert(
            camera_id.trim().to_string(),
            RegisteredCamera {
                descriptor: descriptor.trim().to_string(),
                source,
                active,
            },
        );
        Ok(())
    }

    /// Returns false if the camera is unknown
    pub fn set_active(&self, camera_id: &str, active: bool) -> bool {
        match self.cameras.write().get_mut(camera_id) {
            Some(camera) => {
                camera.active = active;
                info!("Camera {} is now {}", camera_id, if active { "active" } else { "inactive" });
                true
            }
            None => false,
        }
    }

    pub fn camera_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.cameras.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.cameras.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.read().is_empty()
    }
}

impl CameraRegistry for ConfigCameraRegistry {
    fn is_active(&self, camera_id: &str) -> bool {
        self.cameras
            .read()
            .get(camera_id)
            .map(|camera| camera.active)
            .unwrap_or(false)
    }

    fn source_descriptor(&self, camera_id: &str) -> Option<String> {
        self.cameras
            .read()
            .get(camera_id)
            .map(|camera| camera.descriptor.clone())
    }

    fn source(&self, camera_id: &str) -> Option<CameraSource> {
        self.cameras
            .read()
            .get(camera_id)
            .map(|camera| camera.source.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<CameraEntry> {
        vec![
            CameraEntry {
                id: "gate".to_string(),
                source: "rtsp://admin:x@cam/1".to_string(),
                active: true,
            },
            CameraEntry {
                id: "lab".to_string(),
                source: "0".to_string(),
                active: false,
            },
        ]
    }

    #[test]
    fn test_registry_from_config() {
        let registry = ConfigCameraRegistry::from_entries(&entries()).unwrap();

        assert_eq!(registry.camera_ids(), vec!["gate", "lab"]);
        assert!(registry.is_active("gate"));
        assert!(!registry.is_active("lab"));
        assert!(!registry.is_active("missing"));
        assert_eq!(registry.source("lab"), Some(CameraSource::WebcamIndex(0)));
        assert_eq!(
            registry.source_descriptor("gate").as_deref(),
            Some("rtsp://admin:x@cam/1")
        );
        assert!(registry.source("missing").is_none());
    }

    #[test]
    fn test_toggle_active_flag() {
        let registry = ConfigCameraRegistry::from_entries(&entries()).unwrap();

        assert!(registry.set_active("lab", true));
        assert!(registry.is_active("lab"));
        assert!(registry.set_active("gate", false));
        assert!(!registry.is_active("gate"));
        assert!(!registry.set_active("missing", true));
    }

    #[test]
    fn test_rejects_empty_source() {
        let registry = ConfigCameraRegistry::new();
        assert!(registry.register("bad", "  ", true).is_err());
        assert!(registry.is_empty());
    }
}
