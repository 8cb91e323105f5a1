use super::store::EventRecord;
use crate::config::NotificationSettings;
use crate::error::Result;
use tracing::{debug, info};

/// Fire-and-forget delivery of new events.
///
/// Errors are logged by the caller and never reach the stream.
pub trait Notifier: Send + Sync {
    fn notify(&self, record: &EventRecord, settings: &NotificationSettings) -> Result<()>;
}

/// Writes events to the log instead of an external channel
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, record: &EventRecord, settings: &NotificationSettings) -> Result<()> {
        if !settings.enabled {
            debug!("Notifications disabled, skipping event {}", record.id);
            return Ok(());
        }

        info!(
            event_id = %record.id,
            camera_id = %record.camera_id,
            event_type = %record.event_type,
            confidence = record.confidence,
            image = %record.image_path,
            "{}",
            record.description
        );
        Ok(())
    }
}
