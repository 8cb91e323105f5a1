use super::*;
use crate::detect::{Detection, Label};
use crate::testing::RecordingNotifier;
use chrono::TimeZone;
use image::Rgb;
use std::sync::Barrier;

fn events_config(media_dir: &Path) -> EventsConfig {
    EventsConfig {
        cooldown_seconds: 15,
        media_dir: media_dir.to_string_lossy().into_owned(),
        confidence_threshold: 0.4,
        store_path: media_dir.join("events.jsonl").to_string_lossy().into_owned(),
    }
}

fn recorder(
    media_dir: &Path,
    store: Arc<dyn EventStore>,
    notifier: Arc<RecordingNotifier>,
) -> EventRecorder {
    EventRecorder::new(
        &events_config(media_dir),
        NotificationSettings { enabled: true },
        store,
        notifier,
    )
}

fn summary(detections: &[Detection]) -> CycleSummary {
    CycleSummary::from_detections(detections)
}

fn person(confidence: f32) -> Detection {
    Detection::new(5, 5, 40, 80, Label::Person, confidence)
}

fn phone(confidence: f32) -> Detection {
    Detection::new(10, 10, 20, 30, Label::Phone, confidence)
}

fn frame() -> RgbImage {
    RgbImage::from_pixel(64, 36, Rgb([90, 120, 30]))
}

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
}

#[test]
fn test_cooldown_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEventStore::new());
    let notifier = RecordingNotifier::new();
    let recorder = recorder(dir.path(), store.clone(), notifier.clone());

    let first = recorder
        .record_cycle("gate", &summary(&[phone(0.9)]), &frame(), at(0))
        .unwrap();
    assert_eq!(first.event_type, AnomalyKind::MobilePhone);
    assert_eq!(first.created_at, at(0));
    assert_eq!(
        first.image_path,
        format!("media/gate_{}.jpg", at(0).timestamp())
    );
    assert_eq!(first.confidence, 0.9);

    assert!(recorder
        .record_cycle("gate", &summary(&[person(0.7)]), &frame(), at(5))
        .is_none());

    let second = recorder
        .record_cycle("gate", &summary(&[person(0.6)]), &frame(), at(16))
        .unwrap();
    assert_eq!(second.event_type, AnomalyKind::Intrusion);
    assert_eq!(second.confidence, 0.6);

    assert_eq!(store.len(), 2);
    assert_eq!(notifier.count(), 2);
    assert_eq!(recorder.events_recorded(), 2);
    assert_eq!(recorder.events_suppressed(), 1);
}

#[test]
fn test_cooldown_boundary_is_inclusive() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEventStore::new());
    let recorder = recorder(dir.path(), store.clone(), RecordingNotifier::new());

    assert!(recorder
        .record_cycle("gate", &summary(&[person(0.5)]), &frame(), at(0))
        .is_some());
    assert!(recorder
        .record_cycle("gate", &summary(&[person(0.5)]), &frame(), at(15))
        .is_none());
    assert!(recorder
        .record_cycle("gate", &summary(&[person(0.5)]), &frame(), at(31))
        .is_some());
    assert_eq!(store.len(), 2);
}

#[test]
fn test_cooldown_is_per_camera() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEventStore::new());
    let recorder = recorder(dir.path(), store.clone(), RecordingNotifier::new());

    assert!(recorder
        .record_cycle("gate", &summary(&[person(0.5)]), &frame(), at(0))
        .is_some());
    assert!(recorder
        .record_cycle("lobby", &summary(&[person(0.5)]), &frame(), at(1))
        .is_some());
    assert_eq!(store.len(), 2);
}

#[test]
fn test_no_anomaly_records_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEventStore::new());
    let recorder = recorder(dir.path(), store.clone(), RecordingNotifier::new());

    assert!(recorder
        .record_cycle("gate", &summary(&[]), &frame(), at(0))
        .is_none());
    assert!(store.is_empty());
    assert!(recorder.last_event("gate").is_none());
}

#[test]
fn test_snapshot_and_record_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEventStore::new());
    let recorder = recorder(dir.path(), store.clone(), RecordingNotifier::new());

    let record = recorder
        .record_cycle(
            "cam1",
            &summary(&[person(0.61), person(0.8), phone(0.55)]),
            &frame(),
            at(0),
        )
        .unwrap();

    let filename = "cam1_1700000000.jpg";
    assert_eq!(record.camera_id, "cam1");
    assert_eq!(record.image_path, format!("media/{}", filename));
    assert_eq!(record.description, "Detected: 2 Persons, 1 Phones");
    assert_eq!(record.confidence, 0.8);

    let written = image::open(dir.path().join(filename)).unwrap();
    assert_eq!((written.width(), written.height()), (64, 36));
}

#[test]
fn test_snapshot_filename_sanitizes_ids() {
    assert_eq!(snapshot_filename("cams/../roof", at(0)), "cams____roof_1700000000.jpg");
    assert_eq!(snapshot_filename("north-gate_2", at(1)), "north-gate_2_1700000001.jpg");
}

#[test]
fn test_failed_persistence_releases_cooldown() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = recorder(
        dir.path(),
        Arc::new(MemoryEventStore::rejecting()),
        RecordingNotifier::new(),
    );

    assert!(recorder
        .record_cycle("gate", &summary(&[person(0.5)]), &frame(), at(0))
        .is_none());
    assert!(recorder.last_event("gate").is_none());
    assert_eq!(recorder.events_recorded(), 0);
}

#[test]
fn test_failed_persistence_restores_previous_slot() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEventStore::new());
    let recorder = recorder(dir.path(), store.clone(), RecordingNotifier::new());
    assert!(recorder
        .record_cycle("gate", &summary(&[person(0.5)]), &frame(), at(0))
        .is_some());

    // block the snapshot path with a directory of the same name
    std::fs::create_dir_all(dir.path().join("gate_1700000020.jpg")).unwrap();
    assert!(recorder
        .record_cycle("gate", &summary(&[person(0.5)]), &frame(), at(20))
        .is_none());
    assert_eq!(recorder.last_event("gate"), Some(at(0)));
}

#[test]
fn test_notification_failure_keeps_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEventStore::new());
    let notifier = RecordingNotifier::failing();
    let recorder = recorder(dir.path(), store.clone(), notifier.clone());

    assert!(recorder
        .record_cycle("gate", &summary(&[phone(0.7)]), &frame(), at(0))
        .is_some());
    assert_eq!(store.len(), 1);
    assert_eq!(notifier.count(), 1);
}

#[test]
fn test_concurrent_cycles_create_one_event() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryEventStore::new());
    let recorder = Arc::new(recorder(dir.path(), store.clone(), RecordingNotifier::new()));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let recorder = Arc::clone(&recorder);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                recorder
                    .record_cycle("gate", &summary(&[person(0.5)]), &frame(), at(i % 2))
                    .is_some()
            })
        })
        .collect();

    let created = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|created| *created)
        .count();
    assert_eq!(created, 1);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_jsonl_store_appends_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlEventStore::new(dir.path().join("nested").join("events.jsonl"));
    assert!(store.load().unwrap().is_empty());

    let first = store
        .create_event(NewEvent {
            camera_id: "gate".to_string(),
            event_type: AnomalyKind::Intrusion,
            confidence: 0.6,
            description: "Detected: 1 Persons, 0 Phones".to_string(),
            image_path: "media/gate_1.jpg".to_string(),
            created_at: at(1),
        })
        .unwrap();
    let second = store
        .create_event(NewEvent {
            camera_id: "gate".to_string(),
            event_type: AnomalyKind::MobilePhone,
            confidence: 0.9,
            description: "Detected: 0 Persons, 1 Phones".to_string(),
            image_path: "media/gate_2.jpg".to_string(),
            created_at: at(2),
        })
        .unwrap();
    assert_ne!(first.id, second.id);

    let loaded = store.load().unwrap();
    assert_eq!(loaded, vec![first, second]);

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(raw.contains("\"event_type\":\"mobile_phone\""));
    assert_eq!(raw.lines().count(), 2);
}
