use super::*;
use crate::config::{CameraEntry, SentrycamConfig};
use crate::pipeline::VideoPipeline;
use crate::recorder::MemoryEventStore;
use crate::streaming::{OverlayRenderer, StreamMode};
use crate::testing::{HandlePlan, ScriptedBackend};
use std::sync::Arc;
use std::time::Duration;

fn create_test_config() -> SentrycamConfig {
    let mut config = SentrycamConfig::default();
    config.server.ip = "127.0.0.1".to_string();
    config.server.port = 0;
    config.pipeline.stream_resolution = (64, 36);
    config.reader.read_retry_ms = 1;
    config.cameras = vec![CameraEntry {
        id: "porch".to_string(),
        source: "rtsp://10.0.0.7/live".to_string(),
        active: true,
    }];
    config
}

async fn state_of(orchestrator: &SentrycamOrchestrator, component: &str) -> Option<ComponentState> {
    orchestrator
        .component_states()
        .snapshot()
        .await
        .get(component)
        .cloned()
}

fn create_orchestrator() -> (SentrycamOrchestrator, Arc<ScriptedBackend>) {
    let config = create_test_config();
    let backend = Arc::new(ScriptedBackend::always(HandlePlan::streaming(32, 18)));
    let pipeline = VideoPipeline::builder()
        .config(config.clone())
        .backend(backend.clone())
        .event_store(Arc::new(MemoryEventStore::new()))
        .overlay(OverlayRenderer::without_font())
        .build()
        .unwrap();

    (
        SentrycamOrchestrator::with_pipeline(config, Arc::new(pipeline)),
        backend,
    )
}

#[tokio::test]
async fn test_orchestrator_creation() {
    let (orchestrator, _backend) = create_orchestrator();

    let states = orchestrator.component_states().snapshot().await;
    assert!(states.is_empty()); // No components started yet
    assert!(!orchestrator.shutdown_coordinator().is_shutdown());
}

#[tokio::test]
async fn test_orchestrator_from_config() {
    let orchestrator = SentrycamOrchestrator::new(create_test_config()).await;
    assert!(orchestrator.is_ok());
}

#[tokio::test]
async fn test_component_state_management() {
    let (orchestrator, _backend) = create_orchestrator();

    orchestrator
        .set_component_state("pipeline", ComponentState::Starting)
        .await;
    assert_eq!(
        state_of(&orchestrator, "pipeline").await,
        Some(ComponentState::Starting)
    );

    orchestrator
        .set_component_state("pipeline", ComponentState::Running)
        .await;
    orchestrator
        .set_component_state("streaming", ComponentState::Failed)
        .await;

    let all_states = orchestrator.component_states().snapshot().await;
    assert_eq!(all_states.len(), 2);
    assert_eq!(all_states.get("pipeline"), Some(&ComponentState::Running));
    assert_eq!(all_states.get("streaming"), Some(&ComponentState::Failed));
    assert_eq!(state_of(&orchestrator, "unknown").await, None);

    let rendered = serde_json::to_value(&all_states).unwrap();
    assert_eq!(rendered["pipeline"], "running");
    assert_eq!(rendered["streaming"], "failed");
}

#[tokio::test]
async fn test_initialize_registers_components() {
    let (mut orchestrator, _backend) = create_orchestrator();
    orchestrator.initialize().await.unwrap();

    assert_eq!(
        state_of(&orchestrator, "pipeline").await,
        Some(ComponentState::Stopped)
    );
    #[cfg(feature = "streaming")]
    assert_eq!(
        state_of(&orchestrator, "streaming").await,
        Some(ComponentState::Stopped)
    );
}

#[test]
fn test_shutdown_reason_description() {
    assert_eq!(
        ShutdownReason::Signal("SIGTERM".to_string()).describe(),
        "signal SIGTERM"
    );
    assert_eq!(
        ShutdownReason::Error("boom".to_string()).describe(),
        "error: boom"
    );
    assert_eq!(ShutdownReason::Requested.describe(), "requested");
}

#[tokio::test]
async fn test_shutdown_stops_shared_readers_and_streams() {
    let (mut orchestrator, _backend) = create_orchestrator();
    orchestrator.initialize().await.unwrap();

    let pipeline = Arc::clone(orchestrator.pipeline());
    let mut session = pipeline.open_stream("porch", StreamMode::Raw);
    assert!(session.next_part().await.is_some());
    assert_eq!(pipeline.hub().active_readers(), 1);
    let reader = pipeline.hub().reader("porch").unwrap();

    let exit_code = orchestrator
        .shutdown(&ShutdownReason::Signal("SIGINT".to_string()))
        .await
        .unwrap();

    assert_eq!(exit_code, 0);
    assert!(orchestrator.shutdown_coordinator().is_shutdown());
    assert_eq!(pipeline.hub().active_readers(), 0);
    assert!(reader.join(Duration::from_secs(1)));
    assert!(session.next_part().await.is_none());
    assert_eq!(
        state_of(&orchestrator, "pipeline").await,
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn test_error_shutdown_reports_failure_exit_code() {
    let (mut orchestrator, _backend) = create_orchestrator();
    orchestrator.initialize().await.unwrap();

    let exit_code = orchestrator
        .shutdown(&ShutdownReason::Error("camera registry unavailable".to_string()))
        .await
        .unwrap();
    assert_eq!(exit_code, 1);
}

#[tokio::test]
async fn test_run_returns_after_requested_shutdown() {
    let (mut orchestrator, _backend) = create_orchestrator();
    orchestrator.initialize().await.unwrap();
    orchestrator.start().await.unwrap();

    assert_eq!(
        state_of(&orchestrator, "pipeline").await,
        Some(ComponentState::Running)
    );

    let trigger = orchestrator.shutdown_coordinator().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger("test finished");
    });

    let exit_code = tokio::time::timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .expect("run() should return after shutdown")
        .unwrap();
    assert_eq!(exit_code, 0);

    #[cfg(feature = "streaming")]
    assert_eq!(
        state_of(&orchestrator, "streaming").await,
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn test_run_can_only_be_called_once() {
    let (mut orchestrator, _backend) = create_orchestrator();
    orchestrator.shutdown_coordinator().trigger("test");

    assert!(orchestrator.run().await.is_ok());
    assert!(orchestrator.run().await.is_err());
}
