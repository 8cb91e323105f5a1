use super::{ComponentState, SentrycamOrchestrator};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Lifecycle state of each component, shared with the health endpoint
#[derive(Debug, Clone, Default)]
pub struct ComponentStates {
    inner: Arc<Mutex<HashMap<String, ComponentState>>>,
}

impl ComponentStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, component: &str, state: ComponentState) {
        let mut states = self.inner.lock().await;
        debug!("Component '{}' state changed to: {:?}", component, state);
        states.insert(component.to_string(), state);
    }

    pub async fn snapshot(&self) -> HashMap<String, ComponentState> {
        self.inner.lock().await.clone()
    }
}

impl SentrycamOrchestrator {
    /// Update component state
    pub async fn set_component_state(&self, component: &str, state: ComponentState) {
        self.component_states.set(component, state).await;
    }

    pub fn component_states(&self) -> &ComponentStates {
        &self.component_states
    }
}
