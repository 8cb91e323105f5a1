use serde::Serialize;

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    /// Raised through the shutdown coordinator from inside the process
    Requested,
}

impl ShutdownReason {
    pub fn describe(&self) -> String {
        match self {
            ShutdownReason::Signal(signal) => format!("signal {}", signal),
            ShutdownReason::Error(message) => format!("error: {}", message),
            ShutdownReason::Requested => "requested".to_string(),
        }
    }
}
