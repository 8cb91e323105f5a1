use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentrycamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Failures raised while opening or reading a capture source
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Invalid source descriptor '{descriptor}': {details}")]
    InvalidSource { descriptor: String, details: String },

    #[error("Capture backend unavailable: {details}")]
    BackendUnavailable { details: String },

    #[error("Pipeline configuration failed: {details}")]
    Configuration { details: String },

    #[error("Capture stream error: {details}")]
    CaptureStream { details: String },

    #[error("Reader thread could not be spawned: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server startup failed: {details}")]
    StartupFailed { details: String },

    #[error("Frame encoding failed: {details}")]
    Encode { details: String },
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Failed to write snapshot {path}: {details}")]
    Snapshot { path: String, details: String },

    #[error("Event store rejected record: {details}")]
    Store { details: String },

    #[error("Notification failed: {details}")]
    Notification { details: String },
}

impl SentrycamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SentrycamError>;
