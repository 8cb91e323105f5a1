pub mod app;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod reader;
pub mod recorder;
pub mod registry;
pub mod shutdown;
pub mod source;
pub mod streaming;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{ComponentState, ComponentStates, SentrycamOrchestrator, ShutdownReason};
pub use config::SentrycamConfig;
pub use detect::{AnomalyKind, CycleSummary, Detection, Detector, Label};
pub use error::{Result, SentrycamError};
pub use frame::{Frame, FrameSnapshot};
pub use pipeline::{PipelineStats, VideoPipeline, VideoPipelineBuilder};
pub use reader::{FrameReader, FrameSource, ReaderHub};
pub use recorder::{EventRecord, EventRecorder, EventStore, Notifier};
pub use registry::{CameraRegistry, ConfigCameraRegistry};
pub use shutdown::ShutdownCoordinator;
pub use source::{CameraSource, CaptureBackend, SourceResolver};
pub use streaming::{StreamMode, StreamSession};

#[cfg(feature = "streaming")]
pub use streaming::{StreamServer, StreamServerBuilder};
