use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Object classes the pipeline acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Person,
    Phone,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Person => "person",
            Label::Phone => "phone",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            Label::Person => "Person",
            Label::Phone => "Phone",
        }
    }
}

/// One labeled box from a detection cycle, in stream-resolution pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub label: Label,
    pub confidence: f32,
}

impl Detection {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32, label: Label, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            label,
            confidence,
        }
    }

    /// Text drawn on the box tab, e.g. "Phone 0.87"
    pub fn caption(&self) -> String {
        format!("{} {:.2}", self.label.title(), self.confidence)
    }
}

/// Object detection model.
///
/// Synchronous and possibly slow (tens to hundreds of milliseconds); the
/// stream loop calls it from the blocking pool and only on every N-th frame.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Vec<Detection>;
}

/// Detector used when no model is configured
#[derive(Debug, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&self, _image: &RgbImage) -> Vec<Detection> {
        Vec::new()
    }
}

/// Drops detections below a confidence threshold
pub struct ThresholdDetector {
    inner: Arc<dyn Detector>,
    threshold: f32,
}

impl ThresholdDetector {
    pub fn new(inner: Arc<dyn Detector>, threshold: f32) -> Self {
        Self { inner, threshold }
    }
}

impl Detector for ThresholdDetector {
    fn detect(&self, image: &RgbImage) -> Vec<Detection> {
        let mut detections = self.inner.detect(image);
        let before = detections.len();
        detections.retain(|d| d.confidence >= self.threshold);
        if detections.len() != before {
            trace!(
                "Dropped {} detections below {:.2}",
                before - detections.len(),
                self.threshold
            );
        }
        detections
    }
}

/// Event type derived from one detection cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    MobilePhone,
    Intrusion,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::MobilePhone => "mobile_phone",
            AnomalyKind::Intrusion => "intrusion",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-label counts and best confidence of one detection cycle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CycleSummary {
    pub persons: usize,
    pub phones: usize,
    pub best_confidence: f32,
}

impl CycleSummary {
    pub fn from_detections(detections: &[Detection]) -> Self {
        detections
            .iter()
            .fold(CycleSummary::default(), |mut summary, detection| {
                match detection.label {
                    Label::Person => summary.persons += 1,
                    Label::Phone => summary.phones += 1,
                }
                summary.best_confidence = summary.best_confidence.max(detection.confidence);
                summary
            })
    }

    /// A phone outranks a person; nothing detected means no anomaly
    pub fn anomaly(&self) -> Option<AnomalyKind> {
        if self.phones > 0 {
            Some(AnomalyKind::MobilePhone)
        } else if self.persons > 0 {
            Some(AnomalyKind::Intrusion)
        } else {
            None
        }
    }

    pub fn description(&self) -> String {
        format!("Detected: {} Persons, {} Phones", self.persons, self.phones)
    }
}
