use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::Arc;
use std::time::SystemTime;

/// A decoded camera frame and its capture metadata
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic per-reader frame identifier
    pub id: u64,
    /// Timestamp when the frame was captured
    pub timestamp: SystemTime,
    /// Decoded pixels
    pub image: RgbImage,
}

impl Frame {
    pub fn new(id: u64, timestamp: SystemTime, image: RgbImage) -> Self {
        Self {
            id,
            timestamp,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Copy of the pixels scaled to `width`x`height`.
    ///
    /// The published frame is shared with other readers, so this never
    /// touches `self.image` in place.
    pub fn resized(&self, width: u32, height: u32) -> RgbImage {
        if self.image.width() == width && self.image.height() == height {
            return self.image.clone();
        }
        imageops::resize(&self.image, width, height, FilterType::Triangle)
    }

}

/// What a reader returns: the last published `(success, frame)` pair.
///
/// `success` reflects the most recent read attempt while `frame` keeps the
/// last good frame, so a transient failure reports `(false, Some(old))`.
#[derive(Debug, Clone, Default)]
pub struct FrameSnapshot {
    pub success: bool,
    pub frame: Option<Arc<Frame>>,
}

impl FrameSnapshot {
    /// The frame, but only when the latest read succeeded
    pub fn usable(&self) -> Option<&Arc<Frame>> {
        if self.success {
            self.frame.as_ref()
        } else {
            None
        }
    }
}
