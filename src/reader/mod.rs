//! Background frame capture.
//!
//! A [`FrameReader`] owns one capture session on a dedicated thread and
//! publishes the latest frame to a [`FrameBuffer`]. Stream loops consume it
//! through the [`FrameSource`] trait, either owning a reader outright
//! (per-client mode) or holding a lease on one shared through the
//! [`ReaderHub`].

mod buffer;
mod frame_reader;
mod hub;


pub use buffer::FrameBuffer;
pub use frame_reader::{FrameReader, ReaderState};
pub use hub::{ReaderHub, SharedReader};

use crate::frame::FrameSnapshot;

/// Latest-frame access for stream loops
pub trait FrameSource: Send + Sync {
    /// Last published snapshot. Never blocks on I/O.
    fn read(&self) -> FrameSnapshot;

    /// Failed reads since the last good one
    fn consecutive_failures(&self) -> u32;

    /// Release this consumer's interest in the source. Idempotent.
    fn stop(&self);
}

impl<T: FrameSource + ?Sized> FrameSource for std::sync::Arc<T> {
    fn read(&self) -> FrameSnapshot {
        (**self).read()
    }

    fn consecutive_failures(&self) -> u32 {
        (**self).consecutive_failures()
    }

    fn stop(&self) {
        (**self).stop()
    }
}
