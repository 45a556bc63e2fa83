//! Captured frame snapshots.
//!
//! A [`CapturedSnapshot`] owns the raw pixels of one captured frame. It is
//! deliberately neither `Clone` nor `Copy`: handing it to the processing
//! stage moves the pixel buffer, so the capture loop cannot touch it again.

use std::time::Duration;

use image::{DynamicImage, GenericImageView};

/// One captured frame awaiting encoding.
#[derive(Debug)]
pub struct CapturedSnapshot {
    id: u64,
    timestamp: Duration,
    pixels: DynamicImage,
}

impl CapturedSnapshot {
    /// Wrap a pixel buffer captured at `timestamp` as frame `id`.
    pub fn new(id: u64, timestamp: Duration, pixels: DynamicImage) -> Self {
        Self {
            id,
            timestamp,
            pixels,
        }
    }

    /// 1-based sequence id assigned in plan order.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Source offset the frame was captured at.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Pixel dimensions as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Borrow the captured pixels.
    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    /// Free the pixel buffer. Consumes the snapshot.
    pub fn release(self) {
        log::trace!("Releasing snapshot {}", self.id);
    }
}
