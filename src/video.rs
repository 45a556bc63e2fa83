//! The video resource seam.
//!
//! The capture loop drives any [`VideoSource`]: something that can seek to a
//! timestamp, announce when the seek has settled, and hand back the pixels
//! currently presented. [`MediaSource`](crate::MediaSource) is the FFmpeg
//! implementation; tests substitute scripted fakes.

use std::time::Duration;

use image::DynamicImage;
use tokio::sync::oneshot::{self, Receiver, Sender};

use crate::error::FrameFlowError;
use crate::metadata::VideoMetadata;

/// Notification that a seek has settled on the requested frame.
///
/// Obtained from [`VideoSource::seek`]. The capture loop waits on it for a
/// bounded time; a source that never notifies is captured anyway once the
/// timeout expires.
#[derive(Debug)]
pub struct SettleSignal {
    receiver: Receiver<()>,
}

/// Sending half of a [`SettleSignal`], fired by the video source.
#[derive(Debug)]
pub struct SettleNotifier {
    sender: Sender<()>,
}

impl SettleSignal {
    /// Create a connected notifier/signal pair.
    pub fn channel() -> (SettleNotifier, SettleSignal) {
        let (sender, receiver) = oneshot::channel();
        (SettleNotifier { sender }, SettleSignal { receiver })
    }

    /// A signal that has already fired, for sources that seek synchronously.
    pub fn settled() -> SettleSignal {
        let (notifier, signal) = Self::channel();
        notifier.notify();
        signal
    }

    /// Wait up to `timeout` for the seek to settle.
    ///
    /// Returns `false` when the timeout expired or the notifier was dropped
    /// without firing.
    pub async fn wait(self, timeout: Duration) -> bool {
        matches!(tokio::time::timeout(timeout, self.receiver).await, Ok(Ok(())))
    }
}

impl SettleNotifier {
    /// Announce that the seek has settled.
    pub fn notify(self) {
        // The capture loop may already have given up waiting.
        let _ = self.sender.send(());
    }
}

/// A seekable video that yields pixel snapshots.
pub trait VideoSource {
    /// Metadata describing the loaded video.
    fn metadata(&self) -> &VideoMetadata;

    /// Start seeking to `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns an error if the seek cannot even be started. A slow seek is not
    /// an error; it simply settles late.
    fn seek(&mut self, timestamp: Duration) -> Result<SettleSignal, FrameFlowError>;

    /// Capture the frame currently presented.
    ///
    /// # Errors
    ///
    /// Returns [`FrameFlowError::CaptureFailed`] if no frame is available.
    fn capture_snapshot(&mut self) -> Result<DynamicImage, FrameFlowError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settled_signal_resolves_immediately() {
        assert!(SettleSignal::settled().wait(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn silent_source_times_out() {
        let (_notifier, signal) = SettleSignal::channel();
        assert!(!signal.wait(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn dropped_notifier_does_not_hang() {
        let (notifier, signal) = SettleSignal::channel();
        drop(notifier);
        assert!(!signal.wait(Duration::from_secs(60)).await);
    }
}
