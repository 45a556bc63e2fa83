//! Shared helpers for integration tests: a scripted in-memory video source
//! and recording observers.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use frameflow::{
    CancellationToken, FrameBatch, FrameFlowError, FrameObserver, ProgressCallback, ProgressInfo,
    SettleNotifier, SettleSignal, StatusSink, VideoMetadata, VideoSource,
};
use image::{DynamicImage, Rgb, RgbImage};

pub fn metadata(name: &str, seconds: u64) -> VideoMetadata {
    VideoMetadata {
        duration: Duration::from_secs(seconds),
        width: 8,
        height: 6,
        frames_per_second: 25.0,
        name: name.to_string(),
        size: 4096,
    }
}

/// A video whose "frames" are solid colours derived from the seek position.
pub struct ScriptedSource {
    metadata: VideoMetadata,
    position: Duration,
    pub seeks: Vec<Duration>,
    pub captures: usize,
    /// 1-based capture attempts that fail.
    pub failing_captures: HashSet<usize>,
    /// Seeks never announce that they settled.
    pub silent_seeks: bool,
    /// Cancel this token right after the given number of captures.
    pub cancel_after: Option<(usize, CancellationToken)>,
    pending: Vec<SettleNotifier>,
}

impl ScriptedSource {
    pub fn new(metadata: VideoMetadata) -> Self {
        Self {
            metadata,
            position: Duration::ZERO,
            seeks: Vec::new(),
            captures: 0,
            failing_captures: HashSet::new(),
            silent_seeks: false,
            cancel_after: None,
            pending: Vec::new(),
        }
    }

    pub fn seconds(seconds: u64) -> Self {
        Self::new(metadata("clip.mp4", seconds))
    }
}

impl VideoSource for ScriptedSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn seek(&mut self, timestamp: Duration) -> Result<SettleSignal, FrameFlowError> {
        self.position = timestamp;
        self.seeks.push(timestamp);
        if self.silent_seeks {
            let (notifier, signal) = SettleSignal::channel();
            // Keep the notifier alive so the signal only ends by timeout.
            self.pending.push(notifier);
            Ok(signal)
        } else {
            Ok(SettleSignal::settled())
        }
    }

    fn capture_snapshot(&mut self) -> Result<DynamicImage, FrameFlowError> {
        self.captures += 1;
        if let Some((after, token)) = &self.cancel_after {
            if self.captures >= *after {
                token.cancel();
            }
        }
        if self.failing_captures.contains(&self.captures) {
            return Err(FrameFlowError::CaptureFailed {
                timestamp: self.position,
                reason: "scripted failure".to_string(),
            });
        }
        let shade = (self.position.as_millis() / 100 % 256) as u8;
        let image = RgbImage::from_pixel(
            self.metadata.width,
            self.metadata.height,
            Rgb([shade, 255 - shade, 64]),
        );
        Ok(DynamicImage::ImageRgb8(image))
    }
}

/// Records every batch and status line it sees.
#[derive(Default)]
pub struct RecordingObserver {
    pub batches: Mutex<Vec<FrameBatch>>,
    pub statuses: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn frame_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .batches
            .lock()
            .unwrap()
            .iter()
            .flat_map(|batch| batch.frames.iter().map(|frame| frame.id))
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn saw_status(&self, wanted: &str) -> bool {
        self.statuses.lock().unwrap().iter().any(|s| s == wanted)
    }
}

impl FrameObserver for RecordingObserver {
    fn on_frames(&self, batch: &FrameBatch) {
        self.batches.lock().unwrap().push(batch.clone());
    }

    fn on_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }
}

impl StatusSink for RecordingObserver {
    fn on_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    pub infos: Mutex<Vec<ProgressInfo>>,
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.infos.lock().unwrap().push(info.clone());
    }
}

pub fn recording_progress() -> Arc<RecordingProgress> {
    Arc::new(RecordingProgress::default())
}
