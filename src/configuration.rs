//! Extraction settings and pipeline configuration.
//!
//! [`ExtractionSettings`] describes *what* one run extracts (rate, quality,
//! format, time range) and is read once at run start. [`PipelineOptions`] is
//! a builder that threads operational knobs (timeouts, batching, storage,
//! progress callbacks, cancellation) through the pipeline without polluting
//! every function signature.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use frameflow::{
//!     CancellationToken, ExtractionSettings, ImageFormat, PipelineOptions, ProgressCallback,
//!     ProgressInfo,
//! };
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {:?}%", info.operation, info.percentage);
//!     }
//! }
//!
//! let settings = ExtractionSettings::new(
//!     2.0,
//!     0.9,
//!     ImageFormat::Jpeg,
//!     Duration::ZERO,
//!     Duration::from_secs(5),
//! );
//! assert!(settings.validate().is_ok());
//!
//! let token = CancellationToken::new();
//! let options = PipelineOptions::new()
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_seek_timeout(Duration::from_millis(500));
//! ```

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::FrameFlowError;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Output image encoding for extracted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    /// Lossless WebP. This is the default.
    #[default]
    Webp,
    /// Lossless PNG.
    Png,
    /// Lossy JPEG; honours the quality setting.
    Jpeg,
}

impl ImageFormat {
    /// File extension used for archive entry names.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Webp => "webp",
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    /// MIME type of the encoded payload.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Webp => "image/webp",
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

impl Display for ImageFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = FrameFlowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "webp" => Ok(ImageFormat::Webp),
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            other => Err(FrameFlowError::InvalidSettings(format!(
                "unsupported image format: {other}"
            ))),
        }
    }
}

/// Parameters of one extraction run.
///
/// Immutable for the duration of the run.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct ExtractionSettings {
    /// Output frames per second.
    pub rate: f64,
    /// Encoding quality, normalised to `0.0..=1.0`.
    pub quality: f32,
    /// Output image encoding.
    pub format: ImageFormat,
    /// Offset of the first captured frame.
    pub start_time: Duration,
    /// Offset of the last captured frame.
    pub end_time: Duration,
}

impl ExtractionSettings {
    /// Create settings from explicit values. Call
    /// [`validate`](ExtractionSettings::validate) before use.
    pub fn new(
        rate: f64,
        quality: f32,
        format: ImageFormat,
        start_time: Duration,
        end_time: Duration,
    ) -> Self {
        Self {
            rate,
            quality,
            format,
            start_time,
            end_time,
        }
    }

    /// Defaults applied when a source is loaded: one frame per second at
    /// 0.8 quality, WebP, covering the whole source.
    pub fn for_duration(duration: Duration) -> Self {
        Self::new(1.0, 0.8, ImageFormat::Webp, Duration::ZERO, duration)
    }

    /// Set the output rate.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Set the encoding quality.
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    /// Set the output image format.
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the capture range.
    pub fn with_range(mut self, start_time: Duration, end_time: Duration) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    /// Check every field is in range.
    ///
    /// # Errors
    ///
    /// Returns [`FrameFlowError::InvalidSettings`] when the rate is not a
    /// positive finite number with a finite reciprocal, the quality lies
    /// outside `0.0..=1.0`, or the end time precedes the start time.
    pub fn validate(&self) -> Result<(), FrameFlowError> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(FrameFlowError::InvalidSettings(format!(
                "rate must be positive, got {}",
                self.rate
            )));
        }
        if !(1.0 / self.rate).is_finite() {
            return Err(FrameFlowError::InvalidSettings(format!(
                "rate {} is too small to space captures",
                self.rate
            )));
        }
        if !(0.0..=1.0).contains(&self.quality) {
            return Err(FrameFlowError::InvalidSettings(format!(
                "quality must be within 0..=1, got {}",
                self.quality
            )));
        }
        if self.end_time < self.start_time {
            return Err(FrameFlowError::InvalidSettings(format!(
                "end time {:?} precedes start time {:?}",
                self.end_time, self.start_time
            )));
        }
        Ok(())
    }
}

/// Batching policy of the [`UpdateCoalescer`](crate::UpdateCoalescer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerPolicy {
    /// Completions numbered below this are surfaced as they arrive.
    pub eager_count: u64,
    /// Maximum time buffered completions wait before being surfaced.
    pub interval: Duration,
    /// Buffer size that forces a flush.
    pub max_batch: usize,
}

impl Default for CoalescerPolicy {
    fn default() -> Self {
        Self {
            eager_count: 10,
            interval: Duration::from_millis(100),
            max_batch: 20,
        }
    }
}

/// Where the processing stage keeps encoded frames.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreLocation {
    /// A private in-memory database; lost when the stage shuts down.
    #[default]
    Memory,
    /// A database file that survives across runs and processes.
    Path(PathBuf),
}

/// Operational configuration of the extraction pipeline.
///
/// All fields have defaults matching the interactive application: a 2 s
/// seek-settle timeout, a cooperative yield every 10 frames, progress at most
/// every 100 ms, and up to 8 frames queued for the processing stage.
#[derive(Clone)]
pub struct PipelineOptions {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: CancellationToken,
    pub(crate) seek_timeout: Duration,
    pub(crate) yield_every: u64,
    pub(crate) progress_interval: Duration,
    pub(crate) channel_capacity: usize,
    pub(crate) store: StoreLocation,
    pub(crate) archive_folder: String,
    pub(crate) coalescer: CoalescerPolicy,
}

impl Debug for PipelineOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineOptions")
            .field("has_progress", &true)
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("seek_timeout", &self.seek_timeout)
            .field("yield_every", &self.yield_every)
            .field("progress_interval", &self.progress_interval)
            .field("channel_capacity", &self.channel_capacity)
            .field("store", &self.store)
            .field("archive_folder", &self.archive_folder)
            .field("coalescer", &self.coalescer)
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: CancellationToken::new(),
            seek_timeout: Duration::from_secs(2),
            yield_every: 10,
            progress_interval: Duration::from_millis(100),
            channel_capacity: 8,
            store: StoreLocation::Memory,
            archive_folder: "extracted_frames".to_string(),
            coalescer: CoalescerPolicy::default(),
        }
    }

    /// Attach a progress callback for capture and archive progress.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Use an externally owned cancellation token.
    ///
    /// Cancelling it stops the capture loop after the frame in hand.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Maximum wait for a seek to settle before capturing anyway.
    #[must_use]
    pub fn with_seek_timeout(mut self, timeout: Duration) -> Self {
        self.seek_timeout = timeout;
        self
    }

    /// Yield to the scheduler once every `frames` captures. Clamped to 1.
    #[must_use]
    pub fn with_yield_every(mut self, frames: u64) -> Self {
        self.yield_every = frames.max(1);
        self
    }

    /// Minimum interval between capture progress reports.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Bound on queued processing requests. Clamped to 1.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Where encoded frames are persisted.
    #[must_use]
    pub fn with_store(mut self, location: StoreLocation) -> Self {
        self.store = location;
        self
    }

    /// Folder inside the archive that holds the frame entries.
    ///
    /// An empty string places entries at the archive root.
    #[must_use]
    pub fn with_archive_folder(mut self, folder: impl Into<String>) -> Self {
        self.archive_folder = folder.into();
        self
    }

    /// Replace the UI update batching policy.
    #[must_use]
    pub fn with_coalescer_policy(mut self, policy: CoalescerPolicy) -> Self {
        self.coalescer = policy;
        self
    }

    /// The cancellation token observed by the capture loop.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_format_parses_aliases() {
        assert_eq!("WEBP".parse::<ImageFormat>().unwrap(), ImageFormat::Webp);
        assert_eq!("jpg".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert_eq!("png".parse::<ImageFormat>().unwrap(), ImageFormat::Png);
        assert!("gif".parse::<ImageFormat>().is_err());
    }

    #[test]
    fn defaults_cover_whole_source() {
        let settings = ExtractionSettings::for_duration(Duration::from_secs(12));
        assert_eq!(settings.rate, 1.0);
        assert_eq!(settings.format, ImageFormat::Webp);
        assert_eq!(settings.start_time, Duration::ZERO);
        assert_eq!(settings.end_time, Duration::from_secs(12));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let base = ExtractionSettings::for_duration(Duration::from_secs(5));
        assert!(base.clone().with_rate(0.0).validate().is_err());
        assert!(base.clone().with_rate(f64::NAN).validate().is_err());
        assert!(base.clone().with_rate(1e-310).validate().is_err());
        assert!(base.clone().with_quality(1.5).validate().is_err());
        assert!(
            base.with_range(Duration::from_secs(3), Duration::from_secs(1))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn options_clamp_zero_values() {
        let options = PipelineOptions::new()
            .with_yield_every(0)
            .with_channel_capacity(0);
        let debug = format!("{options:?}");
        assert!(debug.contains("yield_every: 1"));
        assert!(debug.contains("channel_capacity: 1"));
    }
}
