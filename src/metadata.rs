//! Source video metadata.
//!
//! [`VideoMetadata`] is what the source picker reports about a loaded video:
//! its duration and dimensions plus the file name and size. Metadata is read
//! once when the source is opened and cached for its lifetime.

use std::time::Duration;

/// Metadata for a loaded source video.
///
/// # Example
///
/// ```no_run
/// use frameflow::{MediaSource, VideoSource};
///
/// let source = MediaSource::open("input.mp4").unwrap();
/// let metadata = source.metadata();
/// println!("{} is {:?} long", metadata.name, metadata.duration);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct VideoMetadata {
    /// Total duration of the video.
    pub duration: Duration,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Native frames per second (may be approximate for variable-rate content).
    pub frames_per_second: f64,
    /// File name of the source, without directories.
    pub name: String,
    /// Source size in bytes.
    pub size: u64,
}

impl VideoMetadata {
    /// Whether the metadata describes something that can be extracted from.
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0 && !self.duration.is_zero()
    }

    /// Archive base name: the file name up to its first `.`, or `"frames"`
    /// when that is empty.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use frameflow::VideoMetadata;
    ///
    /// let metadata = VideoMetadata {
    ///     duration: Duration::from_secs(1),
    ///     width: 640,
    ///     height: 360,
    ///     frames_per_second: 30.0,
    ///     name: "holiday.final.mp4".to_string(),
    ///     size: 1024,
    /// };
    /// assert_eq!(metadata.archive_base_name(), "holiday");
    /// ```
    pub fn archive_base_name(&self) -> &str {
        match self.name.split('.').next() {
            Some(stem) if !stem.is_empty() => stem,
            _ => "frames",
        }
    }
}
