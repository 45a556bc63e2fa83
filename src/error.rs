//! Error types for the `frameflow` crate.
//!
//! This module defines [`FrameFlowError`], the unified error type returned by
//! every fallible operation in the crate. Per-frame failures (capture, encode,
//! store) carry the frame id or timestamp so they can be logged and skipped
//! without aborting a run.

use std::{io::Error as IoError, path::PathBuf, time::Duration};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use rusqlite::Error as SqliteError;
use thiserror::Error;
use zip::result::ZipError;

/// The unified error type for all `frameflow` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameFlowError {
    /// The media file could not be opened.
    #[error("Failed to open media file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to [`crate::MediaSource::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// Extraction was requested before a video and its metadata were loaded.
    #[error("Resources not ready")]
    ResourceNotReady,

    /// The extraction settings are out of range.
    #[error("Invalid extraction settings: {0}")]
    InvalidSettings(String),

    /// No snapshot could be captured at the given timestamp.
    #[error("Failed to capture frame at {timestamp:?}: {reason}")]
    CaptureFailed {
        /// Timestamp that was being captured.
        timestamp: Duration,
        /// Underlying reason.
        reason: String,
    },

    /// A snapshot could not be encoded into an image payload.
    #[error("Failed to encode frame {id}: {reason}")]
    EncodeFailed {
        /// Id of the frame that was lost.
        id: u64,
        /// Underlying reason.
        reason: String,
    },

    /// No drawing surface can be created for the snapshot's dimensions.
    #[error("Cannot acquire a {width}x{height} drawing surface")]
    NoDrawingSurface {
        /// Requested surface width.
        width: u32,
        /// Requested surface height.
        height: u32,
    },

    /// The frame store holds no payload for this id.
    #[error("Frame {0} not found in store")]
    FrameNotFound(u64),

    /// A durable store read or write failed.
    #[error("Frame store error: {0}")]
    Store(String),

    /// Archive serialization failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate during encoding.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// The processing stage is no longer accepting requests.
    #[error("Processing stage has shut down")]
    StageClosed,
}

impl From<FfmpegError> for FrameFlowError {
    fn from(error: FfmpegError) -> Self {
        FrameFlowError::FfmpegError(error.to_string())
    }
}

impl From<SqliteError> for FrameFlowError {
    fn from(error: SqliteError) -> Self {
        FrameFlowError::Store(error.to_string())
    }
}

impl From<ZipError> for FrameFlowError {
    fn from(error: ZipError) -> Self {
        FrameFlowError::Archive(error.to_string())
    }
}
