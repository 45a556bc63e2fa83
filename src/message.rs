//! Messages exchanged with the processing stage.
//!
//! Requests flow from the capture loop and the session into the stage;
//! events flow back. Nothing else crosses the boundary.

use std::time::Duration;

use crate::configuration::ImageFormat;
use crate::snapshot::CapturedSnapshot;

/// A request to the processing stage.
#[derive(Debug)]
pub enum StageRequest {
    /// Encode, persist and register one captured frame. The snapshot moves
    /// into the stage.
    ProcessFrame {
        /// The captured frame; carries its id and timestamp.
        snapshot: CapturedSnapshot,
        /// Encoding quality in `0.0..=1.0`.
        quality: f32,
        /// Output image format.
        format: ImageFormat,
    },
    /// No further frames are coming for this run.
    FlushRequest,
    /// Serialize the manifest into an archive named after `base_name`.
    GenerateArchive {
        /// Base file name; the archive is named `<base_name>_sequence.zip`.
        base_name: String,
    },
    /// Read one stored frame back.
    GetFrame {
        /// Id of the frame to read.
        id: u64,
    },
    /// Reset the manifest and erase the frame store.
    Clear,
}

/// An event emitted by the processing stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    /// A frame was encoded, persisted and registered.
    FrameProcessed {
        /// Frame id.
        id: u64,
        /// Source timestamp of the frame.
        timestamp: Duration,
    },
    /// End-of-plan marker with the completions counted since the last flush.
    Flush {
        /// Frames completed since the previous flush.
        count: u64,
    },
    /// Advisory, human-readable status line.
    Status(String),
    /// Archive serialization progress, `0.0..=100.0`.
    ArchiveProgress(f32),
    /// The archive is complete.
    ArchiveReady {
        /// The ZIP payload.
        payload: Vec<u8>,
        /// Suggested file name for saving it.
        filename: String,
    },
    /// Archive serialization failed; stored frames are untouched.
    ArchiveFailed {
        /// Why serialization failed.
        reason: String,
    },
    /// Payload of a stored frame, answering [`StageRequest::GetFrame`].
    FrameData {
        /// Frame id.
        id: u64,
        /// Encoded image bytes.
        payload: Vec<u8>,
    },
    /// A [`StageRequest::GetFrame`] could not be answered.
    FrameUnavailable {
        /// Frame id that was requested.
        id: u64,
        /// Why the read failed.
        reason: String,
    },
    /// A [`StageRequest::Clear`] has been applied; every earlier event has
    /// already been emitted.
    Cleared,
}

impl StageRequest {
    /// Short tag for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            StageRequest::ProcessFrame { .. } => "process-frame",
            StageRequest::FlushRequest => "flush-request",
            StageRequest::GenerateArchive { .. } => "generate-zip",
            StageRequest::GetFrame { .. } => "get-frame",
            StageRequest::Clear => "clear",
        }
    }
}
