//! The capture loop.
//!
//! [`run_capture`] walks a [`TimestampPlan`]: for each timestamp it seeks the
//! [`VideoSource`], waits (bounded) for the seek to settle, captures a
//! snapshot and moves it to the processing stage. The loop yields to the
//! scheduler periodically, reports throttled progress, and stops issuing
//! captures as soon as cancellation is observed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Sender;

use crate::configuration::{ExtractionSettings, PipelineOptions};
use crate::error::FrameFlowError;
use crate::message::StageRequest;
use crate::plan::TimestampPlan;
use crate::progress::{OperationType, ProgressTracker};
use crate::run_state::RunState;
use crate::snapshot::CapturedSnapshot;
use crate::video::VideoSource;

/// Receives the capture loop's status lines.
pub trait StatusSink: Send + Sync {
    /// Called with an advisory, human-readable status line.
    fn on_status(&self, message: &str);
}

/// Outcome of one pass of the capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Captures in the plan.
    pub planned: u64,
    /// Snapshots handed to the processing stage.
    pub dispatched: u64,
    /// Timestamps skipped because capture failed.
    pub skipped: u64,
    /// Whether the loop stopped early on cancellation.
    pub cancelled: bool,
}

/// Capture every planned frame of `video` and dispatch it to `requests`.
///
/// Frame ids are the 1-based plan positions, so a skipped timestamp leaves
/// a gap rather than shifting later ids. When the plan completes without
/// cancellation a single [`StageRequest::FlushRequest`] follows the last
/// frame.
///
/// A seek that does not settle within the configured timeout is captured
/// anyway; the snapshot then shows whatever frame the source presents, which
/// may not be the requested one.
///
/// # Errors
///
/// Returns [`FrameFlowError::InvalidSettings`] for unusable settings and
/// [`FrameFlowError::StageClosed`] if the processing stage stops accepting
/// requests. Individual capture failures are logged and skipped.
pub async fn run_capture<V: VideoSource + ?Sized>(
    video: &mut V,
    settings: &ExtractionSettings,
    options: &PipelineOptions,
    run: &RunState,
    requests: &Sender<StageRequest>,
    status: &dyn StatusSink,
) -> Result<CaptureSummary, FrameFlowError> {
    let plan = TimestampPlan::from_settings(settings)?;
    let planned = plan.len() as u64;
    run.begin(planned);

    log::info!(
        "Capturing {planned} frames from {:?} to {:?}",
        settings.start_time,
        settings.end_time
    );

    let mut tracker = ProgressTracker::new(
        Arc::clone(&options.progress),
        OperationType::FrameCapture,
        Some(planned),
        options.progress_interval,
    );

    let mut summary = CaptureSummary {
        planned,
        dispatched: 0,
        skipped: 0,
        cancelled: false,
    };

    for (index, (id, timestamp)) in plan.iter_with_ids().enumerate() {
        if run.cancel_requested() {
            summary.cancelled = true;
            status.on_status("Extraction stopped");
            break;
        }

        match capture_one(video, id, timestamp, options.seek_timeout).await {
            Ok(snapshot) => {
                requests
                    .send(StageRequest::ProcessFrame {
                        snapshot,
                        quality: settings.quality,
                        format: settings.format,
                    })
                    .await
                    .map_err(|_| FrameFlowError::StageClosed)?;
                summary.dispatched += 1;
            }
            Err(error) => {
                log::warn!("Frame extraction failed at {timestamp:?}: {error}");
                summary.skipped += 1;
            }
        }

        if tracker.advance(Some(timestamp)) {
            status.on_status(&format!("Processing: {} / {}", tracker.current(), planned));
        }

        if index as u64 % options.yield_every == 0 {
            tokio::task::yield_now().await;
        }
    }

    run.finish();

    if !summary.cancelled {
        requests
            .send(StageRequest::FlushRequest)
            .await
            .map_err(|_| FrameFlowError::StageClosed)?;
        status.on_status("Extraction complete. Ready for download.");
    }

    log::info!(
        "Capture finished: {} dispatched, {} skipped, {}% of plan visited",
        summary.dispatched,
        summary.skipped,
        tracker.rounded_percentage()
    );

    Ok(summary)
}

async fn capture_one<V: VideoSource + ?Sized>(
    video: &mut V,
    id: u64,
    timestamp: Duration,
    seek_timeout: Duration,
) -> Result<CapturedSnapshot, FrameFlowError> {
    let settle = video.seek(timestamp)?;
    if !settle.wait(seek_timeout).await {
        log::debug!("Seek to {timestamp:?} did not settle within {seek_timeout:?}");
    }

    let pixels = video
        .capture_snapshot()
        .map_err(|error| FrameFlowError::CaptureFailed {
            timestamp,
            reason: error.to_string(),
        })?;
    Ok(CapturedSnapshot::new(id, timestamp, pixels))
}
