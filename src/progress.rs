//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for monitoring capture and
//! archive progress, [`CancellationToken`] for cooperative cancellation, and
//! [`ProgressInfo`] for detailed progress snapshots.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use frameflow::{PipelineOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}% complete", info.operation);
//!         }
//!     }
//! }
//!
//! let options = PipelineOptions::new().with_progress(Arc::new(PrintProgress));
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// The kind of operation currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Seeking and capturing frames from the source.
    FrameCapture,
    /// Serializing the archive of encoded frames.
    ArchiveGeneration,
}

/// A snapshot of operation progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub operation: OperationType,
    /// How many items have been handled so far.
    pub current: u64,
    /// Total items expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the operation started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// The source timestamp currently being captured.
    pub current_timestamp: Option<Duration>,
}

/// Trait for receiving progress updates.
///
/// Implementations must be [`Send`] and [`Sync`] because callbacks may be
/// invoked from the capture task or while pumping stage events.
///
/// Progress callbacks are **infallible**: they observe but cannot halt the
/// operation. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called whenever a progress report is due.
    fn on_progress(&self, info: &ProgressInfo);
}

/// A no-op implementation that discards all progress notifications.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it; call [`cancel`](CancellationToken::cancel)
/// from anywhere to stop the capture loop before its next frame. Frames
/// already handed to the processing stage still complete.
///
/// # Example
///
/// ```
/// use frameflow::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
///
/// token.reset();
/// assert!(!token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token will observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Clear a previous cancellation so the token can guard a new run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks progress timing and emits callbacks no more often than
/// `min_interval`, except for the final report which is always emitted.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    min_interval: Duration,
    start_time: Instant,
    last_report: Option<Instant>,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        min_interval: Duration,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            min_interval,
            start_time: Instant::now(),
            last_report: None,
        }
    }

    /// Record one handled item. Returns `true` when a report was emitted.
    pub(crate) fn advance(&mut self, timestamp: Option<Duration>) -> bool {
        self.current += 1;

        let now = Instant::now();
        let is_last = self.total.is_some_and(|total| self.current >= total);
        let due = self
            .last_report
            .is_none_or(|last| now.duration_since(last) > self.min_interval);

        if due || is_last {
            self.report(timestamp);
            self.last_report = Some(now);
            true
        } else {
            false
        }
    }

    /// Emit a report for an externally computed percentage.
    pub(crate) fn report_percentage(&self, percentage: f32) {
        let info = ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage: Some(percentage),
            elapsed: self.start_time.elapsed(),
            estimated_remaining: None,
            current_timestamp: None,
        };
        self.callback.on_progress(&info);
    }

    /// Whole-number percentage of the plan handled so far.
    pub(crate) fn rounded_percentage(&self) -> u8 {
        match self.total {
            Some(total) if total > 0 => {
                ((self.current as f64 / total as f64) * 100.0).round().min(100.0) as u8
            }
            _ => 0,
        }
    }

    pub(crate) fn current(&self) -> u64 {
        self.current
    }

    fn report(&self, timestamp: Option<Duration>) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| (self.current as f32 / t as f32) * 100.0);

        let estimated_remaining = if self.current > 0 {
            self.total.map(|t| {
                let remaining = t.saturating_sub(self.current);
                let per_item = elapsed / self.current as u32;
                per_item * remaining as u32
            })
        } else {
            None
        };

        let info = ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_timestamp: timestamp,
        };

        self.callback.on_progress(&info);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        infos: Mutex<Vec<ProgressInfo>>,
    }

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.infos.lock().unwrap().push(info.clone());
        }
    }

    #[test]
    fn throttles_but_always_reports_last_item() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker = ProgressTracker::new(
            recorder.clone(),
            OperationType::FrameCapture,
            Some(50),
            Duration::from_secs(3600),
        );

        for _ in 0..50 {
            tracker.advance(None);
        }

        let infos = recorder.infos.lock().unwrap();
        // First report is immediate, everything else is throttled until the end.
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].current, 1);
        assert_eq!(infos[1].current, 50);
        assert_eq!(infos[1].percentage, Some(100.0));
        assert_eq!(tracker.rounded_percentage(), 100);
    }

    #[test]
    fn zero_interval_reports_every_item() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker = ProgressTracker::new(
            recorder.clone(),
            OperationType::FrameCapture,
            None,
            Duration::ZERO,
        );
        for _ in 0..3 {
            tracker.advance(Some(Duration::from_secs(1)));
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(recorder.infos.lock().unwrap().len(), 3);
        assert_eq!(tracker.rounded_percentage(), 0);
    }
}
