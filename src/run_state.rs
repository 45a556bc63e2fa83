//! Shared state of the single active extraction run.
//!
//! [`RunState`] is an explicit context object handed to both the capture
//! loop and the processing stage. Clones share the same counters.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use crate::progress::CancellationToken;

#[derive(Debug, Default)]
struct Counters {
    running: AtomicBool,
    total_planned: AtomicU64,
    total_completed: AtomicU64,
}

/// Run-wide flags and counters: `{is_running, cancel_requested,
/// total_planned, total_completed}`.
#[derive(Debug, Clone)]
pub struct RunState {
    counters: Arc<Counters>,
    cancellation: CancellationToken,
}

impl RunState {
    /// Create idle state observing `cancellation`.
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            cancellation,
        }
    }

    /// Mark a new run as started with `total_planned` captures.
    ///
    /// A pending cancellation is kept; call
    /// [`rearm`](RunState::rearm) to clear it before a new run.
    pub fn begin(&self, total_planned: u64) {
        self.counters.total_planned.store(total_planned, Ordering::Release);
        self.counters.total_completed.store(0, Ordering::Release);
        self.counters.running.store(true, Ordering::Release);
    }

    /// Mark the capture side of the run as finished.
    pub fn finish(&self) {
        self.counters.running.store(false, Ordering::Release);
    }

    /// Clear a cancellation left over from the previous run.
    pub fn rearm(&self) {
        self.cancellation.reset();
    }

    /// Request cancellation of the capture loop.
    pub fn request_cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn cancel_requested(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Whether a capture loop is currently running.
    pub fn is_running(&self) -> bool {
        self.counters.running.load(Ordering::Acquire)
    }

    /// Captures planned for the current run.
    pub fn total_planned(&self) -> u64 {
        self.counters.total_planned.load(Ordering::Acquire)
    }

    /// Frames the processing stage has completed in the current run.
    pub fn total_completed(&self) -> u64 {
        self.counters.total_completed.load(Ordering::Acquire)
    }

    pub(crate) fn record_completion(&self) {
        self.counters.total_completed.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn reset_completed(&self) {
        self.counters.total_completed.store(0, Ordering::Release);
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}
