//! Batching of per-frame completions into UI updates.
//!
//! [`UpdateCoalescer`] is a small state machine fed with completion events.
//! The first completions of a run are surfaced one by one so activity shows
//! up immediately; after that, completions are buffered and surfaced when
//! the buffer is old enough or large enough, whichever happens first.

use std::time::{Duration, Instant};

use crate::configuration::CoalescerPolicy;

/// One completed frame as seen by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedFrame {
    /// Frame id.
    pub id: u64,
    /// Source timestamp of the frame.
    pub timestamp: Duration,
}

/// A batch of completions to surface together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBatch {
    /// Frames in arrival order. Consumers must key on `id`, not position.
    pub frames: Vec<CompletedFrame>,
    /// Completions seen in this run so far, including this batch.
    pub total_processed: u64,
}

impl FrameBatch {
    /// Status line describing the run after this batch.
    pub fn status(&self) -> String {
        format!("Processing: {} frames encoded...", self.total_processed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Every completion is surfaced as it arrives.
    Eager,
    /// Completions are buffered until the interval or size limit is hit.
    Buffered,
}

/// Hybrid latency/size batching state machine.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
///
/// use frameflow::{CoalescerPolicy, CompletedFrame, UpdateCoalescer};
///
/// let mut coalescer = UpdateCoalescer::new(CoalescerPolicy::default());
/// let now = Instant::now();
/// let frame = CompletedFrame { id: 1, timestamp: Duration::ZERO };
///
/// // The very first completion is surfaced immediately.
/// let batch = coalescer.on_completion(frame, now).unwrap();
/// assert_eq!(batch.frames, vec![frame]);
/// ```
#[derive(Debug)]
pub struct UpdateCoalescer {
    policy: CoalescerPolicy,
    phase: Phase,
    buffer: Vec<CompletedFrame>,
    total_processed: u64,
    last_flush: Option<Instant>,
}

impl UpdateCoalescer {
    /// Create a coalescer for a fresh run.
    pub fn new(policy: CoalescerPolicy) -> Self {
        Self {
            policy,
            phase: Phase::Eager,
            buffer: Vec::new(),
            total_processed: 0,
            last_flush: None,
        }
    }

    /// Forget everything and start a new run.
    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }

    /// Record one completion observed at `now`; returns a batch when one is due.
    pub fn on_completion(&mut self, frame: CompletedFrame, now: Instant) -> Option<FrameBatch> {
        self.buffer.push(frame);
        self.total_processed += 1;

        if self.phase == Phase::Eager && self.total_processed >= self.policy.eager_count {
            self.phase = Phase::Buffered;
        }

        let due = match self.phase {
            Phase::Eager => true,
            Phase::Buffered => {
                self.buffer.len() >= self.policy.max_batch || self.interval_elapsed(now)
            }
        };

        if due { self.take_batch(now) } else { None }
    }

    /// Surface buffered completions whose interval has elapsed without a new
    /// arrival. Call periodically while a run is active.
    pub fn poll(&mut self, now: Instant) -> Option<FrameBatch> {
        if !self.buffer.is_empty() && self.interval_elapsed(now) {
            self.take_batch(now)
        } else {
            None
        }
    }

    /// Unconditionally surface whatever is buffered.
    pub fn flush(&mut self, now: Instant) -> Option<FrameBatch> {
        if self.buffer.is_empty() {
            None
        } else {
            self.take_batch(now)
        }
    }

    /// Completions seen in this run.
    pub fn total_processed(&self) -> u64 {
        self.total_processed
    }

    /// Completions waiting to be surfaced.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn interval_elapsed(&self, now: Instant) -> bool {
        self.last_flush
            .is_none_or(|last| now.saturating_duration_since(last) > self.policy.interval)
    }

    fn take_batch(&mut self, now: Instant) -> Option<FrameBatch> {
        self.last_flush = Some(now);
        Some(FrameBatch {
            frames: std::mem::take(&mut self.buffer),
            total_processed: self.total_processed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u64) -> CompletedFrame {
        CompletedFrame {
            id,
            timestamp: Duration::from_secs(id),
        }
    }

    #[test]
    fn early_completions_are_surfaced_individually() {
        let mut coalescer = UpdateCoalescer::new(CoalescerPolicy::default());
        let now = Instant::now();
        for id in 1..10 {
            let batch = coalescer.on_completion(frame(id), now).unwrap();
            assert_eq!(batch.frames, vec![frame(id)]);
            assert_eq!(batch.total_processed, id);
        }
    }

    #[test]
    fn steady_state_batches_by_size() {
        let mut coalescer = UpdateCoalescer::new(CoalescerPolicy::default());
        let now = Instant::now();
        for id in 1..10 {
            coalescer.on_completion(frame(id), now);
        }

        // Same instant: only the size threshold can trigger.
        let mut batches = Vec::new();
        for id in 10..=49 {
            if let Some(batch) = coalescer.on_completion(frame(id), now) {
                batches.push(batch);
            }
        }
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].frames.len(), 20);
        assert_eq!(batches[0].frames[0].id, 10);
        assert_eq!(batches[1].frames.len(), 20);
        assert_eq!(coalescer.pending(), 0);
    }

    #[test]
    fn steady_state_batches_by_interval() {
        let mut coalescer = UpdateCoalescer::new(CoalescerPolicy::default());
        let start = Instant::now();
        for id in 1..10 {
            coalescer.on_completion(frame(id), start);
        }
        assert!(coalescer.on_completion(frame(10), start).is_none());
        assert!(
            coalescer
                .on_completion(frame(11), start + Duration::from_millis(50))
                .is_none()
        );

        let batch = coalescer
            .on_completion(frame(12), start + Duration::from_millis(150))
            .unwrap();
        assert_eq!(
            batch.frames.iter().map(|f| f.id).collect::<Vec<_>>(),
            vec![10, 11, 12]
        );
        assert_eq!(batch.status(), "Processing: 12 frames encoded...");
    }

    #[test]
    fn poll_releases_idle_buffer() {
        let mut coalescer = UpdateCoalescer::new(CoalescerPolicy::default());
        let start = Instant::now();
        for id in 1..=10 {
            coalescer.on_completion(frame(id), start);
        }
        assert_eq!(coalescer.pending(), 1);
        assert!(coalescer.poll(start + Duration::from_millis(10)).is_none());
        let batch = coalescer.poll(start + Duration::from_millis(101)).unwrap();
        assert_eq!(batch.frames, vec![frame(10)]);
    }

    #[test]
    fn flush_emits_remaining_and_is_empty_afterwards() {
        let mut coalescer = UpdateCoalescer::new(CoalescerPolicy::default());
        let now = Instant::now();
        for id in 1..=15 {
            coalescer.on_completion(frame(id), now);
        }
        let batch = coalescer.flush(now).unwrap();
        assert_eq!(batch.frames.len(), 6);
        assert_eq!(batch.total_processed, 15);
        assert!(coalescer.flush(now).is_none());
    }

    #[test]
    fn reset_returns_to_eager_phase() {
        let mut coalescer = UpdateCoalescer::new(CoalescerPolicy::default());
        let now = Instant::now();
        for id in 1..=12 {
            coalescer.on_completion(frame(id), now);
        }
        coalescer.reset();
        assert_eq!(coalescer.total_processed(), 0);
        assert!(coalescer.on_completion(frame(1), now).is_some());
    }
}
