//! Capture timestamp planning.
//!
//! A [`TimestampPlan`] is the ordered list of source offsets the capture loop
//! visits for one run. Offsets are spaced `1 / rate` apart starting at the
//! start time, and the plan always ends exactly on the end time.

use std::time::Duration;

use crate::configuration::ExtractionSettings;
use crate::error::FrameFlowError;

/// A regular step landing closer than this to the end time is snapped onto
/// it instead of getting a separate final capture.
pub const END_EPSILON: Duration = Duration::from_millis(50);

/// Ordered, deduplicated capture timestamps for one run.
///
/// Invariants: non-empty, strictly increasing, first element is the start
/// time and last element is the end time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampPlan {
    timestamps: Vec<Duration>,
}

impl TimestampPlan {
    /// Build the plan for validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`FrameFlowError::InvalidSettings`] if the settings fail
    /// [`ExtractionSettings::validate`].
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use frameflow::{ExtractionSettings, ImageFormat, TimestampPlan};
    ///
    /// let settings = ExtractionSettings::new(
    ///     2.0,
    ///     0.8,
    ///     ImageFormat::Png,
    ///     Duration::ZERO,
    ///     Duration::from_secs(5),
    /// );
    /// let plan = TimestampPlan::from_settings(&settings)?;
    /// assert_eq!(plan.len(), 11);
    /// assert_eq!(plan.last(), Duration::from_secs(5));
    /// # Ok::<(), frameflow::FrameFlowError>(())
    /// ```
    pub fn from_settings(settings: &ExtractionSettings) -> Result<Self, FrameFlowError> {
        settings.validate()?;

        let start = settings.start_time.as_secs_f64();
        let end = settings.end_time.as_secs_f64();
        let interval = 1.0 / settings.rate;

        let mut timestamps = Vec::new();
        let mut step: u64 = 0;
        loop {
            // Multiply rather than accumulate so long plans do not drift.
            let offset = start + step as f64 * interval;
            if offset >= end {
                break;
            }
            timestamps.push(Duration::from_secs_f64(offset));
            step += 1;
        }

        match timestamps.last_mut() {
            Some(last) if settings.end_time.saturating_sub(*last) <= END_EPSILON => {
                *last = settings.end_time;
            }
            _ => timestamps.push(settings.end_time),
        }

        log::debug!(
            "Planned {} captures between {:?} and {:?} at {} fps",
            timestamps.len(),
            settings.start_time,
            settings.end_time,
            settings.rate
        );

        Ok(Self { timestamps })
    }

    /// Number of planned captures.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Always `false`; a plan holds at least the end time.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The planned timestamps in capture order.
    pub fn timestamps(&self) -> &[Duration] {
        &self.timestamps
    }

    /// The final planned timestamp, equal to the end time.
    pub fn last(&self) -> Duration {
        self.timestamps.last().copied().unwrap_or_default()
    }

    /// Iterate `(id, timestamp)` pairs with 1-based ids in plan order.
    pub fn iter_with_ids(&self) -> impl Iterator<Item = (u64, Duration)> + '_ {
        self.timestamps
            .iter()
            .enumerate()
            .map(|(index, &timestamp)| (index as u64 + 1, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::ImageFormat;

    fn settings(rate: f64, start: f64, end: f64) -> ExtractionSettings {
        ExtractionSettings::new(
            rate,
            0.8,
            ImageFormat::Webp,
            Duration::from_secs_f64(start),
            Duration::from_secs_f64(end),
        )
    }

    #[test]
    fn two_fps_over_five_seconds() {
        let plan = TimestampPlan::from_settings(&settings(2.0, 0.0, 5.0)).unwrap();
        let expected: Vec<Duration> = (0..=10)
            .map(|step| Duration::from_secs_f64(step as f64 * 0.5))
            .collect();
        assert_eq!(plan.timestamps(), expected.as_slice());
    }

    #[test]
    fn step_within_epsilon_is_not_duplicated() {
        let plan = TimestampPlan::from_settings(&settings(1.0, 0.0, 5.03)).unwrap();
        assert_eq!(plan.len(), 6);
        assert_eq!(plan.last(), Duration::from_secs_f64(5.03));
        assert_eq!(plan.timestamps()[4], Duration::from_secs(4));
    }

    #[test]
    fn step_short_of_end_appends_end() {
        let plan = TimestampPlan::from_settings(&settings(1.0, 0.0, 2.5)).unwrap();
        assert_eq!(
            plan.timestamps(),
            &[
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs_f64(2.5)
            ]
        );
    }

    #[test]
    fn empty_range_yields_single_capture() {
        let plan = TimestampPlan::from_settings(&settings(4.0, 3.0, 3.0)).unwrap();
        assert_eq!(plan.timestamps(), &[Duration::from_secs(3)]);
    }

    #[test]
    fn plan_starts_at_start_time_and_increases() {
        let plan = TimestampPlan::from_settings(&settings(3.0, 1.5, 4.0)).unwrap();
        assert_eq!(plan.timestamps()[0], Duration::from_secs_f64(1.5));
        assert_eq!(plan.last(), Duration::from_secs(4));
        for window in plan.timestamps().windows(2) {
            assert!(window[1] > window[0]);
        }
    }

    #[test]
    fn ids_are_one_based_and_dense() {
        let plan = TimestampPlan::from_settings(&settings(1.0, 0.0, 2.0)).unwrap();
        let ids: Vec<u64> = plan.iter_with_ids().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(TimestampPlan::from_settings(&settings(0.0, 0.0, 1.0)).is_err());
    }

    #[test]
    fn subnormal_rate_is_rejected_instead_of_panicking() {
        let result = TimestampPlan::from_settings(&settings(5e-309, 0.0, 1.0));
        assert!(matches!(result, Err(FrameFlowError::InvalidSettings(_))));
    }
}
