//! Sample timestamp computation.
//!
//! A video of `d` seconds sampled at `f` samples per second yields
//! `ceil(d * f)` timestamps `0, 1/f, 2/f, …`, all strictly below `d`.
//! Each timestamp is derived from its index rather than by repeated
//! addition, so long videos do not accumulate rounding drift.

use std::time::Duration;

use crate::error::FilmstripError;

/// Products within this distance of an integer are treated as that integer.
///
/// `0.04 * 25.0` is not exactly `1.0` in binary floating point, and without
/// snapping would round up to two samples.
const SNAP_EPSILON: f64 = 1e-9;

/// The ordered timestamps to visit for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSchedule {
    duration_seconds: f64,
    fps: u32,
    count: u64,
}

impl SampleSchedule {
    /// Build the schedule for a video of `duration_seconds` sampled at `fps`.
    ///
    /// # Errors
    ///
    /// - [`FilmstripError::InvalidSampleRate`] if `fps` is zero.
    /// - [`FilmstripError::DurationUnavailable`] if the duration is NaN,
    ///   infinite, or not positive.
    ///
    /// # Example
    ///
    /// ```
    /// use filmstrip::SampleSchedule;
    ///
    /// let schedule = SampleSchedule::new(2.0, 25)?;
    /// assert_eq!(schedule.len(), 50);
    /// # Ok::<(), filmstrip::FilmstripError>(())
    /// ```
    pub fn new(duration_seconds: f64, fps: u32) -> Result<Self, FilmstripError> {
        if fps == 0 {
            return Err(FilmstripError::InvalidSampleRate);
        }
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            return Err(FilmstripError::DurationUnavailable(duration_seconds));
        }

        let exact = duration_seconds * f64::from(fps);
        let nearest = exact.round();
        let count = if (exact - nearest).abs() < SNAP_EPSILON {
            nearest as u64
        } else {
            exact.ceil() as u64
        };

        Ok(Self {
            duration_seconds,
            fps,
            count: count.max(1),
        })
    }

    /// Number of timestamps in the schedule.
    pub fn len(&self) -> u64 {
        self.count
    }

    /// Always `false`; a valid schedule has at least one timestamp.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The sampling rate.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// The duration the schedule covers.
    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// The timestamp of sample `index`, if it is part of the schedule.
    pub fn timestamp(&self, index: u64) -> Option<Duration> {
        (index < self.count).then(|| Duration::from_secs_f64(index as f64 / f64::from(self.fps)))
    }

    /// Iterate over every timestamp in increasing order.
    pub fn timestamps(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.count).filter_map(|index| self.timestamp(index))
    }
}
