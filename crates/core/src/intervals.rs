//! Splitting of the process time into integration sub-intervals.
//!
//! The process time `[0, T]` is first divided by the parameterization into
//! intervals of constant rates. For numerical stability the integrators split
//! it further so that no sub-interval is longer than a requested maximum size.
//! Every parameterization boundary is always a sub-interval edge.

use thiserror::Error;

use crate::Parameterization;

/// Default tolerance used when deciding whether a sub-interval end coincides
/// with a parameterization boundary.
pub const DEFAULT_BOUNDARY_EPSILON: f64 = 1e-10;

/// A sub-interval of the process time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    /// Position of this sub-interval in chronological order.
    pub index: usize,

    /// Index of the parameterization interval this sub-interval lies in.
    pub parameterization_interval: usize,

    /// Start time (closer to the origin of the process).
    pub start: f64,

    /// End time (closer to the present).
    pub end: f64,
}

impl Interval {
    /// Creates a new sub-interval.
    #[must_use]
    pub fn new(index: usize, parameterization_interval: usize, start: f64, end: f64) -> Self {
        Self {
            index,
            parameterization_interval,
            start,
            end,
        }
    }

    /// Returns the length of the sub-interval.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    /// Returns whether `time` lies in `(start, end]`.
    ///
    /// Times that coincide with a boundary belong to the older sub-interval.
    #[must_use]
    pub fn contains(&self, time: f64) -> bool {
        self.start < time && time <= self.end
    }
}

/// Errors that can occur when building sub-intervals.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum IntervalError {
    #[error("maximum sub-interval size must be finite and positive, got {0}")]
    MaxSize(f64),

    #[error("boundary epsilon must be finite and non-negative, got {0}")]
    Epsilon(f64),

    #[error("parameterization interval end times must be finite, positive and ascending")]
    EndTimes,
}

/// Builds the sub-intervals for a parameterization.
///
/// See [`build`] for the splitting rules.
///
/// # Errors
///
/// Returns an error if `max_size` or `epsilon` is invalid.
pub fn for_parameterization<P>(
    parameterization: &P,
    max_size: f64,
    epsilon: f64,
) -> Result<Vec<Interval>, IntervalError>
where
    P: Parameterization + ?Sized,
{
    build(parameterization.interval_end_times(), max_size, epsilon)
}

/// Splits `[0, end_times.last()]` into sub-intervals.
///
/// Walking forward from `t = 0`, a sub-interval ends at the next
/// parameterization boundary if that boundary is at most `max_size` away
/// (within `epsilon`), and otherwise after exactly `max_size`. The result
/// partitions the process time, never straddles a parameterization boundary,
/// and never exceeds `max_size` (beyond `epsilon`).
///
/// # Errors
///
/// Returns an error if `max_size` is not positive, `epsilon` is negative, or
/// the end times are not ascending.
pub fn build(end_times: &[f64], max_size: f64, epsilon: f64) -> Result<Vec<Interval>, IntervalError> {
    if !max_size.is_finite() || max_size <= 0.0 {
        return Err(IntervalError::MaxSize(max_size));
    }
    if !epsilon.is_finite() || epsilon < 0.0 {
        return Err(IntervalError::Epsilon(epsilon));
    }
    let ascending = end_times
        .iter()
        .try_fold(0.0_f64, |prev, &t| (t.is_finite() && t > prev).then_some(t))
        .is_some();
    if end_times.is_empty() || !ascending {
        return Err(IntervalError::EndTimes);
    }

    let mut intervals = Vec::new();
    let mut parameterization_interval = 0;
    let mut start = 0.0;

    while parameterization_interval < end_times.len() {
        let boundary = end_times[parameterization_interval];
        let max_end = start + max_size;

        if boundary < max_end || (boundary - max_end).abs() <= epsilon {
            intervals.push(Interval::new(
                intervals.len(),
                parameterization_interval,
                start,
                boundary,
            ));
            start = boundary;
            parameterization_interval += 1;
        } else {
            intervals.push(Interval::new(
                intervals.len(),
                parameterization_interval,
                start,
                max_end,
            ));
            start = max_end;
        }
    }

    Ok(intervals)
}

/// Returns the position of the sub-interval containing `time`.
///
/// A time on a boundary belongs to the older sub-interval. Times outside the
/// covered span clamp to the first or last sub-interval, which absorbs
/// round-off at node times that coincide with interval edges.
///
/// # Panics
///
/// Panics if `intervals` is empty.
#[must_use]
pub fn locate(intervals: &[Interval], time: f64) -> usize {
    assert!(!intervals.is_empty(), "no sub-intervals to search");
    intervals
        .partition_point(|interval| interval.end < time)
        .min(intervals.len() - 1)
}

/// Restricts sub-intervals to the time span `[start, end]`.
///
/// Sub-intervals outside the span are dropped, the ones at its edges are
/// clipped, and the result is re-indexed from zero. Empty clips are skipped.
#[must_use]
pub fn clip(intervals: &[Interval], start: f64, end: f64) -> Vec<Interval> {
    let mut clipped = Vec::new();

    for interval in intervals {
        let lo = interval.start.max(start);
        let hi = interval.end.min(end);
        if hi > lo {
            clipped.push(Interval::new(
                clipped.len(),
                interval.parameterization_interval,
                lo,
                hi,
            ));
        }
    }

    clipped
}
