//! Piecewise-constant rate parameters of a multi-type birth-death-migration
//! process.

mod skyline;

pub use skyline::{IntervalRates, ParameterizationError, SkylineParameterization};

use nalgebra::DMatrix;

/// Read-only access to the rates of a birth-death-migration process.
///
/// Time runs forward from the origin of the process (`t = 0`) to the present
/// (`t = T`, the total process length). The process time is split into
/// parameterization intervals with constant rates; interval `k` ends at
/// `interval_end_times()[k]` and the last interval ends at `T`.
///
/// Rho sampling happens instantaneously at the end of an interval, with the
/// per-type probabilities returned by [`rho_values`](Self::rho_values).
pub trait Parameterization {
    /// Number of types (demes).
    fn type_count(&self) -> usize;

    /// Total length `T` of the process.
    fn total_process_length(&self) -> f64;

    /// End times of the parameterization intervals, ascending, ending at `T`.
    fn interval_end_times(&self) -> &[f64];

    /// Number of parameterization intervals.
    fn interval_count(&self) -> usize {
        self.interval_end_times().len()
    }

    /// Index of the interval containing `time`.
    ///
    /// A time equal to an interval end belongs to that interval. Times
    /// outside `[0, T]` clamp to the first or last interval.
    fn interval_index(&self, time: f64) -> usize {
        let ends = self.interval_end_times();
        ends.partition_point(|&end| end < time)
            .min(ends.len().saturating_sub(1))
    }

    /// Per-type birth rates within an interval.
    fn birth_rates(&self, interval: usize) -> &[f64];

    /// Per-type death rates within an interval.
    fn death_rates(&self, interval: usize) -> &[f64];

    /// Per-type sampling rates within an interval.
    fn sampling_rates(&self, interval: usize) -> &[f64];

    /// Per-type probabilities that a sampled lineage is removed.
    fn removal_probs(&self, interval: usize) -> &[f64];

    /// Per-type rho-sampling probabilities at the end of an interval.
    fn rho_values(&self, interval: usize) -> &[f64];

    /// Cross-birth rates `b_ij` (a type `i` parent giving birth to type `j`).
    fn cross_birth_rates(&self, interval: usize) -> &DMatrix<f64>;

    /// Migration rates `m_ij` (a type `i` lineage moving to type `j`).
    fn migration_rates(&self, interval: usize) -> &DMatrix<f64>;

    /// Times at which rho sampling with positive probability occurs.
    fn rho_sampling_times(&self) -> Vec<f64> {
        self.interval_end_times()
            .iter()
            .enumerate()
            .filter(|&(k, _)| self.rho_values(k).iter().any(|&rho| rho > 0.0))
            .map(|(_, &end)| end)
            .collect()
    }
}
