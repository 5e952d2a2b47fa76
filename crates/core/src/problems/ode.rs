/// Defines an ODE system whose coefficients are piecewise constant over
/// parameterization intervals.
///
/// The state is a flat `f64` slice of length [`dimension`](Self::dimension).
/// Generic interval-aware integrators drive the system by evaluating
/// [`derivative`](Self::derivative) inside a sub-interval and calling
/// [`on_interval_boundary`](Self::on_interval_boundary) whenever integration
/// crosses from one parameterization interval into another.
pub trait IntervalOde {
    /// Returns the length of the state vector.
    fn dimension(&self) -> usize;

    /// Writes the derivative of `y` at time `t` into `dydt`.
    ///
    /// `interval` is the parameterization interval of the sub-interval being
    /// integrated, so implementations never have to look it up from `t`.
    /// Both slices have length [`dimension`](Self::dimension).
    fn derivative(&self, t: f64, y: &[f64], interval: usize, dydt: &mut [f64]);

    /// Applies a discrete jump to the carried state when integration crosses
    /// a parameterization boundary.
    ///
    /// Called exactly once per crossing with the boundary time and the
    /// parameterization interval indices on either side (`from` is the
    /// interval being left). The jump at the boundary between intervals `k`
    /// and `k + 1` belongs to interval `k` regardless of direction.
    ///
    /// The default implementation leaves the state unchanged.
    fn on_interval_boundary(&self, _time: f64, _from: usize, _to: usize, _state: &mut [f64]) {}
}
