/// Work counters of an integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Accepted steps.
    pub accepted: usize,

    /// Rejected steps.
    pub rejected: usize,

    /// Derivative evaluations.
    pub evaluations: usize,
}

impl std::ops::AddAssign for Stats {
    fn add_assign(&mut self, other: Self) {
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.evaluations += other.evaluations;
    }
}

/// Number of interpolation coefficient vectors stored per step.
pub(crate) const COEFFICIENTS: usize = 5;

/// A continuous solution over one integration span.
///
/// Each accepted step stores the coefficients of the fourth-order
/// Dormand-Prince interpolant, so the state can be evaluated anywhere in the
/// span without re-integrating.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseSolution {
    t_start: f64,
    t_end: f64,
    initial: Vec<f64>,
    last: Vec<f64>,
    step_starts: Vec<f64>,
    step_sizes: Vec<f64>,
    coefficients: Vec<f64>,
    stats: Stats,
}

impl DenseSolution {
    pub(crate) fn new(t_start: f64, t_end: f64, initial: Vec<f64>) -> Self {
        let last = initial.clone();
        Self {
            t_start,
            t_end,
            initial,
            last,
            step_starts: Vec::new(),
            step_sizes: Vec::new(),
            coefficients: Vec::new(),
            stats: Stats::default(),
        }
    }

    /// Records an accepted step from `t_old` of size `h`.
    ///
    /// `coefficients` holds the interpolant coefficient vectors back to back.
    pub(crate) fn push_step(&mut self, t_old: f64, h: f64, coefficients: &[f64], y_new: &[f64]) {
        debug_assert_eq!(coefficients.len(), COEFFICIENTS * self.dimension());
        self.step_starts.push(t_old);
        self.step_sizes.push(h);
        self.coefficients.extend_from_slice(coefficients);
        self.last.copy_from_slice(y_new);
    }

    pub(crate) fn set_stats(&mut self, stats: Stats) {
        self.stats = stats;
    }

    /// Length of the state vector.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.initial.len()
    }

    /// Time at which integration started.
    #[must_use]
    pub fn initial_time(&self) -> f64 {
        self.t_start
    }

    /// Time at which integration ended.
    #[must_use]
    pub fn final_time(&self) -> f64 {
        self.t_end
    }

    /// State at [`initial_time`](Self::initial_time).
    #[must_use]
    pub fn initial_state(&self) -> &[f64] {
        &self.initial
    }

    /// State at [`final_time`](Self::final_time).
    #[must_use]
    pub fn final_state(&self) -> &[f64] {
        &self.last
    }

    /// Number of accepted steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.step_starts.len()
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Returns the earliest and latest time covered, in ascending order.
    #[must_use]
    pub fn span(&self) -> (f64, f64) {
        (self.t_start.min(self.t_end), self.t_start.max(self.t_end))
    }

    /// Evaluates the state at `t`.
    ///
    /// Times outside the integrated span are clamped to its nearest end.
    #[must_use]
    pub fn evaluate(&self, t: f64) -> Vec<f64> {
        let mut out = vec![0.0; self.dimension()];
        self.evaluate_into(t, &mut out);
        out
    }

    /// Evaluates the state at `t` into `out`.
    ///
    /// Times outside the integrated span are clamped to its nearest end.
    ///
    /// # Panics
    ///
    /// Panics if `out` does not have length [`dimension`](Self::dimension).
    pub fn evaluate_into(&self, t: f64, out: &mut [f64]) {
        assert_eq!(out.len(), self.dimension(), "output has wrong dimension");

        let (lo, hi) = self.span();
        let t = t.clamp(lo, hi);

        if self.step_starts.is_empty() {
            out.copy_from_slice(&self.initial);
            return;
        }
        if t == self.t_end {
            out.copy_from_slice(&self.last);
            return;
        }

        // Step starts are monotone in the direction of integration.
        let direction = if self.t_end >= self.t_start { 1.0 } else { -1.0 };
        let step = self
            .step_starts
            .partition_point(|&start| direction * start <= direction * t)
            .saturating_sub(1);

        let n = self.dimension();
        let h = self.step_sizes[step];
        let theta = (t - self.step_starts[step]) / h;
        let theta1 = 1.0 - theta;

        let c = &self.coefficients[step * COEFFICIENTS * n..(step + 1) * COEFFICIENTS * n];
        for (i, value) in out.iter_mut().enumerate() {
            *value = c[i]
                + theta
                    * (c[n + i]
                        + theta1 * (c[2 * n + i] + theta * (c[3 * n + i] + theta1 * c[4 * n + i])));
        }
    }
}
