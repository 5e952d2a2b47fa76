//! Per-type extinction probabilities.
//!
//! `p_i(t)` is the probability that a lineage of type `i` alive at time `t`
//! leaves no sampled descendants. It is integrated backward once from the
//! present and then queried at every node and inside every flow derivative.

use bdmmflow_core::{Interval, IntervalOde, Parameterization, intervals};
use bdmmflow_solvers::ode::{self, DenseSolution, Stats};

/// The nonlinear extinction-probability ODE.
#[derive(Debug)]
pub struct ExtinctionOde<'a, P: ?Sized> {
    parameterization: &'a P,
}

impl<'a, P: Parameterization + ?Sized> ExtinctionOde<'a, P> {
    #[must_use]
    pub fn new(parameterization: &'a P) -> Self {
        Self { parameterization }
    }
}

impl<P: Parameterization + ?Sized> IntervalOde for ExtinctionOde<'_, P> {
    fn dimension(&self) -> usize {
        self.parameterization.type_count()
    }

    fn derivative(&self, _t: f64, y: &[f64], interval: usize, dydt: &mut [f64]) {
        let param = self.parameterization;
        let birth = param.birth_rates(interval);
        let death = param.death_rates(interval);
        let sampling = param.sampling_rates(interval);
        let cross_birth = param.cross_birth_rates(interval);
        let migration = param.migration_rates(interval);

        for i in 0..y.len() {
            let mut rate = (birth[i] + death[i] + sampling[i]) * y[i] - birth[i] * y[i] * y[i]
                - death[i];

            for j in (0..y.len()).filter(|&j| j != i) {
                rate += cross_birth[(i, j)] * (y[i] - y[i] * y[j]);
                rate += migration[(i, j)] * (y[i] - y[j]);
            }

            dydt[i] = rate;
        }
    }

    /// Rho sampling at the boundary removes lineages that were sampled.
    fn on_interval_boundary(&self, _time: f64, from: usize, to: usize, state: &mut [f64]) {
        let rho = self.parameterization.rho_values(from.min(to));
        for (p, rho) in state.iter_mut().zip(rho) {
            *p *= 1.0 - rho;
        }
    }
}

/// The extinction probabilities over the whole process time.
#[derive(Debug, Clone)]
pub struct ExtinctionProbabilities {
    intervals: Vec<Interval>,
    solutions: Vec<DenseSolution>,
}

impl ExtinctionProbabilities {
    /// Integrates the extinction ODE backward from the present.
    ///
    /// The state at `T` is `1 - rho` of the last parameterization interval.
    ///
    /// # Errors
    ///
    /// Returns an error if integration fails.
    pub fn compute<P>(
        parameterization: &P,
        intervals: &[Interval],
        config: &ode::Config,
    ) -> Result<Self, ode::Error>
    where
        P: Parameterization + ?Sized,
    {
        let last = parameterization.interval_count() - 1;
        let initial: Vec<f64> = parameterization
            .rho_values(last)
            .iter()
            .map(|rho| 1.0 - rho)
            .collect();

        let system = ExtinctionOde::new(parameterization);
        let solutions = ode::integrate_backward(&system, &initial, intervals, false, config)?;

        Ok(Self {
            intervals: intervals.to_vec(),
            solutions,
        })
    }

    /// Returns the extinction probabilities at time `t`.
    #[must_use]
    pub fn at(&self, t: f64) -> Vec<f64> {
        self.solutions[intervals::locate(&self.intervals, t)].evaluate(t)
    }

    /// Writes the extinction probabilities at time `t` into `out`.
    pub fn at_into(&self, t: f64, out: &mut [f64]) {
        self.solutions[intervals::locate(&self.intervals, t)].evaluate_into(t, out);
    }

    /// Returns the extinction probabilities at time `t`, seen from inside
    /// parameterization interval `k`.
    ///
    /// This differs from [`at`](Self::at) only on a rho-sampling boundary,
    /// where it returns the value before the jump if `k` is the younger side.
    #[must_use]
    pub fn at_in_interval(&self, t: f64, k: usize) -> Vec<f64> {
        let mut index = intervals::locate(&self.intervals, t);
        if self.intervals[index].parameterization_interval < k && index + 1 < self.intervals.len() {
            index += 1;
        }
        self.solutions[index].evaluate(t)
    }

    /// Returns the combined work counters of the integration.
    #[must_use]
    pub fn stats(&self) -> Stats {
        let mut total = Stats::default();
        for solution in &self.solutions {
            total += solution.stats();
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use bdmmflow_core::intervals::DEFAULT_BOUNDARY_EPSILON;
    use bdmmflow_core::{IntervalRates, SkylineParameterization};
    use nalgebra::DMatrix;

    fn tight(process_length: f64) -> ode::Config {
        ode::Config::for_process_length(process_length, 1e-14, 1e-12).unwrap()
    }

    /// Extinction probability of the single-type process, `tau` before the present.
    fn closed_form(birth: f64, death: f64, sampling: f64, rho: f64, tau: f64) -> f64 {
        let c1 = ((birth - death - sampling).powi(2) + 4.0 * birth * sampling).sqrt();
        let c2 = -(birth - death - 2.0 * birth * rho - sampling) / c1;
        let decay = (-c1 * tau).exp();
        (birth + death + sampling
            + c1 * (decay * (1.0 - c2) - (1.0 + c2)) / (decay * (1.0 - c2) + (1.0 + c2)))
            / (2.0 * birth)
    }

    #[test]
    fn single_type_matches_closed_form() {
        let rates = IntervalRates::zeros(1)
            .with_birth(vec![2.0])
            .with_death(vec![0.5])
            .with_sampling(vec![0.5])
            .with_rho(vec![0.3]);
        let param = SkylineParameterization::constant(3.0, rates).unwrap();
        let intervals = intervals::for_parameterization(&param, 0.75, DEFAULT_BOUNDARY_EPSILON).unwrap();

        let extinction = ExtinctionProbabilities::compute(&param, &intervals, &tight(3.0)).unwrap();

        for t in [0.0, 0.4, 0.75, 1.9, 2.5, 3.0] {
            let expected = closed_form(2.0, 0.5, 0.5, 0.3, 3.0 - t);
            assert_relative_eq!(extinction.at(t)[0], expected, max_relative = 1e-8);
        }
        assert!(extinction.stats().accepted > 0);
    }

    #[test]
    fn identical_types_behave_like_one_type() {
        let rates = IntervalRates::zeros(2)
            .with_birth(vec![2.0, 2.0])
            .with_death(vec![0.5, 0.5])
            .with_sampling(vec![0.5, 0.5])
            .with_migration(DMatrix::from_element(2, 2, 0.7));
        let param = SkylineParameterization::constant(2.0, rates).unwrap();
        let intervals = intervals::for_parameterization(&param, 0.5, DEFAULT_BOUNDARY_EPSILON).unwrap();

        let extinction = ExtinctionProbabilities::compute(&param, &intervals, &tight(2.0)).unwrap();

        for t in [0.0, 1.0, 1.7] {
            let p = extinction.at(t);
            let expected = closed_form(2.0, 0.5, 0.5, 0.0, 2.0 - t);
            assert_relative_eq!(p[0], expected, max_relative = 1e-8);
            assert_relative_eq!(p[1], expected, max_relative = 1e-8);
        }
    }

    #[test]
    fn rho_sampling_jumps_at_boundaries() {
        let base = IntervalRates::zeros(1)
            .with_birth(vec![1.0])
            .with_death(vec![0.5])
            .with_sampling(vec![0.2]);
        let rates = vec![base.clone().with_rho(vec![0.4]), base];
        let param = SkylineParameterization::new(2.0, &[1.0], rates).unwrap();
        let intervals = intervals::for_parameterization(&param, 2.0, DEFAULT_BOUNDARY_EPSILON).unwrap();

        let extinction = ExtinctionProbabilities::compute(&param, &intervals, &tight(2.0)).unwrap();

        let young_side = closed_form(1.0, 0.5, 0.2, 0.0, 1.0);
        assert_relative_eq!(extinction.at(1.0)[0], 0.6 * young_side, max_relative = 1e-8);
        assert_relative_eq!(extinction.at(1.0 + 1e-9)[0], young_side, max_relative = 1e-6);
        assert_relative_eq!(extinction.at_in_interval(1.0, 1)[0], young_side, max_relative = 1e-8);
        assert_relative_eq!(extinction.at_in_interval(1.0, 0)[0], 0.6 * young_side, max_relative = 1e-8);
        assert_relative_eq!(extinction.at(2.0)[0], 1.0);
    }

    #[test]
    fn derivative_includes_cross_birth_and_migration() {
        let rates = IntervalRates::zeros(2)
            .with_birth(vec![1.0, 2.0])
            .with_death(vec![0.5, 0.25])
            .with_sampling(vec![0.1, 0.2])
            .with_cross_birth(DMatrix::from_row_slice(2, 2, &[0.0, 0.3, 0.4, 0.0]))
            .with_migration(DMatrix::from_row_slice(2, 2, &[0.0, 0.6, 0.8, 0.0]));
        let param = SkylineParameterization::constant(1.0, rates).unwrap();
        let system = ExtinctionOde::new(&param);
        let y = [0.9, 0.8];
        let mut dydt = [0.0; 2];

        system.derivative(0.5, &y, 0, &mut dydt);

        let expected0 = 1.6 * 0.9 - 0.81 - 0.5 + 0.3 * (0.9 - 0.72) + 0.6 * (0.9 - 0.8);
        let expected1 = 2.45 * 0.8 - 2.0 * 0.64 - 0.25 + 0.4 * (0.8 - 0.72) + 0.8 * (0.8 - 0.9);
        assert_relative_eq!(dydt[0], expected0, epsilon = 1e-14);
        assert_relative_eq!(dydt[1], expected1, epsilon = 1e-14);
    }
}
