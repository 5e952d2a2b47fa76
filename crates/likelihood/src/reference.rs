//! The per-edge likelihood algorithm the flow replaces.
//!
//! Every edge integrates the coupled nonlinear `(p, g)` system across its own
//! time span. This costs one ODE solve per edge and exists to validate the
//! flow-based engine.

use bdmmflow_core::{Interval, IntervalOde, Parameterization, PhyloTree, intervals};
use bdmmflow_solvers::ode;
use nalgebra::DVector;

use crate::extinction::{ExtinctionOde, ExtinctionProbabilities};
use crate::likelihood::{self, Prepared};
use crate::traversal::EdgePropagator;
use crate::{Config, Error};

/// The joint extinction and likelihood ODE.
///
/// The state holds `p` in its first half and `g` in its second half.
pub struct JointOde<'a, P: ?Sized> {
    parameterization: &'a P,
    extinction: ExtinctionOde<'a, P>,
}

impl<'a, P: Parameterization + ?Sized> JointOde<'a, P> {
    #[must_use]
    pub fn new(parameterization: &'a P) -> Self {
        Self {
            parameterization,
            extinction: ExtinctionOde::new(parameterization),
        }
    }
}

impl<P: Parameterization + ?Sized> IntervalOde for JointOde<'_, P> {
    fn dimension(&self) -> usize {
        2 * self.parameterization.type_count()
    }

    fn derivative(&self, t: f64, y: &[f64], interval: usize, dydt: &mut [f64]) {
        let n = self.parameterization.type_count();
        let (p, g) = y.split_at(n);
        let (dp, dg) = dydt.split_at_mut(n);
        self.extinction.derivative(t, p, interval, dp);

        let param = self.parameterization;
        let birth = param.birth_rates(interval);
        let death = param.death_rates(interval);
        let sampling = param.sampling_rates(interval);
        let cross_birth = param.cross_birth_rates(interval);
        let migration = param.migration_rates(interval);

        for i in 0..n {
            let mut rate = (birth[i] + death[i] + sampling[i] - 2.0 * birth[i] * p[i]) * g[i];

            for j in (0..n).filter(|&j| j != i) {
                rate += (migration[(i, j)] + cross_birth[(i, j)]) * g[i] - migration[(i, j)] * g[j];
                rate -= cross_birth[(i, j)] * (p[j] * g[i] + p[i] * g[j]);
            }

            dg[i] = rate;
        }
    }

    fn on_interval_boundary(&self, _time: f64, from: usize, to: usize, state: &mut [f64]) {
        let n = self.parameterization.type_count();
        let rho = self.parameterization.rho_values(from.min(to));
        for (index, value) in state.iter_mut().enumerate() {
            *value *= 1.0 - rho[index % n];
        }
    }
}

/// Propagates edges by integrating the joint ODE.
pub struct ReferencePropagator<'a, P: ?Sized> {
    system: JointOde<'a, P>,
    extinction: &'a ExtinctionProbabilities,
    intervals: &'a [Interval],
    ode_config: &'a ode::Config,
}

impl<'a, P: Parameterization + ?Sized> ReferencePropagator<'a, P> {
    #[must_use]
    pub fn new(
        parameterization: &'a P,
        extinction: &'a ExtinctionProbabilities,
        intervals: &'a [Interval],
        ode_config: &'a ode::Config,
    ) -> Self {
        Self {
            system: JointOde::new(parameterization),
            extinction,
            intervals,
            ode_config,
        }
    }
}

impl<P: Parameterization + ?Sized> EdgePropagator for ReferencePropagator<'_, P> {
    fn propagate(&mut self, ts: f64, te: f64, g: &DVector<f64>) -> Result<DVector<f64>, Error> {
        let span = intervals::clip(self.intervals, ts, te);
        if span.is_empty() {
            return Ok(g.clone());
        }

        let mut initial = self.extinction.at(te);
        initial.extend(g.iter());

        let solutions = ode::integrate_backward(&self.system, &initial, &span, false, self.ode_config)?;
        let n = g.len();
        Ok(DVector::from_column_slice(&solutions[0].final_state()[n..]))
    }
}

/// Computes the tree log-likelihood by integrating every edge separately.
///
/// Accepts the same inputs as [`compute_log_likelihood`](crate::compute_log_likelihood);
/// the flow kind, initial basis, seed and reset settings are ignored.
///
/// # Errors
///
/// Returns an error for invalid inputs or a failed integration.
pub fn log_likelihood<T, P>(tree: &T, parameterization: &P, config: &Config) -> Result<f64, Error>
where
    T: PhyloTree + ?Sized,
    P: Parameterization + ?Sized,
{
    let Prepared {
        intervals,
        ode_config,
        extinction,
    } = likelihood::prepare(tree, parameterization, config)?;

    let mut propagator = ReferencePropagator::new(parameterization, &extinction, &intervals, &ode_config);
    likelihood::assemble(tree, parameterization, config, &extinction, &mut propagator)
}
