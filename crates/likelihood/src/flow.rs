//! Flow of the linear likelihood ODE along edges.
//!
//! The flow `Ψ(t)` solves the matrix form of the likelihood ODE once per
//! evaluation. Any edge then propagates by linear algebra alone: for the
//! direct flow `g(ts) = Ψ(ts) Ψ(te)⁻¹ g(te)`, and for the inverse flow
//! `g(ts) = Ψ(ts)⁻¹ Ψ(te) g(te)`.
//!
//! When the integration restarts in every sub-interval, `Ψ` is only known
//! piecewise. Flows are then composed across sub-intervals relative to a
//! reference sub-interval, and the rho jumps between parameterization
//! intervals are folded into the composition.

mod basis;
mod cache;
mod system;

use std::collections::HashMap;

use bdmmflow_core::{Interval, Parameterization, intervals};
use bdmmflow_solvers::ode::{self, DenseSolution, Stats};
use nalgebra::{DMatrix, DVector, Dyn, linalg::QR};

use crate::extinction::ExtinctionProbabilities;
use crate::{Config, Error, FlowKind};

use basis::Basis;
use cache::LruCache;
use system::FlowOde;

/// Number of flow matrices and decompositions kept around.
const CACHE_CAPACITY: usize = 16;

/// Reference used for cache keys when the flow is continuous.
const CONTINUOUS: usize = usize::MAX;

/// The integrated flow, ready to propagate likelihood vectors.
#[derive(Debug)]
pub struct Flow {
    kind: FlowKind,
    type_count: usize,
    intervals: Vec<Interval>,
    solutions: Vec<DenseSolution>,
    basis_inverse: DMatrix<f64>,
    rho_complements: Vec<Vec<f64>>,
    coupled: DMatrix<bool>,
    reset: bool,
    compositions: HashMap<(usize, usize), DMatrix<f64>>,
    flows: LruCache<(u64, usize, usize), DMatrix<f64>>,
    decompositions: LruCache<(u64, usize, usize), QR<f64, Dyn, Dyn>>,
}

impl Flow {
    /// Integrates the flow over `intervals`.
    ///
    /// The kind, initial basis, seed and reset mode come from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if integration fails.
    pub fn compute<P>(
        parameterization: &P,
        extinction: &ExtinctionProbabilities,
        intervals: &[Interval],
        config: &Config,
        ode_config: &ode::Config,
    ) -> Result<Self, ode::Error>
    where
        P: Parameterization + ?Sized,
    {
        let type_count = parameterization.type_count();
        let kind = config.flow();
        let reset = config.reset().applies(intervals.len());
        let basis = Basis::generate(config.initial_basis(), type_count, config.seed());

        let system = FlowOde::new(parameterization, extinction, kind, !reset);
        let initial = basis.matrix.as_slice();
        let solutions = match kind {
            FlowKind::Direct => ode::integrate_backward(&system, initial, intervals, reset, ode_config)?,
            FlowKind::Inverse => ode::integrate_forward(&system, initial, intervals, reset, ode_config)?,
        };

        let rho_complements = (0..parameterization.interval_count())
            .map(|k| {
                parameterization
                    .rho_values(k)
                    .iter()
                    .map(|rho| 1.0 - rho)
                    .collect()
            })
            .collect();

        let coupled = coupling(parameterization);

        log::debug!(
            "{kind:?} flow over {} sub-intervals (reset: {reset})",
            intervals.len()
        );

        Ok(Self {
            kind,
            type_count,
            intervals: intervals.to_vec(),
            solutions,
            basis_inverse: basis.inverse,
            rho_complements,
            coupled,
            reset,
            compositions: HashMap::new(),
            flows: LruCache::with_capacity(CACHE_CAPACITY),
            decompositions: LruCache::with_capacity(CACHE_CAPACITY),
        })
    }

    #[must_use]
    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    /// Returns the index of the sub-interval containing `t`.
    ///
    /// A time on a boundary belongs to the older sub-interval.
    #[must_use]
    pub fn get_interval(&self, t: f64) -> usize {
        intervals::locate(&self.intervals, t)
    }

    /// Returns the flow matrix at time `t` relative to sub-interval
    /// `reference`.
    ///
    /// The reference only matters when the integration restarted in every
    /// sub-interval. For the direct flow it must not be older than the
    /// sub-interval containing `t`; for the inverse flow it must not be
    /// younger.
    pub fn get_flow(&mut self, t: f64, reference: usize) -> DMatrix<f64> {
        let target = self.get_interval(t);
        self.flow_in(t, target, reference)
    }

    /// Propagates the likelihood vector `g` from time `te` back to `ts`.
    ///
    /// Requires `ts <= te`. Equal times return `g` unchanged. A rho jump at
    /// `te` or `ts` itself is not applied, only the ones strictly between.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SingularFlow`] if the flow cannot be decomposed or
    /// the result is not finite.
    ///
    /// Types whose likelihood is not coupled to any nonzero entry of `g`
    /// come back as exact zeros rather than round-off.
    pub fn propagate(&mut self, ts: f64, te: f64, g: &DVector<f64>) -> Result<DVector<f64>, Error> {
        debug_assert!(ts <= te, "propagation runs from {te} back to {ts}");
        if ts == te {
            return Ok(g.clone());
        }

        let young = self.get_interval(te);
        let old = self.interval_after(ts);

        let (values, time) = match self.kind {
            FlowKind::Direct => {
                let qr = self.decomposition(te, young, young);
                let x = qr.solve(g).ok_or(Error::SingularFlow { time: te })?;
                (self.flow_in(ts, old, young) * x, te)
            }
            FlowKind::Inverse => {
                let qr = self.decomposition(ts, old, old);
                let rhs = self.flow_in(te, young, old) * g;
                let result = qr.solve(&rhs).ok_or(Error::SingularFlow { time: ts })?;
                (result, ts)
            }
        };

        self.settle(values, g, time)
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

    /// Rejects a non-finite propagated vector and clears the entries that
    /// nothing in `source` can feed.
    fn settle(
        &self,
        mut values: DVector<f64>,
        source: &DVector<f64>,
        time: f64,
    ) -> Result<DVector<f64>, Error> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::SingularFlow { time });
        }

        for (i, value) in values.iter_mut().enumerate() {
            if !source.iter().enumerate().any(|(j, g)| *g != 0.0 && self.coupled[(i, j)]) {
                *value = 0.0;
            }
        }
        Ok(values)
    }

    /// Returns the sub-interval that starts at `t` if `t` is on a boundary,
    /// or the one containing `t` otherwise.
    fn interval_after(&self, t: f64) -> usize {
        let index = self.get_interval(t);
        if self.intervals[index].end == t && index + 1 < self.intervals.len() {
            index + 1
        } else {
            index
        }
    }

    /// Returns the flow at `t`, evaluated in sub-interval `target`.
    fn flow_in(&mut self, t: f64, target: usize, reference: usize) -> DMatrix<f64> {
        let reference = if self.reset { reference } else { CONTINUOUS };
        let key = (t.to_bits(), target, reference);
        if let Some(flow) = self.flows.get(&key) {
            log::trace!("flow cache hit at t = {t}");
            return flow.clone();
        }

        let n = self.type_count;
        let local = DMatrix::from_column_slice(n, n, &self.solutions[target].evaluate(t));
        let flow = if reference == CONTINUOUS {
            local
        } else {
            let composition = self.composition(reference, target);
            match self.kind {
                FlowKind::Direct => local * composition,
                FlowKind::Inverse => composition * local,
            }
        };

        log::trace!("flow cache miss at t = {t} ({} cached)", self.flows.len());
        self.flows.insert(key, flow.clone());
        flow
    }

    fn decomposition(&mut self, t: f64, target: usize, reference: usize) -> QR<f64, Dyn, Dyn> {
        let key = (t.to_bits(), target, reference);
        if let Some(qr) = self.decompositions.get(&key) {
            log::trace!("decomposition cache hit at t = {t}");
            return qr.clone();
        }

        let qr = self.flow_in(t, target, reference).qr();
        self.decompositions.insert(key, qr.clone());
        qr
    }

    /// Returns the product that carries a restarted solution in `target`
    /// over to the frame of `reference`.
    fn composition(&mut self, reference: usize, target: usize) -> DMatrix<f64> {
        if let Some(composition) = self.compositions.get(&(reference, target)) {
            return composition.clone();
        }

        let n = self.type_count;
        let mut composition = DMatrix::identity(n, n);
        match self.kind {
            // Backward from the present: sub-interval `i` was entered at its
            // end and left at its start, crossing into `i - 1`.
            FlowKind::Direct => {
                for i in (target + 1..=reference).rev() {
                    let mut left = DMatrix::from_column_slice(n, n, self.solutions[i].final_state());
                    let older = self.intervals[i - 1].parameterization_interval;
                    if older != self.intervals[i].parameterization_interval {
                        for (mut row, scale) in left.row_iter_mut().zip(&self.rho_complements[older]) {
                            row *= *scale;
                        }
                    }
                    composition = &self.basis_inverse * left * composition;
                }
            }
            // Forward from the origin: sub-interval `i` was left at its end,
            // crossing into `i + 1`.
            FlowKind::Inverse => {
                for i in reference..target {
                    let mut right = DMatrix::from_column_slice(n, n, self.solutions[i].final_state());
                    let older = self.intervals[i].parameterization_interval;
                    if older != self.intervals[i + 1].parameterization_interval {
                        for (mut column, scale) in right.column_iter_mut().zip(&self.rho_complements[older]) {
                            column *= *scale;
                        }
                    }
                    composition = composition * right * &self.basis_inverse;
                }
            }
        }

        self.compositions.insert((reference, target), composition.clone());
        composition
    }
}

/// Returns whether the likelihood of type `i` can depend on that of type
/// `j`, through migration or cross-birth in any interval.
fn coupling<P>(parameterization: &P) -> DMatrix<bool>
where
    P: Parameterization + ?Sized,
{
    let n = parameterization.type_count();
    let mut coupled = DMatrix::from_fn(n, n, |i, j| {
        i == j
            || (0..parameterization.interval_count()).any(|k| {
                parameterization.migration_rates(k)[(i, j)] > 0.0
                    || parameterization.cross_birth_rates(k)[(i, j)] > 0.0
            })
    });

    // Transitive closure.
    for via in 0..n {
        for i in 0..n {
            if coupled[(i, via)] {
                for j in 0..n {
                    if coupled[(via, j)] {
                        coupled[(i, j)] = true;
                    }
                }
            }
        }
    }
    coupled
}
