use bdmmflow_core::{IntervalOde, Parameterization};
use nalgebra::{DMatrix, DMatrixView};

use crate::FlowKind;
use crate::extinction::ExtinctionProbabilities;

/// The linear, matrix-valued flow ODE.
///
/// The likelihood ODE along an edge is `dg/dt = A(t) g`. The time-invariant
/// part of `A` is built once per parameterization interval; the rest depends
/// on time only through the extinction probabilities.
///
/// The direct flow solves `dY/dt = A(t) Y` and is integrated backward from
/// the present. The inverse flow solves `dY/dt = -Y A(t)` and is integrated
/// forward from the origin. States are `n × n` matrices stored column-major.
#[derive(Debug)]
pub(crate) struct FlowOde<'a, P: ?Sized> {
    parameterization: &'a P,
    extinction: &'a ExtinctionProbabilities,
    kind: FlowKind,
    invariant: Vec<DMatrix<f64>>,
    apply_jumps: bool,
}

impl<'a, P: Parameterization + ?Sized> FlowOde<'a, P> {
    /// Creates the flow system.
    ///
    /// With `apply_jumps`, the boundary hook scales the carried state by
    /// `1 - rho`; otherwise the jumps are left to the caller.
    pub(crate) fn new(
        parameterization: &'a P,
        extinction: &'a ExtinctionProbabilities,
        kind: FlowKind,
        apply_jumps: bool,
    ) -> Self {
        let invariant = (0..parameterization.interval_count())
            .map(|k| invariant_matrix(parameterization, k))
            .collect();

        Self {
            parameterization,
            extinction,
            kind,
            invariant,
            apply_jumps,
        }
    }

    fn type_count(&self) -> usize {
        self.parameterization.type_count()
    }

    /// Returns the system matrix `A(t)` within parameterization interval `k`.
    pub(crate) fn system_matrix(&self, t: f64, k: usize) -> DMatrix<f64> {
        let n = self.type_count();
        let p = self.extinction.at_in_interval(t, k);
        let birth = self.parameterization.birth_rates(k);
        let cross_birth = self.parameterization.cross_birth_rates(k);

        let mut a = self.invariant[k].clone();
        for i in 0..n {
            a[(i, i)] -= 2.0 * birth[i] * p[i];
            for j in (0..n).filter(|&j| j != i) {
                a[(i, i)] -= cross_birth[(i, j)] * p[j];
                a[(i, j)] -= cross_birth[(i, j)] * p[i];
            }
        }
        a
    }
}

/// Builds the part of `A` that is constant within an interval.
fn invariant_matrix<P: Parameterization + ?Sized>(parameterization: &P, k: usize) -> DMatrix<f64> {
    let n = parameterization.type_count();
    let birth = parameterization.birth_rates(k);
    let death = parameterization.death_rates(k);
    let sampling = parameterization.sampling_rates(k);
    let cross_birth = parameterization.cross_birth_rates(k);
    let migration = parameterization.migration_rates(k);

    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            let outflow: f64 = (0..n)
                .filter(|&l| l != i)
                .map(|l| migration[(i, l)] + cross_birth[(i, l)])
                .sum();
            birth[i] + death[i] + sampling[i] + outflow
        } else {
            -migration[(i, j)]
        }
    })
}

impl<P: Parameterization + ?Sized> IntervalOde for FlowOde<'_, P> {
    fn dimension(&self) -> usize {
        self.type_count() * self.type_count()
    }

    fn derivative(&self, t: f64, y: &[f64], interval: usize, dydt: &mut [f64]) {
        let n = self.type_count();
        let a = self.system_matrix(t, interval);
        let y = DMatrixView::from_slice(y, n, n);

        let product = match self.kind {
            FlowKind::Direct => &a * y,
            FlowKind::Inverse => -(y * &a),
        };
        dydt.copy_from_slice(product.as_slice());
    }

    /// Applies the rho jump `D = diag(1 - rho)`.
    ///
    /// The direct flow is scaled from the left (`D Y`), the inverse flow from
    /// the right (`Y D`).
    fn on_interval_boundary(&self, _time: f64, from: usize, to: usize, state: &mut [f64]) {
        if !self.apply_jumps {
            return;
        }

        let n = self.type_count();
        let rho = self.parameterization.rho_values(from.min(to));
        for col in 0..n {
            for row in 0..n {
                let scaled = match self.kind {
                    FlowKind::Direct => row,
                    FlowKind::Inverse => col,
                };
                state[row + n * col] *= 1.0 - rho[scaled];
            }
        }
    }
}
