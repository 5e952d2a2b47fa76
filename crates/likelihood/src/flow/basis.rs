use nalgebra::DMatrix;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Exp1, StandardNormal};

use crate::InitialBasis;

/// Singular values below this are treated as zero when checking the rank.
const RANK_TOLERANCE: f64 = 1e-10;

/// An invertible matrix that seeds the flow, together with its inverse.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Basis {
    pub(crate) matrix: DMatrix<f64>,
    pub(crate) inverse: DMatrix<f64>,
}

impl Basis {
    /// Generates an `n × n` basis.
    ///
    /// Random modes draw i.i.d. entries from a generator seeded with `seed`
    /// and redraw until the matrix has full numerical rank.
    pub(crate) fn generate(mode: InitialBasis, n: usize, seed: u64) -> Self {
        if mode == InitialBasis::Identity {
            return Self {
                matrix: DMatrix::identity(n, n),
                inverse: DMatrix::identity(n, n),
            };
        }

        let mut rng = StdRng::seed_from_u64(seed);
        loop {
            let matrix = DMatrix::from_fn(n, n, |_, _| draw(mode, &mut rng));
            if matrix.rank(RANK_TOLERANCE) < n {
                log::debug!("redrawing rank-deficient initial basis");
                continue;
            }
            if let Some(inverse) = matrix.clone().try_inverse() {
                return Self { matrix, inverse };
            }
        }
    }
}

fn draw(mode: InitialBasis, rng: &mut StdRng) -> f64 {
    match mode {
        InitialBasis::Identity => 0.0,
        InitialBasis::Uniform => rng.random::<f64>(),
        InitialBasis::Gaussian => StandardNormal.sample(rng),
        InitialBasis::Exponential => Exp1.sample(rng),
    }
}
