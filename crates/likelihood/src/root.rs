//! Combination of the root partial likelihood into the tree log-likelihood.

use std::f64::consts::LN_2;

use bdmmflow_core::Parameterization;
use statrs::function::gamma::ln_gamma;

use crate::Conditioning;
use crate::extinction::ExtinctionProbabilities;
use crate::traversal::Scaled;

/// Returns the density the likelihood is conditioned on.
pub(crate) fn conditioning_density<P>(
    parameterization: &P,
    extinction: &ExtinctionProbabilities,
    frequencies: &[f64],
    conditioning: Conditioning,
) -> f64
where
    P: Parameterization + ?Sized,
{
    let survival: Vec<f64> = extinction.at(0.0).iter().map(|p| 1.0 - p).collect();

    match conditioning {
        Conditioning::None => 1.0,
        Conditioning::Survival => frequencies
            .iter()
            .zip(&survival)
            .map(|(f, s)| f * s)
            .sum(),
        Conditioning::Root => {
            let k = parameterization.interval_index(0.0);
            let birth = parameterization.birth_rates(k);
            let cross_birth = parameterization.cross_birth_rates(k);

            let mut density = 0.0;
            for (i, (f, si)) in frequencies.iter().zip(&survival).enumerate() {
                for (j, sj) in survival.iter().enumerate() {
                    let rate = if i == j { birth[i] } else { cross_birth[(i, j)] };
                    density += rate * f * si * sj;
                }
            }
            density
        }
    }
}

/// Assembles the tree log-likelihood from the root partial likelihood at the
/// origin.
///
/// The `ln 2` per bifurcation and `ln n!` terms convert between labelled
/// oriented trees and the ranked trees the ODEs describe.
pub(crate) fn log_likelihood(
    root: &Scaled,
    frequencies: &[f64],
    conditioning_density: f64,
    leaf_count: usize,
    direct_ancestor_count: usize,
) -> f64 {
    if !(conditioning_density > 0.0 && conditioning_density.is_finite()) {
        log::warn!("conditioning density {conditioning_density} is not positive");
        return f64::NEG_INFINITY;
    }

    let weighted: f64 = root
        .values
        .iter()
        .zip(frequencies)
        .map(|(l, f)| l * f)
        .sum();

    let bifurcations = leaf_count.saturating_sub(direct_ancestor_count + 1);
    #[allow(clippy::cast_precision_loss)]
    let combinatorial = LN_2 * bifurcations as f64 - ln_gamma(leaf_count as f64 + 1.0);

    (weighted / conditioning_density).ln() + root.log_scale + combinatorial
}
