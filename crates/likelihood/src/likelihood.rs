use bdmmflow_core::{Interval, Parameterization, PhyloTree, TreeError, intervals, validate_types};
use bdmmflow_solvers::ode;

use crate::extinction::ExtinctionProbabilities;
use crate::flow::Flow;
use crate::traversal::{EdgePropagator, Traversal};
use crate::{Config, Error, root};

/// A likelihood evaluator with a validated configuration.
///
/// Each call to [`log_likelihood`](Self::log_likelihood) integrates from
/// scratch and builds fresh caches, so one evaluator can be reused across
/// parameter values.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowLikelihood {
    config: Config,
}

impl FlowLikelihood {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Computes the log-likelihood of `tree` under `parameterization`.
    ///
    /// # Errors
    ///
    /// See [`compute_log_likelihood`].
    pub fn log_likelihood<T, P>(&self, tree: &T, parameterization: &P) -> Result<f64, Error>
    where
        T: PhyloTree + ?Sized,
        P: Parameterization + ?Sized,
    {
        compute_log_likelihood(tree, parameterization, &self.config)
    }
}

/// Computes the log-likelihood of `tree` under `parameterization` using the
/// flow.
///
/// A numerically singular flow yields `Ok(f64::NEG_INFINITY)`, since it marks
/// a degenerate region of parameter space.
///
/// # Errors
///
/// Returns an error if the config does not match the parameterization, the
/// tree is invalid or older than the process, or an integration fails.
pub fn compute_log_likelihood<T, P>(tree: &T, parameterization: &P, config: &Config) -> Result<f64, Error>
where
    T: PhyloTree + ?Sized,
    P: Parameterization + ?Sized,
{
    let Prepared {
        intervals,
        ode_config,
        extinction,
    } = prepare(tree, parameterization, config)?;

    let mut flow = Flow::compute(parameterization, &extinction, &intervals, config, &ode_config)?;
    let stats = flow.stats();
    log::debug!(
        "flow: {} accepted, {} rejected, {} evaluations",
        stats.accepted,
        stats.rejected,
        stats.evaluations
    );

    zero_if_singular(assemble(tree, parameterization, config, &extinction, &mut flow))
}

/// Reports a singular flow as a likelihood of zero.
fn zero_if_singular(result: Result<f64, Error>) -> Result<f64, Error> {
    match result {
        Err(Error::SingularFlow { time }) => {
            log::warn!(
                "flow matrix is singular at t = {time}; reporting a likelihood of zero. \
                 Raising the minimum sub-interval count may help."
            );
            Ok(f64::NEG_INFINITY)
        }
        result => result,
    }
}

/// Everything an evaluation needs before edges are propagated.
pub(crate) struct Prepared {
    pub(crate) intervals: Vec<Interval>,
    pub(crate) ode_config: ode::Config,
    pub(crate) extinction: ExtinctionProbabilities,
}

/// Validates the inputs, splits the process time and integrates the
/// extinction probabilities.
pub(crate) fn prepare<T, P>(tree: &T, parameterization: &P, config: &Config) -> Result<Prepared, Error>
where
    T: PhyloTree + ?Sized,
    P: Parameterization + ?Sized,
{
    let type_count = parameterization.type_count();
    config.check_type_count(type_count)?;
    validate_types(tree, type_count)?;

    let process_length = parameterization.total_process_length();
    let root = tree.root();
    let root_height = tree.height(root);
    if process_length - (root_height + config.final_sample_offset()) < -config.boundary_epsilon() {
        return Err(TreeError::BeyondOrigin {
            node: root.index(),
            height: root_height,
        }
        .into());
    }

    let max_size = config.sub_intervals().max_size(process_length);
    let intervals = intervals::for_parameterization(parameterization, max_size, config.boundary_epsilon())?;
    let ode_config = config.ode_config(process_length).map_err(crate::ConfigError::from)?;

    let extinction = ExtinctionProbabilities::compute(parameterization, &intervals, &ode_config)?;
    let stats = extinction.stats();
    log::debug!(
        "extinction over {} sub-intervals: {} accepted, {} rejected, {} evaluations",
        intervals.len(),
        stats.accepted,
        stats.rejected,
        stats.evaluations
    );

    Ok(Prepared {
        intervals,
        ode_config,
        extinction,
    })
}

/// Evaluates the tree with `propagator` and combines the root.
pub(crate) fn assemble<T, P, E>(
    tree: &T,
    parameterization: &P,
    config: &Config,
    extinction: &ExtinctionProbabilities,
    propagator: &mut E,
) -> Result<f64, Error>
where
    T: PhyloTree + ?Sized,
    P: Parameterization + ?Sized,
    E: EdgePropagator + ?Sized,
{
    let traversal = Traversal::new(tree, parameterization, extinction, config);
    let root_likelihood = traversal.root_likelihood(propagator)?;

    let density = root::conditioning_density(
        parameterization,
        extinction,
        config.frequencies(),
        config.conditioning(),
    );

    Ok(root::log_likelihood(
        &root_likelihood,
        config.frequencies(),
        density,
        tree.leaf_count(),
        tree.direct_ancestor_count(),
    ))
}
