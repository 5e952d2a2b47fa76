//! Flow-based likelihood of multi-type birth-death-migration trees.
//!
//! Computing the likelihood of a typed phylogeny naively needs one nonlinear
//! ODE solve per edge. This crate instead solves two global systems per
//! evaluation:
//!
//! 1. The extinction probabilities `p(t)`, integrated backward once from the
//!    present ([`ExtinctionProbabilities`]).
//! 2. The flow of the linear likelihood ODE, whose coefficients depend on
//!    `p(t)` ([`Flow`]).
//!
//! Every edge is then propagated by a cached linear solve, and the tree is
//! evaluated in postorder with rescaling against underflow.
//!
//! # Example
//!
//! ```
//! use bdmmflow::{Config, compute_log_likelihood};
//! use bdmmflow_core::{IntervalRates, SkylineParameterization, TreeBuilder};
//!
//! let rates = IntervalRates::zeros(1)
//!     .with_birth(vec![2.0])
//!     .with_death(vec![0.5])
//!     .with_sampling(vec![0.5]);
//! let parameterization = SkylineParameterization::constant(3.0, rates).unwrap();
//!
//! let mut builder = TreeBuilder::new();
//! let a = builder.leaf(0.0, None).unwrap();
//! let b = builder.leaf(0.4, None).unwrap();
//! let root = builder.internal(1.5, a, b).unwrap();
//! let tree = builder.build(root).unwrap();
//!
//! let config = Config::uniform(1).unwrap();
//! let log_likelihood = compute_log_likelihood(&tree, &parameterization, &config).unwrap();
//! assert!(log_likelihood.is_finite());
//! ```

mod config;
mod error;
mod extinction;
mod flow;
mod likelihood;
pub mod reference;
mod root;
mod traversal;

pub use config::{
    Conditioning, Config, DEFAULT_ABS_TOL, DEFAULT_REL_TOL, DEFAULT_SEED, FlowKind, InitialBasis,
    Reset, SubIntervals,
};
pub use error::{ConfigError, Error};
pub use extinction::{ExtinctionOde, ExtinctionProbabilities};
pub use flow::Flow;
pub use likelihood::{FlowLikelihood, compute_log_likelihood};
pub use traversal::{EdgePropagator, Scaled};
