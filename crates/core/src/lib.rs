//! Core traits and types for multi-type birth-death-migration likelihoods.
//!
//! This crate defines the shared contracts that the solvers and the
//! likelihood engine build on:
//!
//! - [`Parameterization`]: piecewise-constant process rates, with
//!   [`SkylineParameterization`] as a validated concrete implementation
//! - [`PhyloTree`]: read access to a rooted, time-measured tree, with the
//!   arena-backed [`Tree`] built through [`TreeBuilder`]
//! - [`Interval`] and the [`intervals`] builder that splits the process time
//!   into integration sub-intervals
//! - [`IntervalOde`]: an ODE system with piecewise-constant coefficients and
//!   discrete jumps at parameterization boundaries

pub mod intervals;
mod parameterization;
mod problems;
mod tree;

pub use intervals::{Interval, IntervalError};
pub use parameterization::{
    IntervalRates, Parameterization, ParameterizationError, SkylineParameterization,
};
pub use problems::IntervalOde;
pub use tree::{NodeId, PhyloTree, Tree, TreeBuilder, TreeError, sample_type, validate_types};
