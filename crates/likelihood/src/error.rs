use bdmmflow_core::{IntervalError, ParameterizationError, TreeError};
use bdmmflow_solvers::ode;
use thiserror::Error;

/// Errors that can occur when validating a likelihood config.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ConfigError {
    #[error("expected {expected} equilibrium frequencies, got {actual}")]
    FrequencyDimension { expected: usize, actual: usize },

    #[error("equilibrium frequencies must be finite and non-negative")]
    NegativeFrequency,

    #[error("equilibrium frequencies must add up to 1, got {0}")]
    FrequencySum(f64),

    #[error("the minimum sub-interval count must be at least 1")]
    SubIntervalCount,

    #[error("the maximum sub-interval size must be finite and positive, got {0}")]
    SubIntervalSize(f64),

    #[error("invalid integration tolerances: {0}")]
    Tolerance(#[from] ode::ConfigError),

    #[error("the final sample offset must be finite and non-negative, got {0}")]
    FinalSampleOffset(f64),

    #[error("the boundary epsilon must be finite and non-negative, got {0}")]
    BoundaryEpsilon(f64),
}

/// Errors that can occur while computing a likelihood.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid parameterization: {0}")]
    Parameterization(#[from] ParameterizationError),

    #[error("invalid tree: {0}")]
    Tree(#[from] TreeError),

    #[error("invalid sub-intervals: {0}")]
    Interval(#[from] IntervalError),

    #[error("integration failed: {0}")]
    Integration(#[from] ode::Error),

    /// A flow matrix could not be decomposed.
    ///
    /// This signals a degenerate region of parameter space rather than a
    /// defect; raising the minimum sub-interval count usually helps.
    #[error("flow matrix is numerically singular at t = {time}")]
    SingularFlow { time: f64 },
}
