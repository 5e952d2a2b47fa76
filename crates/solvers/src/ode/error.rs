use thiserror::Error;

use super::ConfigError;

/// Errors that can occur during integration.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum Error {
    #[error("step size {step:e} fell below the minimum at t = {time}")]
    StepSizeUnderflow { time: f64, step: f64 },

    #[error("exceeded {steps} steps at t = {time}")]
    TooManySteps { time: f64, steps: usize },

    #[error("state became non-finite at t = {time}")]
    NonFiniteState { time: f64 },

    #[error("state has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),
}
