use thiserror::Error;

/// Default cap on the number of attempted steps per integration.
pub const DEFAULT_MAX_STEPS: usize = 1_000_000;

/// Configuration for adaptive integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    abs_tol: f64,
    rel_tol: f64,
    max_step: f64,
    min_step: f64,
    max_steps: usize,
}

/// Errors that can occur when validating an integrator config.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("abs_tol must be finite and non-negative")]
    AbsTol,

    #[error("rel_tol must be finite and non-negative")]
    RelTol,

    #[error("abs_tol and rel_tol cannot both be zero")]
    ZeroTolerance,

    #[error("max_step must be positive")]
    MaxStep,

    #[error("min_step must be finite, non-negative and no larger than max_step")]
    MinStep,

    #[error("max_steps must be positive")]
    MaxSteps,
}

impl Default for Config {
    fn default() -> Self {
        // Known-good values, unwrap is safe
        Self::new(1e-10, 1e-7, f64::INFINITY, 0.0, DEFAULT_MAX_STEPS).unwrap()
    }
}

impl Config {
    /// Creates a new config with validated tolerances and step bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if a tolerance is negative or non-finite, both
    /// tolerances are zero, or the step bounds are inconsistent.
    pub fn new(
        abs_tol: f64,
        rel_tol: f64,
        max_step: f64,
        min_step: f64,
        max_steps: usize,
    ) -> Result<Self, ConfigError> {
        if !abs_tol.is_finite() || abs_tol < 0.0 {
            return Err(ConfigError::AbsTol);
        }
        if !rel_tol.is_finite() || rel_tol < 0.0 {
            return Err(ConfigError::RelTol);
        }
        if abs_tol == 0.0 && rel_tol == 0.0 {
            return Err(ConfigError::ZeroTolerance);
        }
        if max_step.is_nan() || max_step <= 0.0 {
            return Err(ConfigError::MaxStep);
        }
        if !min_step.is_finite() || min_step < 0.0 || min_step > max_step {
            return Err(ConfigError::MinStep);
        }
        if max_steps == 0 {
            return Err(ConfigError::MaxSteps);
        }

        Ok(Self {
            abs_tol,
            rel_tol,
            max_step,
            min_step,
            max_steps,
        })
    }

    /// Creates a config scaled to a process of length `process_length`.
    ///
    /// The maximum step is a twentieth of the process length and the minimum
    /// step is vanishingly small, so stiff stretches are never rejected for
    /// step size alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the tolerances are invalid or the process length
    /// is not finite and positive.
    pub fn for_process_length(
        process_length: f64,
        abs_tol: f64,
        rel_tol: f64,
    ) -> Result<Self, ConfigError> {
        if !process_length.is_finite() || process_length <= 0.0 {
            return Err(ConfigError::MaxStep);
        }

        Self::new(
            abs_tol,
            rel_tol,
            process_length / 20.0,
            process_length * 1e-100,
            DEFAULT_MAX_STEPS,
        )
    }

    /// Returns a copy of this config with a different step cap.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_steps` is zero.
    pub fn with_max_steps(self, max_steps: usize) -> Result<Self, ConfigError> {
        Self::new(
            self.abs_tol,
            self.rel_tol,
            self.max_step,
            self.min_step,
            max_steps,
        )
    }

    /// Returns the absolute error tolerance.
    #[must_use]
    pub fn abs_tol(&self) -> f64 {
        self.abs_tol
    }

    /// Returns the relative error tolerance.
    #[must_use]
    pub fn rel_tol(&self) -> f64 {
        self.rel_tol
    }

    /// Returns the largest allowed step magnitude.
    #[must_use]
    pub fn max_step(&self) -> f64 {
        self.max_step
    }

    /// Returns the smallest allowed step magnitude.
    #[must_use]
    pub fn min_step(&self) -> f64 {
        self.min_step
    }

    /// Returns the maximum number of attempted steps.
    #[must_use]
    pub fn max_steps(&self) -> usize {
        self.max_steps
    }
}
