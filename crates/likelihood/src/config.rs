use bdmmflow_core::intervals::DEFAULT_BOUNDARY_EPSILON;
use bdmmflow_solvers::ode;

use crate::ConfigError;

/// How the tree likelihood is conditioned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Conditioning {
    /// No conditioning.
    None,

    /// Condition on at least one sampled descendant of the origin.
    #[default]
    Survival,

    /// Condition on the root age instead of the time of origin.
    Root,
}

/// How the process time is split into integration sub-intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SubIntervals {
    /// At least `k` sub-intervals of length `T / k`.
    MinCount(usize),

    /// Sub-intervals of at most the given length.
    MaxSize(f64),
}

impl Default for SubIntervals {
    fn default() -> Self {
        Self::MinCount(4)
    }
}

impl SubIntervals {
    /// Returns the maximum sub-interval length for a process of length `T`.
    #[must_use]
    pub fn max_size(&self, process_length: f64) -> f64 {
        match *self {
            #[allow(clippy::cast_precision_loss)]
            Self::MinCount(count) => process_length / count as f64,
            Self::MaxSize(size) => size,
        }
    }
}

/// Which flow representation propagates likelihoods along edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlowKind {
    /// The flow integrated backward from the present.
    ///
    /// Each edge needs a decomposition of the flow at its young end.
    Direct,

    /// The inverse flow integrated forward from the origin.
    ///
    /// Each edge needs a decomposition of the flow at its old end, which
    /// sibling edges share.
    #[default]
    Inverse,
}

/// The matrix that seeds the flow integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InitialBasis {
    /// The identity matrix.
    Identity,

    /// Entries drawn uniformly from `[0, 1)`.
    #[default]
    Uniform,

    /// Entries drawn from the standard normal distribution.
    Gaussian,

    /// Entries drawn from the exponential distribution with rate 1.
    Exponential,
}

/// Whether the flow integration restarts from the initial basis in every
/// sub-interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Reset {
    /// Restart iff there is more than one sub-interval.
    #[default]
    Auto,

    /// Always restart.
    Always,

    /// Never restart.
    Never,
}

impl Reset {
    /// Resolves the mode for a given number of sub-intervals.
    #[must_use]
    pub fn applies(self, sub_interval_count: usize) -> bool {
        match self {
            Self::Auto => sub_interval_count > 1,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

/// Configuration of a likelihood evaluation.
///
/// Deserialized values go through the same checks as the setters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "ConfigRaw"))]
pub struct Config {
    frequencies: Vec<f64>,
    conditioning: Conditioning,
    abs_tol: f64,
    rel_tol: f64,
    sub_intervals: SubIntervals,
    flow: FlowKind,
    initial_basis: InitialBasis,
    seed: u64,
    final_sample_offset: f64,
    boundary_epsilon: f64,
    reset: Reset,
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(rename = "Config")]
struct ConfigRaw {
    frequencies: Vec<f64>,
    #[serde(default)]
    conditioning: Conditioning,
    #[serde(default = "default_abs_tol")]
    abs_tol: f64,
    #[serde(default = "default_rel_tol")]
    rel_tol: f64,
    #[serde(default)]
    sub_intervals: SubIntervals,
    #[serde(default)]
    flow: FlowKind,
    #[serde(default)]
    initial_basis: InitialBasis,
    #[serde(default = "default_seed")]
    seed: u64,
    #[serde(default)]
    final_sample_offset: f64,
    #[serde(default = "default_boundary_epsilon")]
    boundary_epsilon: f64,
    #[serde(default)]
    reset: Reset,
}

#[cfg(feature = "serde")]
fn default_abs_tol() -> f64 {
    DEFAULT_ABS_TOL
}

#[cfg(feature = "serde")]
fn default_rel_tol() -> f64 {
    DEFAULT_REL_TOL
}

#[cfg(feature = "serde")]
fn default_seed() -> u64 {
    DEFAULT_SEED
}

#[cfg(feature = "serde")]
fn default_boundary_epsilon() -> f64 {
    DEFAULT_BOUNDARY_EPSILON
}

#[cfg(feature = "serde")]
impl TryFrom<ConfigRaw> for Config {
    type Error = ConfigError;

    fn try_from(raw: ConfigRaw) -> Result<Self, Self::Error> {
        Ok(Self::new(raw.frequencies)?
            .with_conditioning(raw.conditioning)
            .with_tolerances(raw.abs_tol, raw.rel_tol)?
            .with_sub_intervals(raw.sub_intervals)?
            .with_flow(raw.flow)
            .with_initial_basis(raw.initial_basis)
            .with_seed(raw.seed)
            .with_final_sample_offset(raw.final_sample_offset)?
            .with_boundary_epsilon(raw.boundary_epsilon)?
            .with_reset(raw.reset))
    }
}

/// Default absolute integration tolerance.
pub const DEFAULT_ABS_TOL: f64 = 1e-100;

/// Default relative integration tolerance.
pub const DEFAULT_REL_TOL: f64 = 1e-7;

/// Default seed of the random initial basis.
pub const DEFAULT_SEED: u64 = 3215;

const FREQUENCY_SUM_TOLERANCE: f64 = 1e-10;

impl Config {
    /// Creates a config with the given equilibrium frequencies and defaults
    /// for everything else.
    ///
    /// # Errors
    ///
    /// Returns an error if any frequency is negative or non-finite, or if
    /// the frequencies do not add up to 1.
    pub fn new(frequencies: Vec<f64>) -> Result<Self, ConfigError> {
        if frequencies.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err(ConfigError::NegativeFrequency);
        }
        let sum: f64 = frequencies.iter().sum();
        if (sum - 1.0).abs() > FREQUENCY_SUM_TOLERANCE {
            return Err(ConfigError::FrequencySum(sum));
        }

        Ok(Self {
            frequencies,
            conditioning: Conditioning::default(),
            abs_tol: DEFAULT_ABS_TOL,
            rel_tol: DEFAULT_REL_TOL,
            sub_intervals: SubIntervals::default(),
            flow: FlowKind::default(),
            initial_basis: InitialBasis::default(),
            seed: DEFAULT_SEED,
            final_sample_offset: 0.0,
            boundary_epsilon: DEFAULT_BOUNDARY_EPSILON,
            reset: Reset::default(),
        })
    }

    /// Creates a config with equal frequencies for `type_count` types.
    ///
    /// # Errors
    ///
    /// Returns an error if `type_count` is zero.
    pub fn uniform(type_count: usize) -> Result<Self, ConfigError> {
        if type_count == 0 {
            return Err(ConfigError::FrequencySum(0.0));
        }
        #[allow(clippy::cast_precision_loss)]
        let frequency = 1.0 / type_count as f64;
        Self::new(vec![frequency; type_count])
    }

    #[must_use]
    pub fn with_conditioning(mut self, conditioning: Conditioning) -> Self {
        self.conditioning = conditioning;
        self
    }

    /// Sets the integration tolerances.
    ///
    /// # Errors
    ///
    /// Returns an error if a tolerance is negative or non-finite, or both
    /// are zero.
    pub fn with_tolerances(mut self, abs_tol: f64, rel_tol: f64) -> Result<Self, ConfigError> {
        ode::Config::new(abs_tol, rel_tol, f64::INFINITY, 0.0, ode::DEFAULT_MAX_STEPS)?;
        self.abs_tol = abs_tol;
        self.rel_tol = rel_tol;
        Ok(self)
    }

    /// Sets how the process time is split into sub-intervals.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero count or a non-positive size.
    pub fn with_sub_intervals(mut self, sub_intervals: SubIntervals) -> Result<Self, ConfigError> {
        match sub_intervals {
            SubIntervals::MinCount(0) => return Err(ConfigError::SubIntervalCount),
            SubIntervals::MaxSize(size) if !size.is_finite() || size <= 0.0 => {
                return Err(ConfigError::SubIntervalSize(size));
            }
            _ => {}
        }
        self.sub_intervals = sub_intervals;
        Ok(self)
    }

    #[must_use]
    pub fn with_flow(mut self, flow: FlowKind) -> Self {
        self.flow = flow;
        self
    }

    #[must_use]
    pub fn with_initial_basis(mut self, initial_basis: InitialBasis) -> Self {
        self.initial_basis = initial_basis;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the time between the most recent sample and the present.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is negative or non-finite.
    pub fn with_final_sample_offset(mut self, offset: f64) -> Result<Self, ConfigError> {
        if !offset.is_finite() || offset < 0.0 {
            return Err(ConfigError::FinalSampleOffset(offset));
        }
        self.final_sample_offset = offset;
        Ok(self)
    }

    /// Sets the tolerance used for boundary coincidence tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the epsilon is negative or non-finite.
    pub fn with_boundary_epsilon(mut self, epsilon: f64) -> Result<Self, ConfigError> {
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(ConfigError::BoundaryEpsilon(epsilon));
        }
        self.boundary_epsilon = epsilon;
        Ok(self)
    }

    #[must_use]
    pub fn with_reset(mut self, reset: Reset) -> Self {
        self.reset = reset;
        self
    }

    /// Checks that the frequencies match the number of types.
    ///
    /// # Errors
    ///
    /// Returns an error on a dimension mismatch.
    pub fn check_type_count(&self, type_count: usize) -> Result<(), ConfigError> {
        if self.frequencies.len() != type_count {
            return Err(ConfigError::FrequencyDimension {
                expected: type_count,
                actual: self.frequencies.len(),
            });
        }
        Ok(())
    }

    /// Builds the integrator config for a process of length `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process length is not finite and positive.
    pub fn ode_config(&self, process_length: f64) -> Result<ode::Config, ode::ConfigError> {
        ode::Config::for_process_length(process_length, self.abs_tol, self.rel_tol)
    }

    /// Returns the equilibrium frequencies of the types.
    #[must_use]
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    #[must_use]
    pub fn conditioning(&self) -> Conditioning {
        self.conditioning
    }

    /// Returns the absolute integration tolerance.
    #[must_use]
    pub fn abs_tol(&self) -> f64 {
        self.abs_tol
    }

    /// Returns the relative integration tolerance.
    #[must_use]
    pub fn rel_tol(&self) -> f64 {
        self.rel_tol
    }

    #[must_use]
    pub fn sub_intervals(&self) -> SubIntervals {
        self.sub_intervals
    }

    #[must_use]
    pub fn flow(&self) -> FlowKind {
        self.flow
    }

    #[must_use]
    pub fn initial_basis(&self) -> InitialBasis {
        self.initial_basis
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns the time between the most recent sample and the present.
    #[must_use]
    pub fn final_sample_offset(&self) -> f64 {
        self.final_sample_offset
    }

    /// Returns the tolerance used for boundary coincidence tests.
    #[must_use]
    pub fn boundary_epsilon(&self) -> f64 {
        self.boundary_epsilon
    }

    #[must_use]
    pub fn reset(&self) -> Reset {
        self.reset
    }
}
