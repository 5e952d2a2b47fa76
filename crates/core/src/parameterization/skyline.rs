use nalgebra::DMatrix;
use thiserror::Error;

use super::Parameterization;

/// Rates of a single parameterization interval.
///
/// Vectors are indexed by type; matrices by `(from, to)` type. Matrix
/// diagonals are meaningless and are zeroed when the parameterization is
/// built.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntervalRates {
    pub birth: Vec<f64>,
    pub death: Vec<f64>,
    pub sampling: Vec<f64>,
    pub removal: Vec<f64>,
    pub rho: Vec<f64>,
    pub cross_birth: DMatrix<f64>,
    pub migration: DMatrix<f64>,
}

impl IntervalRates {
    /// Creates rates for `type_count` types with every rate set to zero.
    #[must_use]
    pub fn zeros(type_count: usize) -> Self {
        Self {
            birth: vec![0.0; type_count],
            death: vec![0.0; type_count],
            sampling: vec![0.0; type_count],
            removal: vec![0.0; type_count],
            rho: vec![0.0; type_count],
            cross_birth: DMatrix::zeros(type_count, type_count),
            migration: DMatrix::zeros(type_count, type_count),
        }
    }

    #[must_use]
    pub fn with_birth(mut self, birth: Vec<f64>) -> Self {
        self.birth = birth;
        self
    }

    #[must_use]
    pub fn with_death(mut self, death: Vec<f64>) -> Self {
        self.death = death;
        self
    }

    #[must_use]
    pub fn with_sampling(mut self, sampling: Vec<f64>) -> Self {
        self.sampling = sampling;
        self
    }

    #[must_use]
    pub fn with_removal(mut self, removal: Vec<f64>) -> Self {
        self.removal = removal;
        self
    }

    #[must_use]
    pub fn with_rho(mut self, rho: Vec<f64>) -> Self {
        self.rho = rho;
        self
    }

    #[must_use]
    pub fn with_cross_birth(mut self, cross_birth: DMatrix<f64>) -> Self {
        self.cross_birth = cross_birth;
        self
    }

    #[must_use]
    pub fn with_migration(mut self, migration: DMatrix<f64>) -> Self {
        self.migration = migration;
        self
    }
}

/// Errors that can occur when building a [`SkylineParameterization`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParameterizationError {
    #[error("process length must be finite and positive, got {0}")]
    ProcessLength(f64),

    #[error("at least one type is required")]
    NoTypes,

    #[error("change times must be ascending and lie strictly inside (0, {process_length})")]
    ChangeTimes { process_length: f64 },

    #[error("expected {expected} rate intervals for the given change times, got {actual}")]
    IntervalCount { expected: usize, actual: usize },

    #[error("{name} in interval {interval} has dimension {actual}, expected {expected}")]
    Dimension {
        name: &'static str,
        interval: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{name} in interval {interval} must be finite and non-negative")]
    NegativeRate { name: &'static str, interval: usize },

    #[error("{name} in interval {interval} must lie in [0, 1]")]
    Probability { name: &'static str, interval: usize },
}

/// A parameterization with rates that are constant between change times.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkylineParameterization {
    type_count: usize,
    end_times: Vec<f64>,
    rates: Vec<IntervalRates>,
}

impl SkylineParameterization {
    /// Creates a parameterization with a single interval spanning the whole
    /// process.
    ///
    /// # Errors
    ///
    /// Returns an error if any rate is invalid. See [`Self::new`].
    pub fn constant(process_length: f64, rates: IntervalRates) -> Result<Self, ParameterizationError> {
        Self::new(process_length, &[], vec![rates])
    }

    /// Creates a parameterization from change times and per-interval rates.
    ///
    /// `change_times` are the interior interval boundaries, so `rates` must
    /// hold `change_times.len() + 1` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the process length or change times are invalid,
    /// if the number of rate intervals does not match, or if any rate has
    /// the wrong dimension, is negative, or is a probability outside `[0, 1]`.
    pub fn new(
        process_length: f64,
        change_times: &[f64],
        mut rates: Vec<IntervalRates>,
    ) -> Result<Self, ParameterizationError> {
        if !process_length.is_finite() || process_length <= 0.0 {
            return Err(ParameterizationError::ProcessLength(process_length));
        }

        let ascending = change_times
            .iter()
            .try_fold(0.0_f64, |prev, &t| (t.is_finite() && t > prev).then_some(t))
            .is_some_and(|last| last < process_length);
        if !ascending {
            return Err(ParameterizationError::ChangeTimes { process_length });
        }

        if rates.len() != change_times.len() + 1 {
            return Err(ParameterizationError::IntervalCount {
                expected: change_times.len() + 1,
                actual: rates.len(),
            });
        }

        let type_count = rates[0].birth.len();
        if type_count == 0 {
            return Err(ParameterizationError::NoTypes);
        }

        for (interval, r) in rates.iter_mut().enumerate() {
            validate_interval(interval, type_count, r)?;
            r.cross_birth.fill_diagonal(0.0);
            r.migration.fill_diagonal(0.0);
        }

        let mut end_times = change_times.to_vec();
        end_times.push(process_length);

        Ok(Self {
            type_count,
            end_times,
            rates,
        })
    }

    /// Returns the rates of an interval.
    #[must_use]
    pub fn rates(&self, interval: usize) -> &IntervalRates {
        &self.rates[interval]
    }
}

fn validate_interval(
    interval: usize,
    type_count: usize,
    rates: &IntervalRates,
) -> Result<(), ParameterizationError> {
    let vectors: [(&'static str, &[f64], bool); 5] = [
        ("birth rates", rates.birth.as_slice(), false),
        ("death rates", rates.death.as_slice(), false),
        ("sampling rates", rates.sampling.as_slice(), false),
        ("removal probabilities", rates.removal.as_slice(), true),
        ("rho values", rates.rho.as_slice(), true),
    ];

    for (name, values, is_probability) in vectors {
        if values.len() != type_count {
            return Err(ParameterizationError::Dimension {
                name,
                interval,
                expected: type_count,
                actual: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ParameterizationError::NegativeRate { name, interval });
        }
        if is_probability && values.iter().any(|v| *v > 1.0) {
            return Err(ParameterizationError::Probability { name, interval });
        }
    }

    for (name, matrix) in [
        ("cross-birth rates", &rates.cross_birth),
        ("migration rates", &rates.migration),
    ] {
        if matrix.nrows() != type_count || matrix.ncols() != type_count {
            return Err(ParameterizationError::Dimension {
                name,
                interval,
                expected: type_count,
                actual: matrix.nrows().max(matrix.ncols()),
            });
        }
        if matrix.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ParameterizationError::NegativeRate { name, interval });
        }
    }

    Ok(())
}

impl Parameterization for SkylineParameterization {
    fn type_count(&self) -> usize {
        self.type_count
    }

    fn total_process_length(&self) -> f64 {
        *self.end_times.last().unwrap_or(&0.0)
    }

    fn interval_end_times(&self) -> &[f64] {
        &self.end_times
    }

    fn birth_rates(&self, interval: usize) -> &[f64] {
        &self.rates[interval].birth
    }

    fn death_rates(&self, interval: usize) -> &[f64] {
        &self.rates[interval].death
    }

    fn sampling_rates(&self, interval: usize) -> &[f64] {
        &self.rates[interval].sampling
    }

    fn removal_probs(&self, interval: usize) -> &[f64] {
        &self.rates[interval].removal
    }

    fn rho_values(&self, interval: usize) -> &[f64] {
        &self.rates[interval].rho
    }

    fn cross_birth_rates(&self, interval: usize) -> &DMatrix<f64> {
        &self.rates[interval].cross_birth
    }

    fn migration_rates(&self, interval: usize) -> &DMatrix<f64> {
        &self.rates[interval].migration
    }
}
