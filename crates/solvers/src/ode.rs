//! Adaptive ODE integration with dense output.
//!
//! # Algorithm
//!
//! [`integrate`] is an explicit Dormand-Prince 5(4) method with an embedded
//! error estimate and Hairer's step-size control. Every accepted step keeps
//! the coefficients of a fourth-order continuous extension, so a
//! [`DenseSolution`] can be evaluated at any time in its span.
//!
//! # Interval-aware integration
//!
//! [`integrate_forward`] and [`integrate_backward`] drive an
//! [`IntervalOde`](bdmmflow_core::IntervalOde) across a list of
//! sub-intervals, applying the system's boundary hook once per
//! parameterization-interval crossing and optionally restarting from the
//! initial state in every sub-interval. Restarting trades continuity for
//! conditioning: long integrations of a nearly singular linear system lose
//! accuracy quickly.
//!
//! # Example
//!
//! ```
//! use bdmmflow_solvers::ode::{self, Config};
//!
//! let solution = ode::integrate(|_t, y, dydt| dydt[0] = -y[0], 0.0, 1.0, &[1.0], &Config::default())
//!     .expect("should integrate");
//!
//! assert!((solution.evaluate(0.5)[0] - (-0.5_f64).exp()).abs() < 1e-6);
//! ```

mod config;
mod dopri5;
mod error;
mod intervals;
mod solution;

pub use config::{Config, ConfigError, DEFAULT_MAX_STEPS};
pub use dopri5::integrate;
pub use error::Error;
pub use intervals::{integrate_backward, integrate_forward};
pub use solution::{DenseSolution, Stats};
