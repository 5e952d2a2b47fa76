//! Numerical solvers for piecewise-defined ODE systems.
//!
//! The [`ode`] module integrates systems with an adaptive Dormand-Prince 5(4)
//! method and keeps a continuous interpolant of every solution, so the state
//! can later be queried at any time inside the integrated span.

pub mod ode;
