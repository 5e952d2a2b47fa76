pub mod ode;

pub use ode::IntervalOde;
