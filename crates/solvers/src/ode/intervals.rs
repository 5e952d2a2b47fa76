use bdmmflow_core::{Interval, IntervalOde};

use super::{Config, DenseSolution, Error, integrate};

/// Direction in which sub-intervals are traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Integrates `system` forward in time across `intervals`.
///
/// Starting from `initial` at the start of the first sub-interval, each
/// sub-interval is integrated in turn. When consecutive sub-intervals belong
/// to different parameterization intervals, the system's boundary hook is
/// applied once to the carried state. With `reset`, the carried state is then
/// discarded and every sub-interval starts again from `initial`.
///
/// Returns one dense solution per sub-interval, in chronological order.
///
/// # Errors
///
/// Returns an error if `initial` has the wrong dimension or integration of
/// any sub-interval fails.
pub fn integrate_forward<S>(
    system: &S,
    initial: &[f64],
    intervals: &[Interval],
    reset: bool,
    config: &Config,
) -> Result<Vec<DenseSolution>, Error>
where
    S: IntervalOde + ?Sized,
{
    integrate_intervals(system, initial, intervals, reset, config, Direction::Forward)
}

/// Integrates `system` backward in time across `intervals`.
///
/// Starting from `initial` at the end of the last sub-interval, sub-intervals
/// are integrated from the present toward the origin. Boundary and reset
/// handling match [`integrate_forward`].
///
/// Returns one dense solution per sub-interval, in chronological order.
///
/// # Errors
///
/// Returns an error if `initial` has the wrong dimension or integration of
/// any sub-interval fails.
pub fn integrate_backward<S>(
    system: &S,
    initial: &[f64],
    intervals: &[Interval],
    reset: bool,
    config: &Config,
) -> Result<Vec<DenseSolution>, Error>
where
    S: IntervalOde + ?Sized,
{
    integrate_intervals(system, initial, intervals, reset, config, Direction::Backward)
}

fn integrate_intervals<S>(
    system: &S,
    initial: &[f64],
    intervals: &[Interval],
    reset: bool,
    config: &Config,
    direction: Direction,
) -> Result<Vec<DenseSolution>, Error>
where
    S: IntervalOde + ?Sized,
{
    if initial.len() != system.dimension() {
        return Err(Error::DimensionMismatch {
            expected: system.dimension(),
            actual: initial.len(),
        });
    }

    let order: Vec<&Interval> = match direction {
        Direction::Forward => intervals.iter().collect(),
        Direction::Backward => intervals.iter().rev().collect(),
    };

    let mut solutions = Vec::with_capacity(intervals.len());
    let mut state = initial.to_vec();
    let mut previous: Option<&Interval> = None;

    for interval in order {
        if let Some(previous) = previous {
            let from = previous.parameterization_interval;
            let to = interval.parameterization_interval;
            if from != to {
                let time = match direction {
                    Direction::Forward => interval.start,
                    Direction::Backward => interval.end,
                };
                system.on_interval_boundary(time, from, to, &mut state);
            }
            if reset {
                state.copy_from_slice(initial);
            }
        }

        let (t0, t1) = match direction {
            Direction::Forward => (interval.start, interval.end),
            Direction::Backward => (interval.end, interval.start),
        };
        let k = interval.parameterization_interval;
        let solution = integrate(
            |t, y, dydt| system.derivative(t, y, k, dydt),
            t0,
            t1,
            &state,
            config,
        )?;

        log::trace!(
            "sub-interval {} [{}, {}]: {} steps, {} rejected",
            interval.index,
            interval.start,
            interval.end,
            solution.stats().accepted,
            solution.stats().rejected,
        );

        state.copy_from_slice(solution.final_state());
        solutions.push(solution);
        previous = Some(interval);
    }

    if direction == Direction::Backward {
        solutions.reverse();
    }

    Ok(solutions)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;

    use approx::assert_relative_eq;
    use bdmmflow_core::intervals::{self, DEFAULT_BOUNDARY_EPSILON};

    /// Decay with a per-interval rate that halves the state at each boundary.
    struct HalvingDecay {
        rates: Vec<f64>,
        crossings: RefCell<Vec<(f64, usize, usize)>>,
    }

    impl HalvingDecay {
        fn new(rates: Vec<f64>) -> Self {
            Self {
                rates,
                crossings: RefCell::new(Vec::new()),
            }
        }
    }

    impl IntervalOde for HalvingDecay {
        fn dimension(&self) -> usize {
            1
        }

        fn derivative(&self, _t: f64, y: &[f64], interval: usize, dydt: &mut [f64]) {
            dydt[0] = -self.rates[interval] * y[0];
        }

        fn on_interval_boundary(&self, time: f64, from: usize, to: usize, state: &mut [f64]) {
            self.crossings.borrow_mut().push((time, from, to));
            state[0] *= 0.5;
        }
    }

    fn config() -> Config {
        Config::new(1e-12, 1e-10, 0.25, 0.0, 100_000).unwrap()
    }

    #[test]
    fn forward_applies_hook_once_per_crossing() {
        let system = HalvingDecay::new(vec![1.0, 2.0]);
        let intervals = intervals::build(&[1.0, 2.0], 0.5, DEFAULT_BOUNDARY_EPSILON).unwrap();

        let solutions = integrate_forward(&system, &[1.0], &intervals, false, &config()).unwrap();

        assert_eq!(solutions.len(), 4);
        assert_eq!(*system.crossings.borrow(), vec![(1.0, 0, 1)]);

        let expected = (-1.0_f64).exp() * 0.5 * (-2.0_f64).exp();
        assert_relative_eq!(solutions[3].final_state()[0], expected, max_relative = 1e-8);
        assert_relative_eq!(solutions[1].evaluate(0.75)[0], (-0.75_f64).exp(), max_relative = 1e-8);
    }

    #[test]
    fn backward_returns_chronological_solutions() {
        let system = HalvingDecay::new(vec![1.0, 2.0]);
        let intervals = intervals::build(&[1.0, 2.0], 0.5, DEFAULT_BOUNDARY_EPSILON).unwrap();

        let solutions = integrate_backward(&system, &[1.0], &intervals, false, &config()).unwrap();

        assert_eq!(*system.crossings.borrow(), vec![(1.0, 1, 0)]);
        for (solution, interval) in solutions.iter().zip(&intervals) {
            assert_eq!(solution.initial_time(), interval.end);
            assert_eq!(solution.final_time(), interval.start);
        }

        // Backward in time the decay becomes growth.
        let expected = 2.0_f64.exp() * 0.5 * 1.0_f64.exp();
        assert_relative_eq!(solutions[0].final_state()[0], expected, max_relative = 1e-8);
    }

    #[test]
    fn reset_restarts_every_sub_interval() {
        let system = HalvingDecay::new(vec![1.0, 2.0]);
        let intervals = intervals::build(&[1.0, 2.0], 0.5, DEFAULT_BOUNDARY_EPSILON).unwrap();

        let solutions = integrate_forward(&system, &[1.0], &intervals, true, &config()).unwrap();

        assert_eq!(system.crossings.borrow().len(), 1);
        for (solution, interval) in solutions.iter().zip(&intervals) {
            assert_eq!(solution.initial_state(), &[1.0]);
            let rate = system.rates[interval.parameterization_interval];
            assert_relative_eq!(
                solution.final_state()[0],
                (-rate * interval.length()).exp(),
                max_relative = 1e-8
            );
        }
    }

    #[test]
    fn rejects_wrong_dimension() {
        let system = HalvingDecay::new(vec![1.0]);
        let intervals = intervals::build(&[1.0], 1.0, DEFAULT_BOUNDARY_EPSILON).unwrap();

        let result = integrate_forward(&system, &[1.0, 2.0], &intervals, false, &config());

        assert_eq!(
            result.unwrap_err(),
            Error::DimensionMismatch {
                expected: 1,
                actual: 2
            }
        );
    }
}
