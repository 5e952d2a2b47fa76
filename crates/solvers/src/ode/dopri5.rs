//! Dormand-Prince 5(4) with Hairer's step-size control and dense output.

use super::solution::COEFFICIENTS;
use super::{Config, DenseSolution, Error, Stats};

const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
const A71: f64 = 35.0 / 384.0;
const A73: f64 = 500.0 / 1113.0;
const A74: f64 = 125.0 / 192.0;
const A75: f64 = -2187.0 / 6784.0;
const A76: f64 = 11.0 / 84.0;

const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339_200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const D1: f64 = -12_715_105_075.0 / 11_282_082_432.0;
const D3: f64 = 87_487_479_700.0 / 32_700_410_799.0;
const D4: f64 = -10_690_763_975.0 / 1_880_347_072.0;
const D5: f64 = 701_980_252_875.0 / 199_316_789_632.0;
const D6: f64 = -1_453_857_185.0 / 822_651_844.0;
const D7: f64 = 69_997_945.0 / 29_380_423.0;

const SAFETY: f64 = 0.9;
const FAC_MIN: f64 = 0.2;
const FAC_MAX: f64 = 10.0;
const ORDER: f64 = 5.0;

/// Integrates `dy/dt = f(t, y)` from `t0` to `t1` and keeps a dense output.
///
/// `t1` may lie before `t0`, in which case integration runs backward in
/// time. The derivative closure writes into its third argument.
///
/// # Errors
///
/// Returns an error if the step size underflows, the step cap is reached, or
/// the state becomes non-finite.
pub fn integrate<F>(
    mut f: F,
    t0: f64,
    t1: f64,
    y0: &[f64],
    config: &Config,
) -> Result<DenseSolution, Error>
where
    F: FnMut(f64, &[f64], &mut [f64]),
{
    if !t0.is_finite() || !t1.is_finite() || y0.iter().any(|v| !v.is_finite()) {
        return Err(Error::NonFiniteState { time: t0 });
    }

    let mut solution = DenseSolution::new(t0, t1, y0.to_vec());
    if t0 == t1 {
        return Ok(solution);
    }

    let n = y0.len();
    let direction = (t1 - t0).signum();
    let mut stats = Stats::default();

    let mut t = t0;
    let mut y = y0.to_vec();
    let mut y_new = vec![0.0; n];
    let mut y_stage = vec![0.0; n];
    let mut k = [
        vec![0.0; n],
        vec![0.0; n],
        vec![0.0; n],
        vec![0.0; n],
        vec![0.0; n],
        vec![0.0; n],
        vec![0.0; n],
    ];
    let mut coefficients = vec![0.0; COEFFICIENTS * n];

    f(t, &y, &mut k[0]);
    stats.evaluations += 1;

    // Components starting at zero get an error scale of `abs_tol`, which can
    // make the suggested first step too small to move `t`.
    let resolution = 16.0 * f64::EPSILON * t0.abs().max(t1.abs());
    let mut h = direction * initial_step(&mut f, t, &y, &k[0], direction, config, &mut stats).max(resolution);
    let mut rejected_last = false;

    loop {
        if stats.accepted + stats.rejected >= config.max_steps() {
            return Err(Error::TooManySteps {
                time: t,
                steps: config.max_steps(),
            });
        }
        if h.abs() < config.min_step() || t + h == t {
            return Err(Error::StepSizeUnderflow { time: t, step: h });
        }

        let last = direction * (t + h - t1) >= 0.0;
        if last {
            h = t1 - t;
        }

        let [k1, k2, k3, k4, k5, k6, k7] = &mut k;

        for i in 0..n {
            y_stage[i] = y[i] + h * A21 * k1[i];
        }
        f(t + C2 * h, &y_stage, k2);

        for i in 0..n {
            y_stage[i] = y[i] + h * (A31 * k1[i] + A32 * k2[i]);
        }
        f(t + C3 * h, &y_stage, k3);

        for i in 0..n {
            y_stage[i] = y[i] + h * (A41 * k1[i] + A42 * k2[i] + A43 * k3[i]);
        }
        f(t + C4 * h, &y_stage, k4);

        for i in 0..n {
            y_stage[i] = y[i] + h * (A51 * k1[i] + A52 * k2[i] + A53 * k3[i] + A54 * k4[i]);
        }
        f(t + C5 * h, &y_stage, k5);

        for i in 0..n {
            y_stage[i] = y[i]
                + h * (A61 * k1[i] + A62 * k2[i] + A63 * k3[i] + A64 * k4[i] + A65 * k5[i]);
        }
        let t_new = if last { t1 } else { t + h };
        f(t_new, &y_stage, k6);

        for i in 0..n {
            y_new[i] = y[i]
                + h * (A71 * k1[i] + A73 * k3[i] + A74 * k4[i] + A75 * k5[i] + A76 * k6[i]);
        }
        f(t_new, &y_new, k7);
        stats.evaluations += 6;

        let mut sum = 0.0;
        for i in 0..n {
            let estimate = h
                * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i] + E7 * k7[i]);
            let scale = config.abs_tol() + config.rel_tol() * y[i].abs().max(y_new[i].abs());
            sum += (estimate / scale).powi(2);
        }
        let error = if n == 0 { 0.0 } else { (sum / n as f64).sqrt() };

        if !error.is_finite() {
            // A blown-up stage counts as a rejection.
            stats.rejected += 1;
            rejected_last = true;
            h *= FAC_MIN;
            continue;
        }

        let factor = (SAFETY * error.powf(-1.0 / ORDER)).clamp(FAC_MIN, FAC_MAX);

        if error <= 1.0 {
            stats.accepted += 1;

            let (r1, rest) = coefficients.split_at_mut(n);
            let (r2, rest) = rest.split_at_mut(n);
            let (r3, rest) = rest.split_at_mut(n);
            let (r4, r5) = rest.split_at_mut(n);
            for i in 0..n {
                let ydiff = y_new[i] - y[i];
                let bspl = h * k1[i] - ydiff;
                r1[i] = y[i];
                r2[i] = ydiff;
                r3[i] = bspl;
                r4[i] = ydiff - h * k7[i] - bspl;
                r5[i] = h
                    * (D1 * k1[i] + D3 * k3[i] + D4 * k4[i] + D5 * k5[i] + D6 * k6[i]
                        + D7 * k7[i]);
            }

            if y_new.iter().any(|v| !v.is_finite()) {
                return Err(Error::NonFiniteState { time: t_new });
            }

            solution.push_step(t, h, &coefficients, &y_new);
            std::mem::swap(k1, k7);
            std::mem::swap(&mut y, &mut y_new);
            t = t_new;

            if last {
                break;
            }

            let mut h_new = h * factor;
            if rejected_last {
                h_new = direction * h_new.abs().min(h.abs());
            }
            rejected_last = false;
            h = direction * h_new.abs().min(config.max_step());
        } else {
            stats.rejected += 1;
            rejected_last = true;
            h *= factor.min(1.0);
        }
    }

    solution.set_stats(stats);
    Ok(solution)
}

/// Chooses a first step following Hairer, Nørsett & Wanner's `hinit`.
fn initial_step<F>(
    f: &mut F,
    t0: f64,
    y0: &[f64],
    f0: &[f64],
    direction: f64,
    config: &Config,
    stats: &mut Stats,
) -> f64
where
    F: FnMut(f64, &[f64], &mut [f64]),
{
    let scale: Vec<f64> = y0
        .iter()
        .map(|y| config.abs_tol() + config.rel_tol() * y.abs())
        .collect();

    let dnf: f64 = f0.iter().zip(&scale).map(|(f, s)| (f / s).powi(2)).sum();
    let dny: f64 = y0.iter().zip(&scale).map(|(y, s)| (y / s).powi(2)).sum();

    let ratio = (dny / dnf).sqrt() * 0.01;
    let mut h = if dnf <= 1e-10 || dny <= 1e-10 || !ratio.is_finite() || ratio <= 0.0 {
        1e-6
    } else {
        ratio
    };
    h = h.min(config.max_step());

    let y1: Vec<f64> = y0
        .iter()
        .zip(f0)
        .map(|(y, f)| y + direction * h * f)
        .collect();
    let mut f1 = vec![0.0; y0.len()];
    f(t0 + direction * h, &y1, &mut f1);
    stats.evaluations += 1;

    let der2 = f1
        .iter()
        .zip(f0)
        .zip(&scale)
        .map(|((a, b), s)| ((a - b) / s).powi(2))
        .sum::<f64>()
        .sqrt()
        / h;
    let der12 = der2.abs().max(dnf.sqrt());

    let h1 = if der12 <= 1e-15 || !der12.is_finite() {
        (h * 1e-3).max(1e-6)
    } else {
        (0.01 / der12).powf(1.0 / ORDER)
    };

    let h = (100.0 * h).min(h1).min(config.max_step());
    if h.is_finite() && h > 0.0 {
        h
    } else {
        1e-6_f64.min(config.max_step())
    }
}
