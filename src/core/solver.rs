use super::error::ModelError;
use super::types::{IrrSolution, SolveMethod};

/// Bounds for the IRR root finder. Rates are per period of the cash-flow series.
#[derive(Debug, Clone, Copy)]
pub struct IrrSolveConfig {
    pub guess: f64,
    pub tolerance: f64,
    pub max_iterations: u32,
    pub scan_step: f64,
    pub max_rate: f64,
}

impl Default for IrrSolveConfig {
    fn default() -> Self {
        Self {
            guess: 0.1,
            tolerance: 1e-10,
            max_iterations: 100,
            scan_step: 0.01,
            max_rate: 10.0,
        }
    }
}

/// Lowest rate the scan will evaluate; discount factors blow up at -100%.
const MIN_RATE: f64 = -0.999_999_99;

pub fn net_present_value(cash_flows: &[f64], rate: f64) -> f64 {
    let base = 1.0 + rate;
    cash_flows
        .iter()
        .enumerate()
        .map(|(t, cf)| cf / base.powi(t as i32))
        .sum()
}

fn npv_and_derivative(cash_flows: &[f64], rate: f64) -> (f64, f64) {
    let base = 1.0 + rate;
    let mut npv = 0.0;
    let mut derivative = 0.0;
    for (t, cf) in cash_flows.iter().enumerate() {
        let factor = base.powi(t as i32);
        npv += cf / factor;
        derivative -= t as f64 * cf / (factor * base);
    }
    (npv, derivative)
}

/// IRR with the default solver bounds.
pub fn internal_rate_of_return(cash_flows: &[f64]) -> Result<f64, ModelError> {
    solve_irr(cash_flows, IrrSolveConfig::default()).map(|solution| solution.rate)
}

/// Finds `r` with `sum(cf[t] / (1 + r)^t) == 0`.
///
/// Newton-Raphson runs first from `config.guess`. When it fails to settle the
/// solver falls back to bisecting the sign change nearest to a zero rate, so a
/// series with several roots reports the one Newton reaches, else the smallest
/// in magnitude.
pub fn solve_irr(cash_flows: &[f64], config: IrrSolveConfig) -> Result<IrrSolution, ModelError> {
    validate_config(config)?;

    let has_inflow = cash_flows.iter().any(|cf| *cf > 0.0);
    let has_outflow = cash_flows.iter().any(|cf| *cf < 0.0);
    if cash_flows.iter().any(|cf| !cf.is_finite()) {
        return Err(ModelError::NoConvergence(
            "cash flows must be finite".to_string(),
        ));
    }
    if !(has_inflow && has_outflow) {
        return Err(ModelError::NoConvergence(
            "cash flows have no sign change".to_string(),
        ));
    }

    if let Some(solution) = newton(cash_flows, config) {
        return Ok(solution);
    }
    tracing::debug!(
        guess = config.guess,
        "newton iteration did not settle; bracketing instead"
    );

    let Some((lo, hi)) = nearest_bracket(cash_flows, config) else {
        return Err(ModelError::NoConvergence(format!(
            "no NPV sign change between {MIN_RATE} and {}",
            config.max_rate
        )));
    };
    bisect(cash_flows, lo, hi, config)
}

fn newton(cash_flows: &[f64], config: IrrSolveConfig) -> Option<IrrSolution> {
    let mut rate = config.guess;
    for iteration in 1..=config.max_iterations {
        let (npv, derivative) = npv_and_derivative(cash_flows, rate);
        if !npv.is_finite() || !derivative.is_finite() || derivative == 0.0 {
            return None;
        }

        let next = rate - npv / derivative;
        if !next.is_finite() || next <= -1.0 {
            return None;
        }
        if (next - rate).abs() <= config.tolerance {
            return Some(IrrSolution {
                rate: next,
                iterations: iteration,
                method: SolveMethod::Newton,
            });
        }
        rate = next;
    }
    None
}

/// Walks outward from zero, alternating sides, until the NPV changes sign.
fn nearest_bracket(cash_flows: &[f64], config: IrrSolveConfig) -> Option<(f64, f64)> {
    let at_zero = net_present_value(cash_flows, 0.0);
    if at_zero == 0.0 {
        return Some((0.0, 0.0));
    }

    let mut prev_up = (0.0, at_zero);
    let mut prev_down = (0.0, at_zero);
    let mut up_open = true;
    let mut down_open = true;
    let mut k: u32 = 1;

    while up_open || down_open {
        let offset = k as f64 * config.scan_step;

        if up_open {
            let rate = offset.min(config.max_rate);
            let value = net_present_value(cash_flows, rate);
            if value.is_finite() && changes_sign(prev_up.1, value) {
                return Some((prev_up.0, rate));
            }
            prev_up = (rate, value);
            up_open = rate < config.max_rate && value.is_finite();
        }

        if down_open {
            // Near -1 the NPV may overflow; an infinite value still has a usable sign.
            let rate = (-offset).max(MIN_RATE);
            let value = net_present_value(cash_flows, rate);
            if !value.is_nan() && changes_sign(prev_down.1, value) {
                return Some((rate, prev_down.0));
            }
            prev_down = (rate, value);
            down_open = rate > MIN_RATE && !value.is_nan();
        }

        k += 1;
    }
    None
}

fn changes_sign(a: f64, b: f64) -> bool {
    a == 0.0 || b == 0.0 || (a < 0.0) != (b < 0.0)
}

fn bisect(
    cash_flows: &[f64],
    mut lo: f64,
    mut hi: f64,
    config: IrrSolveConfig,
) -> Result<IrrSolution, ModelError> {
    let mut lo_value = net_present_value(cash_flows, lo);
    if lo_value == 0.0 {
        return Ok(IrrSolution {
            rate: lo,
            iterations: 0,
            method: SolveMethod::Bisection,
        });
    }
    if net_present_value(cash_flows, hi) == 0.0 {
        return Ok(IrrSolution {
            rate: hi,
            iterations: 0,
            method: SolveMethod::Bisection,
        });
    }

    let mut it = 0;
    while it < config.max_iterations {
        it += 1;
        let mid = (lo + hi) * 0.5;
        let value = net_present_value(cash_flows, mid);
        if value == 0.0 {
            return Ok(IrrSolution {
                rate: mid,
                iterations: it,
                method: SolveMethod::Bisection,
            });
        }

        if (value < 0.0) == (lo_value < 0.0) {
            lo = mid;
            lo_value = value;
        } else {
            hi = mid;
        }

        if (hi - lo).abs() <= config.tolerance {
            return Ok(IrrSolution {
                rate: (lo + hi) * 0.5,
                iterations: it,
                method: SolveMethod::Bisection,
            });
        }
    }

    Err(ModelError::NoConvergence(format!(
        "bisection reached {} iterations with bracket [{lo}, {hi}]",
        config.max_iterations
    )))
}

fn validate_config(config: IrrSolveConfig) -> Result<(), ModelError> {
    if !config.guess.is_finite() || config.guess <= -1.0 {
        return Err(ModelError::InvalidConfiguration(
            "guess must be a finite rate > -1".to_string(),
        ));
    }
    if !config.tolerance.is_finite() || config.tolerance <= 0.0 {
        return Err(ModelError::InvalidConfiguration(
            "tolerance must be > 0".to_string(),
        ));
    }
    if config.max_iterations == 0 {
        return Err(ModelError::InvalidConfiguration(
            "max_iterations must be > 0".to_string(),
        ));
    }
    if !config.scan_step.is_finite() || config.scan_step <= 0.0 {
        return Err(ModelError::InvalidConfiguration(
            "scan_step must be > 0".to_string(),
        ));
    }
    if !config.max_rate.is_finite() || config.max_rate <= 0.0 {
        return Err(ModelError::InvalidConfiguration(
            "max_rate must be > 0".to_string(),
        ));
    }
    Ok(())
}
