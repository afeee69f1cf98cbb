use super::error::ModelError;
use super::types::{MONTHS_PER_YEAR, ReturnConfig, TerminalValue};

pub fn validate_return_config(config: &ReturnConfig) -> Result<(), ModelError> {
    if !config.terminal_multiple.is_finite() || config.terminal_multiple <= 0.0 {
        return Err(ModelError::InvalidConfiguration(format!(
            "terminal_multiple must be > 0, got {}",
            config.terminal_multiple
        )));
    }
    Ok(())
}

/// Month index closing `terminal_year`; year 1 ends at month 11.
pub fn terminal_month_index(terminal_year: u32) -> i64 {
    terminal_year as i64 * MONTHS_PER_YEAR as i64 - 1
}

/// Values the business at the end of `terminal_year` as a multiple of that month's EBITDA.
pub fn compute_terminal_value(
    ebitda: &[f64],
    terminal_year: u32,
    multiple: f64,
) -> Result<TerminalValue, ModelError> {
    let month = checked_month(terminal_month_index(terminal_year), ebitda.len())?;
    let terminal_ebitda = ebitda[month];
    Ok(TerminalValue {
        month,
        ebitda: terminal_ebitda,
        value: terminal_ebitda * multiple,
    })
}

/// Copies the EBITDA series and adds the terminal value at `terminal_month`.
/// Months after the sale keep their EBITDA.
pub fn build_cash_flow_series(
    ebitda: &[f64],
    terminal_month: usize,
    terminal_value: f64,
) -> Result<Vec<f64>, ModelError> {
    let month = checked_month(terminal_month as i64, ebitda.len())?;
    let mut cash_flows = ebitda.to_vec();
    cash_flows[month] += terminal_value;
    Ok(cash_flows)
}

fn checked_month(month: i64, series_len: usize) -> Result<usize, ModelError> {
    match usize::try_from(month) {
        Ok(index) if index < series_len => Ok(index),
        _ => Err(ModelError::InvalidHorizon {
            terminal_month: month,
            series_len,
        }),
    }
}
