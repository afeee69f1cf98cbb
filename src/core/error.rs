use thiserror::Error;

/// Failures surfaced by the projection engine and the return calculator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The terminal month falls outside the projected series.
    #[error("terminal month {terminal_month} is outside a {series_len}-month series")]
    InvalidHorizon {
        terminal_month: i64,
        series_len: usize,
    },
    #[error("IRR did not converge: {0}")]
    NoConvergence(String),
}
