mod engine;
mod error;
mod returns;
mod solver;
mod types;

pub use engine::{
    build_monthly_series, build_population_trajectory, key_outputs, month_record,
    phase_for_month, run_projection, run_projection_with_solver, validate_config,
};
pub use error::ModelError;
pub use returns::{
    build_cash_flow_series, compute_terminal_value, terminal_month_index, validate_return_config,
};
pub use solver::{IrrSolveConfig, internal_rate_of_return, net_present_value, solve_irr};
pub use types::{
    IrrSolution, KeyOutputs, MAX_INVESTMENT_MONTHS, MONTHS_PER_YEAR, MonthRecord, MonthlySeries,
    Phase, ProjectionConfig, ProjectionResult, RAMP_UP_MONTHS, ReturnConfig, STEADY_STATE_MONTHS,
    SolveMethod, TerminalValue,
};
