use super::error::ModelError;
use super::returns::{build_cash_flow_series, compute_terminal_value, validate_return_config};
use super::solver::{IrrSolveConfig, solve_irr};
use super::types::{
    KeyOutputs, MAX_INVESTMENT_MONTHS, MONTHS_PER_YEAR, MonthRecord, MonthlySeries, Phase,
    ProjectionConfig, ProjectionResult, RAMP_UP_MONTHS, ReturnConfig, STEADY_STATE_MONTHS,
};

/// Runs the projection and the return calculation end to end.
pub fn run_projection(
    config: &ProjectionConfig,
    return_config: &ReturnConfig,
) -> Result<ProjectionResult, ModelError> {
    run_projection_with_solver(config, return_config, IrrSolveConfig::default())
}

pub fn run_projection_with_solver(
    config: &ProjectionConfig,
    return_config: &ReturnConfig,
    solver: IrrSolveConfig,
) -> Result<ProjectionResult, ModelError> {
    validate_config(config)?;
    validate_return_config(return_config)?;

    let population = build_population_trajectory(config, config.total_months());
    let series = series_from_population(config, &population);

    let terminal = compute_terminal_value(
        &series.ebitda,
        return_config.terminal_year,
        return_config.terminal_multiple,
    )?;
    let cash_flows = build_cash_flow_series(&series.ebitda, terminal.month, terminal.value)?;
    let solution = solve_irr(&cash_flows, solver)?;
    let annualized_irr = (1.0 + solution.rate).powi(MONTHS_PER_YEAR as i32) - 1.0;
    let summary = key_outputs(config, &series);

    tracing::debug!(
        months = series.len(),
        terminal_month = terminal.month,
        irr = solution.rate,
        iterations = solution.iterations,
        method = ?solution.method,
        "projection complete"
    );

    Ok(ProjectionResult {
        config: config.clone(),
        terminal_year: return_config.terminal_year,
        terminal_multiple: return_config.terminal_multiple,
        population,
        series,
        cash_flows,
        terminal_month: terminal.month,
        terminal_ebitda: terminal.ebitda,
        terminal_value: terminal.value,
        irr: solution.rate,
        annualized_irr,
        irr_method: solution.method,
        summary,
    })
}

pub fn key_outputs(config: &ProjectionConfig, series: &MonthlySeries) -> KeyOutputs {
    KeyOutputs {
        simulation_years: series.len() as f64 / MONTHS_PER_YEAR as f64,
        conversion_rate: config.conversion_rate(),
        monthly_gross_profit_per_user: config.monthly_revenue_per_user * config.gross_margin,
        final_utilising_users: series.utilising_users.last().copied().unwrap_or(0.0),
        final_monthly_revenue: series.revenues.last().copied().unwrap_or(0.0),
        final_monthly_ebitda: series.ebitda.last().copied().unwrap_or(0.0),
    }
}

/// Population per month: flat through the investment period, then compounding
/// monthly at the fractional-year power of the annual growth rate.
pub fn build_population_trajectory(config: &ProjectionConfig, total_months: usize) -> Vec<f64> {
    let growth = 1.0 + config.population_growth_rate;
    (0..total_months)
        .map(|month| {
            if month < config.investment_period_months {
                config.population
            } else {
                let years_since_launch =
                    (month - config.investment_period_months) as f64 / MONTHS_PER_YEAR as f64;
                config.population * growth.powf(years_since_launch)
            }
        })
        .collect()
}

pub fn build_monthly_series(config: &ProjectionConfig) -> Result<MonthlySeries, ModelError> {
    validate_config(config)?;
    let population = build_population_trajectory(config, config.total_months());
    Ok(series_from_population(config, &population))
}

fn series_from_population(config: &ProjectionConfig, population: &[f64]) -> MonthlySeries {
    let mut series = MonthlySeries::with_capacity(population.len());
    for (month, &current_population) in population.iter().enumerate() {
        if let Some(phase) = phase_for_month(config, month) {
            series.push(month_record(config, phase, current_population));
        }
    }
    series
}

pub fn phase_for_month(config: &ProjectionConfig, month: usize) -> Option<Phase> {
    let ramp_start = config.investment_period_months;
    let steady_start = ramp_start.saturating_add(RAMP_UP_MONTHS);
    let end = steady_start.saturating_add(STEADY_STATE_MONTHS);

    if month < ramp_start {
        Some(Phase::Investment)
    } else if month < steady_start {
        Some(Phase::RampUp {
            offset: month - ramp_start,
        })
    } else if month < end {
        Some(Phase::SteadyState)
    } else {
        None
    }
}

pub fn month_record(config: &ProjectionConfig, phase: Phase, population: f64) -> MonthRecord {
    match phase {
        Phase::Investment => with_ebitda(0.0, 0.0, -config.investment_monthly_opex, 0.0),
        Phase::RampUp { offset } => {
            let ramp_factor = offset as f64 / RAMP_UP_MONTHS as f64;
            let utilising_users = population * config.conversion_rate();
            let full_revenue = utilising_users * config.monthly_revenue_per_user;
            let full_gross_profit = full_revenue * config.gross_margin;
            // Cost gap is taken from the unramped users, then scaled.
            with_ebitda(
                ramp_factor * full_revenue,
                -(ramp_factor * (full_revenue - full_gross_profit)),
                -config.monthly_opex,
                ramp_factor * utilising_users,
            )
        }
        Phase::SteadyState => {
            let utilising_users = population * config.conversion_rate();
            let revenue = utilising_users * config.monthly_revenue_per_user;
            let gross_profit = revenue * config.gross_margin;
            with_ebitda(
                revenue,
                -(revenue - gross_profit),
                -config.monthly_opex,
                utilising_users,
            )
        }
    }
}

fn with_ebitda(revenue: f64, cogs: f64, opex: f64, utilising_users: f64) -> MonthRecord {
    MonthRecord {
        revenue,
        cogs,
        opex,
        ebitda: revenue + cogs + opex,
        utilising_users,
    }
}

pub fn validate_config(config: &ProjectionConfig) -> Result<(), ModelError> {
    for (name, value) in [
        ("population", config.population),
        ("monthly_revenue_per_user", config.monthly_revenue_per_user),
        ("monthly_opex", config.monthly_opex),
        ("investment_monthly_opex", config.investment_monthly_opex),
        ("population_growth_rate", config.population_growth_rate),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ModelError::InvalidConfiguration(format!(
                "{name} must be a finite value >= 0, got {value}"
            )));
        }
    }

    for (name, value) in [
        ("activation_rate", config.activation_rate),
        ("adoption_rate", config.adoption_rate),
        ("utilisation_rate", config.utilisation_rate),
        ("gross_margin", config.gross_margin),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ModelError::InvalidConfiguration(format!(
                "{name} must be between 0 and 1, got {value}"
            )));
        }
    }

    if config.investment_period_months > MAX_INVESTMENT_MONTHS {
        return Err(ModelError::InvalidConfiguration(format!(
            "investment_period_months must be at most {MAX_INVESTMENT_MONTHS}, got {}",
            config.investment_period_months
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::solver::net_present_value;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn no_growth_config() -> ProjectionConfig {
        ProjectionConfig {
            population_growth_rate: 0.0,
            ..ProjectionConfig::default()
        }
    }

    #[test]
    fn series_length_covers_all_three_phases() {
        let config = ProjectionConfig::default();
        let series = build_monthly_series(&config).expect("valid config");
        assert_eq!(series.len(), 12 + 12 + 48);
        assert_eq!(series.revenues.len(), series.len());
        assert_eq!(series.cogs.len(), series.len());
        assert_eq!(series.opex.len(), series.len());
        assert_eq!(series.utilising_users.len(), series.len());
    }

    #[test]
    fn investment_phase_accrues_only_investment_opex() {
        let mut config = ProjectionConfig::default();
        config.investment_monthly_opex = 75_000.0;
        let series = build_monthly_series(&config).expect("valid config");

        for month in 0..config.investment_period_months {
            assert_eq!(series.revenues[month], 0.0);
            assert_eq!(series.cogs[month], 0.0);
            assert_eq!(series.utilising_users[month], 0.0);
            assert_approx(series.opex[month], -75_000.0);
            assert_approx(series.ebitda[month], -75_000.0);
        }
        assert_approx(series.opex[config.investment_period_months], -100_000.0);
    }

    #[test]
    fn steady_state_matches_worked_example_without_growth() {
        let config = no_growth_config();
        let series = build_monthly_series(&config).expect("valid config");
        let month = config.investment_period_months + RAMP_UP_MONTHS;

        assert_approx(config.conversion_rate(), 0.027);
        assert_approx(series.utilising_users[month], 61_020.0);
        assert_approx(series.revenues[month], 244_080.0);
        assert_approx(series.cogs[month], -48_816.0);
        assert_approx(series.opex[month], -100_000.0);
        assert_approx(series.ebitda[month], 95_264.0);
    }

    #[test]
    fn ramp_up_scales_users_linearly_from_zero() {
        let config = ProjectionConfig::default();
        let population = build_population_trajectory(&config, config.total_months());
        let series = build_monthly_series(&config).expect("valid config");
        let first = config.investment_period_months;
        let last = first + RAMP_UP_MONTHS - 1;

        assert_eq!(series.utilising_users[first], 0.0);
        assert_eq!(series.revenues[first], 0.0);
        assert_approx(series.ebitda[first], -config.monthly_opex);

        let full_users = population[last] * config.conversion_rate();
        assert_approx(series.utilising_users[last], full_users * 11.0 / 12.0);
        assert_approx(
            series.revenues[last],
            full_users * config.monthly_revenue_per_user * 11.0 / 12.0,
        );
    }

    #[test]
    fn ramp_up_cogs_is_scaled_gap_of_unramped_revenue() {
        let config = no_growth_config();
        let series = build_monthly_series(&config).expect("valid config");
        let month = config.investment_period_months + 6;

        let full_revenue = 61_020.0 * 4.0;
        let gap = full_revenue - full_revenue * 0.8;
        assert_approx(series.cogs[month], -0.5 * gap);
        assert_approx(series.opex[month], -config.monthly_opex);
    }

    #[test]
    fn population_is_flat_then_compounds_by_month_fraction() {
        let config = ProjectionConfig::default();
        let population = build_population_trajectory(&config, config.total_months());
        let launch = config.investment_period_months;

        for month in 0..=launch {
            assert_eq!(population[month], config.population);
        }
        assert_approx(population[launch + 6], config.population * 1.1_f64.sqrt());
        assert_approx(population[launch + 12], config.population * 1.1);
        for month in launch + 1..population.len() {
            assert!(population[month] > population[month - 1]);
        }
    }

    #[test]
    fn zero_investment_period_starts_ramp_at_base_population() {
        let mut config = ProjectionConfig::default();
        config.investment_period_months = 0;
        let population = build_population_trajectory(&config, config.total_months());
        let series = build_monthly_series(&config).expect("valid config");

        assert_eq!(series.len(), 60);
        assert_eq!(population[0], config.population);
        assert_eq!(phase_for_month(&config, 0), Some(Phase::RampUp { offset: 0 }));
        assert_approx(series.opex[0], -config.monthly_opex);
    }

    #[test]
    fn zero_conversion_still_accrues_opex() {
        let mut config = ProjectionConfig::default();
        config.adoption_rate = 0.0;
        let series = build_monthly_series(&config).expect("valid config");

        assert!(series.revenues.iter().all(|v| *v == 0.0));
        assert!(series.cogs.iter().all(|v| *v == 0.0));
        assert!(series.opex.iter().all(|v| *v < 0.0));
    }

    #[test]
    fn phase_boundaries_follow_month_index() {
        let config = ProjectionConfig::default();
        assert_eq!(phase_for_month(&config, 11), Some(Phase::Investment));
        assert_eq!(phase_for_month(&config, 12), Some(Phase::RampUp { offset: 0 }));
        assert_eq!(phase_for_month(&config, 23), Some(Phase::RampUp { offset: 11 }));
        assert_eq!(phase_for_month(&config, 24), Some(Phase::SteadyState));
        assert_eq!(phase_for_month(&config, 71), Some(Phase::SteadyState));
        assert_eq!(phase_for_month(&config, 72), None);
    }

    #[test]
    fn validate_config_rejects_out_of_range_values() {
        let mut config = ProjectionConfig::default();
        config.gross_margin = 1.2;
        let err = build_monthly_series(&config).expect_err("margin above one");
        assert!(matches!(err, ModelError::InvalidConfiguration(ref msg) if msg.contains("gross_margin")));

        let mut config = ProjectionConfig::default();
        config.population_growth_rate = -0.05;
        let err = validate_config(&config).expect_err("negative growth");
        assert!(matches!(err, ModelError::InvalidConfiguration(_)));

        let mut config = ProjectionConfig::default();
        config.monthly_opex = f64::NAN;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn investment_period_is_capped_without_overflow() {
        let mut config = ProjectionConfig::default();
        config.investment_period_months = MAX_INVESTMENT_MONTHS;
        assert!(validate_config(&config).is_ok());

        for months in [MAX_INVESTMENT_MONTHS + 1, 10_000_000_000, usize::MAX - 20, usize::MAX] {
            config.investment_period_months = months;
            let err = build_monthly_series(&config).expect_err("investment period too long");
            assert!(
                matches!(err, ModelError::InvalidConfiguration(ref msg) if msg.contains("investment_period_months")),
                "unexpected error {err:?}"
            );
            assert!(run_projection(&config, &ReturnConfig::default()).is_err());
        }

        config.investment_period_months = usize::MAX - 20;
        assert_eq!(config.total_months(), usize::MAX);
        assert_eq!(phase_for_month(&config, usize::MAX - 21), Some(Phase::Investment));
        assert!(phase_for_month(&config, usize::MAX - 1).is_some());
    }

    #[test]
    fn key_outputs_describe_the_final_month() {
        let config = ProjectionConfig::default();
        let result = run_projection(&config, &ReturnConfig::default()).expect("default solves");
        let summary = result.summary;

        assert_approx(summary.simulation_years, 6.0);
        assert_approx(summary.conversion_rate, 0.027);
        assert_approx(summary.monthly_gross_profit_per_user, 3.2);

        let final_users = 2_260_000.0 * 1.1_f64.powf(59.0 / 12.0) * 0.027;
        assert_approx(summary.final_utilising_users, final_users);
        assert_approx(summary.final_monthly_revenue, final_users * 4.0);
        assert_approx(
            summary.final_monthly_ebitda,
            final_users * 4.0 * 0.8 - config.monthly_opex,
        );
        assert_eq!(summary.final_monthly_ebitda, result.series.ebitda[71]);
    }

    #[test]
    fn run_projection_injects_terminal_value_and_solves_irr() {
        let config = ProjectionConfig::default();
        let returns = ReturnConfig::default();
        let result = run_projection(&config, &returns).expect("projection should solve");

        assert_eq!(result.terminal_month, 71);
        let x = result.series.ebitda[71];
        assert_approx(result.terminal_ebitda, x);
        assert_approx(result.terminal_value, 20.0 * x);
        assert_approx(result.cash_flows[71], 21.0 * x);
        for month in 0..71 {
            assert_eq!(result.cash_flows[month], result.series.ebitda[month]);
        }

        assert!(result.irr > 0.0);
        assert!(result.annualized_irr > result.irr);
        let npv = net_present_value(&result.cash_flows, result.irr);
        let scale: f64 = result.cash_flows.iter().map(|v| v.abs()).sum();
        assert!(npv.abs() <= scale * 1e-8, "npv {npv} not close to zero");
    }

    #[test]
    fn run_projection_rejects_horizon_past_series_end() {
        let mut config = ProjectionConfig::default();
        config.investment_period_months = 0;
        let err = run_projection(&config, &ReturnConfig::default()).expect_err("60 months < 72");
        assert_eq!(
            err,
            ModelError::InvalidHorizon {
                terminal_month: 71,
                series_len: 60
            }
        );
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_series_invariants_hold_for_valid_configs(
            population in 0u32..10_000_000,
            activation_bp in 0u32..10_001,
            adoption_bp in 0u32..10_001,
            utilisation_bp in 0u32..10_001,
            revenue_per_user_pence in 0u32..5_000,
            margin_bp in 0u32..10_001,
            opex in 0u32..500_000,
            investment_opex in 0u32..500_000,
            investment_months in 0usize..36,
            growth_bp in 0u32..3_000
        ) {
            let config = ProjectionConfig {
                population: population as f64,
                activation_rate: activation_bp as f64 / 10_000.0,
                adoption_rate: adoption_bp as f64 / 10_000.0,
                utilisation_rate: utilisation_bp as f64 / 10_000.0,
                monthly_revenue_per_user: revenue_per_user_pence as f64 / 100.0,
                gross_margin: margin_bp as f64 / 10_000.0,
                monthly_opex: opex as f64,
                investment_period_months: investment_months,
                investment_monthly_opex: investment_opex as f64,
                population_growth_rate: growth_bp as f64 / 10_000.0,
            };

            let series = build_monthly_series(&config).expect("valid config");
            prop_assert_eq!(series.len(), investment_months + 60);

            for month in 0..series.len() {
                let sum = series.revenues[month] + series.cogs[month] + series.opex[month];
                prop_assert!((series.ebitda[month] - sum).abs() <= 1e-9 * (1.0 + sum.abs()));
                prop_assert!(series.revenues[month] >= 0.0);
                prop_assert!(series.cogs[month] <= 0.0);
                prop_assert!(series.opex[month] <= 0.0);
                prop_assert!(series.utilising_users[month] >= 0.0);
                if month < investment_months {
                    prop_assert_eq!(series.revenues[month], 0.0);
                    prop_assert_eq!(series.utilising_users[month], 0.0);
                }
            }

            let population = build_population_trajectory(&config, config.total_months());
            for month in 1..population.len() {
                prop_assert!(population[month] >= population[month - 1]);
            }
        }
    }
}
