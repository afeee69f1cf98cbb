//! Console rendering of a projection run.

use std::fmt::Write as _;

use serde::Serialize;

use crate::core::{KeyOutputs, MONTHS_PER_YEAR, MonthlySeries, ProjectionResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSummary {
    pub year: usize,
    pub revenue: f64,
    pub cogs: f64,
    pub opex: f64,
    pub ebitda: f64,
    pub closing_utilising_users: f64,
}

/// Sums each twelve-month block; a trailing partial year is summed as-is.
pub fn yearly_rollup(series: &MonthlySeries) -> Vec<YearSummary> {
    let months = series.len();
    (0..months)
        .step_by(MONTHS_PER_YEAR)
        .enumerate()
        .map(|(i, start)| {
            let end = (start + MONTHS_PER_YEAR).min(months);
            YearSummary {
                year: i + 1,
                revenue: series.revenues[start..end].iter().sum(),
                cogs: series.cogs[start..end].iter().sum(),
                opex: series.opex[start..end].iter().sum(),
                ebitda: series.ebitda[start..end].iter().sum(),
                closing_utilising_users: series.utilising_users[end - 1],
            }
        })
        .collect()
}

/// Whole pounds with thousands separators, truncated toward zero.
pub fn format_pounds(value: f64) -> String {
    let whole = group_thousands(value.trunc().abs() as u64);
    if value < 0.0 {
        format!("-£{whole}")
    } else {
        format!("£{whole}")
    }
}

pub fn format_percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn render_report(result: &ProjectionResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>4}  {:>14}  {:>14}  {:>14}  {:>14}  {:>12}",
        "Year", "Revenue", "COGS", "OPEX", "EBITDA", "Users"
    );
    for year in yearly_rollup(&result.series) {
        let _ = writeln!(
            out,
            "{:>4}  {:>14}  {:>14}  {:>14}  {:>14}  {:>12}",
            year.year,
            format_pounds(year.revenue),
            format_pounds(year.cogs),
            format_pounds(year.opex),
            format_pounds(year.ebitda),
            group_thousands(year.closing_utilising_users.round().max(0.0) as u64),
        );
    }
    let _ = writeln!(out);
    write_key_outputs(&mut out, &result.summary);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Assuming sale value of {} in year {}",
        format_pounds(result.terminal_value),
        result.terminal_year
    );
    let _ = writeln!(
        out,
        "IRR (including terminal value in year {}): {} monthly ({} annualised)",
        result.terminal_year,
        format_percent(result.irr),
        format_percent(result.annualized_irr)
    );
    out
}

fn write_key_outputs(out: &mut String, summary: &KeyOutputs) {
    let _ = writeln!(out, "Simulation length: {} years", summary.simulation_years);
    let _ = writeln!(
        out,
        "Overall conversion rate: {}",
        format_percent(summary.conversion_rate)
    );
    let _ = writeln!(
        out,
        "Monthly GP per user: £{:.2}",
        summary.monthly_gross_profit_per_user
    );
    let _ = writeln!(
        out,
        "Final utilising users: {}",
        group_thousands(summary.final_utilising_users.round().max(0.0) as u64)
    );
    let _ = writeln!(
        out,
        "Final MRR: {}",
        format_pounds(summary.final_monthly_revenue.round())
    );
    let _ = writeln!(
        out,
        "Final monthly EBITDA: {}",
        format_pounds(summary.final_monthly_ebitda.round())
    );
}
