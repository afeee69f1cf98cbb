use serde::Serialize;

pub const MONTHS_PER_YEAR: usize = 12;
pub const RAMP_UP_MONTHS: usize = 12;
pub const STEADY_STATE_MONTHS: usize = 48;
/// Longest accepted pre-launch investment period (100 years).
pub const MAX_INVESTMENT_MONTHS: usize = 1_200;

/// Inputs to the monthly projection. Rates and margins are fractions, not percent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionConfig {
    pub population: f64,
    pub activation_rate: f64,
    pub adoption_rate: f64,
    pub utilisation_rate: f64,
    pub monthly_revenue_per_user: f64,
    pub gross_margin: f64,
    pub monthly_opex: f64,
    pub investment_period_months: usize,
    pub investment_monthly_opex: f64,
    pub population_growth_rate: f64,
}

impl ProjectionConfig {
    /// Share of the population that ends up as a paying, utilising user.
    pub fn conversion_rate(&self) -> f64 {
        self.activation_rate * self.adoption_rate * self.utilisation_rate
    }

    pub fn total_months(&self) -> usize {
        self.investment_period_months
            .saturating_add(RAMP_UP_MONTHS + STEADY_STATE_MONTHS)
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            population: 2_260_000.0,
            activation_rate: 0.75,
            adoption_rate: 0.36,
            utilisation_rate: 0.10,
            monthly_revenue_per_user: 4.0,
            gross_margin: 0.80,
            monthly_opex: 100_000.0,
            investment_period_months: 12,
            investment_monthly_opex: 100_000.0,
            population_growth_rate: 0.10,
        }
    }
}

/// Exit assumptions used to value the business at the end of `terminal_year`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnConfig {
    pub terminal_year: u32,
    pub terminal_multiple: f64,
}

impl Default for ReturnConfig {
    fn default() -> Self {
        Self {
            terminal_year: 6,
            terminal_multiple: 20.0,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Phase {
    Investment,
    RampUp { offset: usize },
    SteadyState,
}

/// One month of the projection. Costs are stored negated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonthRecord {
    pub revenue: f64,
    pub cogs: f64,
    pub opex: f64,
    pub ebitda: f64,
    pub utilising_users: f64,
}

/// Aligned month-indexed series produced by the projection engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySeries {
    pub revenues: Vec<f64>,
    pub cogs: Vec<f64>,
    pub opex: Vec<f64>,
    pub ebitda: Vec<f64>,
    pub utilising_users: Vec<f64>,
}

impl MonthlySeries {
    pub fn with_capacity(months: usize) -> Self {
        Self {
            revenues: Vec::with_capacity(months),
            cogs: Vec::with_capacity(months),
            opex: Vec::with_capacity(months),
            ebitda: Vec::with_capacity(months),
            utilising_users: Vec::with_capacity(months),
        }
    }

    pub fn push(&mut self, record: MonthRecord) {
        self.revenues.push(record.revenue);
        self.cogs.push(record.cogs);
        self.opex.push(record.opex);
        self.ebitda.push(record.ebitda);
        self.utilising_users.push(record.utilising_users);
    }

    pub fn len(&self) -> usize {
        self.ebitda.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ebitda.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalValue {
    pub month: usize,
    pub ebitda: f64,
    pub value: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveMethod {
    Newton,
    Bisection,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IrrSolution {
    pub rate: f64,
    pub iterations: u32,
    pub method: SolveMethod,
}

/// Headline figures of a run, taken from the configuration and the final month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyOutputs {
    pub simulation_years: f64,
    pub conversion_rate: f64,
    pub monthly_gross_profit_per_user: f64,
    pub final_utilising_users: f64,
    pub final_monthly_revenue: f64,
    pub final_monthly_ebitda: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub config: ProjectionConfig,
    pub terminal_year: u32,
    pub terminal_multiple: f64,
    pub population: Vec<f64>,
    #[serde(flatten)]
    pub series: MonthlySeries,
    pub cash_flows: Vec<f64>,
    pub terminal_month: usize,
    pub terminal_ebitda: f64,
    pub terminal_value: f64,
    pub irr: f64,
    pub annualized_irr: f64,
    pub irr_method: SolveMethod,
    pub summary: KeyOutputs,
}
