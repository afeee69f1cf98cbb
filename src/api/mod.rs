use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, error::ErrorKind};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{ModelError, ProjectionConfig, ReturnConfig, run_projection};
use crate::report::render_report;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectionPayload {
    population: Option<f64>,
    activation_rate: Option<f64>,
    adoption_rate: Option<f64>,
    utilisation_rate: Option<f64>,
    revenue_per_user: Option<f64>,
    gross_margin: Option<f64>,
    monthly_opex: Option<f64>,
    investment_months: Option<usize>,
    investment_monthly_opex: Option<f64>,
    population_growth: Option<f64>,
    terminal_year: Option<u32>,
    terminal_multiple: Option<f64>,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "subscription-irr",
    about = "Monthly revenue/EBITDA projection for a subscription rollout, with exit IRR"
)]
pub struct Cli {
    #[arg(long, default_value_t = 2_260_000.0, help = "Addressable population at launch")]
    population: f64,
    #[arg(long, default_value_t = 75.0, help = "Activation rate in percent")]
    activation_rate: f64,
    #[arg(long, default_value_t = 36.0, help = "Adoption rate in percent")]
    adoption_rate: f64,
    #[arg(long, default_value_t = 10.0, help = "Utilisation rate in percent")]
    utilisation_rate: f64,
    #[arg(long, default_value_t = 4.0, help = "Monthly revenue per utilising user")]
    revenue_per_user: f64,
    #[arg(long, default_value_t = 80.0, help = "Gross margin in percent")]
    gross_margin: f64,
    #[arg(
        long,
        default_value_t = 100_000.0,
        help = "Monthly OPEX once the product has launched"
    )]
    monthly_opex: f64,
    #[arg(long, default_value_t = 12, help = "Months of investment before launch")]
    investment_months: usize,
    #[arg(
        long,
        default_value_t = 100_000.0,
        help = "Monthly OPEX during the investment period"
    )]
    investment_monthly_opex: f64,
    #[arg(
        long,
        default_value_t = 10.0,
        help = "Annual population growth after launch in percent"
    )]
    population_growth: f64,
    #[arg(long, default_value_t = 6, help = "Year at whose end the business is sold")]
    terminal_year: u32,
    #[arg(long, default_value_t = 20.0, help = "Sale value as a multiple of monthly EBITDA")]
    terminal_multiple: f64,
    #[arg(long, help = "Print the full projection as JSON instead of a summary")]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_configs(cli: &Cli) -> (ProjectionConfig, ReturnConfig) {
    (
        ProjectionConfig {
            population: cli.population,
            activation_rate: cli.activation_rate / 100.0,
            adoption_rate: cli.adoption_rate / 100.0,
            utilisation_rate: cli.utilisation_rate / 100.0,
            monthly_revenue_per_user: cli.revenue_per_user,
            gross_margin: cli.gross_margin / 100.0,
            monthly_opex: cli.monthly_opex,
            investment_period_months: cli.investment_months,
            investment_monthly_opex: cli.investment_monthly_opex,
            population_growth_rate: cli.population_growth / 100.0,
        },
        ReturnConfig {
            terminal_year: cli.terminal_year,
            terminal_multiple: cli.terminal_multiple,
        },
    )
}

/// Parses CLI flags from `args`, runs one projection and returns the text to print.
pub fn run_cli<I, T>(args: I) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            return Ok(e.to_string());
        }
        Err(e) => return Err(e.to_string()),
    };
    let (config, returns) = build_configs(&cli);
    let result = run_projection(&config, &returns).map_err(|e| e.to_string())?;
    tracing::info!(
        terminal_value = result.terminal_value,
        irr = result.irr,
        annualized_irr = result.annualized_irr,
        "projection solved"
    );

    if cli.json {
        serde_json::to_string_pretty(&result).map_err(|e| format!("failed to encode JSON: {e}"))
    } else {
        Ok(render_report(&result))
    }
}

pub fn router() -> Router {
    Router::new()
        .route(
            "/api/projection",
            get(projection_get_handler).post(projection_post_handler),
        )
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "projection HTTP API listening");

    axum::serve(listener, router()).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn projection_get_handler(Query(payload): Query<ProjectionPayload>) -> Response {
    projection_handler_impl(payload)
}

async fn projection_post_handler(Json(payload): Json<ProjectionPayload>) -> Response {
    projection_handler_impl(payload)
}

fn projection_handler_impl(payload: ProjectionPayload) -> Response {
    let cli = cli_from_payload(payload);
    let (config, returns) = build_configs(&cli);
    match run_projection(&config, &returns) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(err) => {
            tracing::warn!(error = %err, "projection request failed");
            error_response(status_for(&err), &err.to_string())
        }
    }
}

fn status_for(err: &ModelError) -> StatusCode {
    match err {
        ModelError::InvalidConfiguration(_) | ModelError::InvalidHorizon { .. } => {
            StatusCode::BAD_REQUEST
        }
        ModelError::NoConvergence(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

fn cli_from_payload(payload: ProjectionPayload) -> Cli {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.population {
        cli.population = v;
    }
    if let Some(v) = payload.activation_rate {
        cli.activation_rate = v;
    }
    if let Some(v) = payload.adoption_rate {
        cli.adoption_rate = v;
    }
    if let Some(v) = payload.utilisation_rate {
        cli.utilisation_rate = v;
    }
    if let Some(v) = payload.revenue_per_user {
        cli.revenue_per_user = v;
    }
    if let Some(v) = payload.gross_margin {
        cli.gross_margin = v;
    }
    if let Some(v) = payload.monthly_opex {
        cli.monthly_opex = v;
    }
    if let Some(v) = payload.investment_months {
        cli.investment_months = v;
    }
    if let Some(v) = payload.investment_monthly_opex {
        cli.investment_monthly_opex = v;
    }
    if let Some(v) = payload.population_growth {
        cli.population_growth = v;
    }
    if let Some(v) = payload.terminal_year {
        cli.terminal_year = v;
    }
    if let Some(v) = payload.terminal_multiple {
        cli.terminal_multiple = v;
    }

    cli
}

fn default_cli_for_api() -> Cli {
    Cli {
        population: 2_260_000.0,
        activation_rate: 75.0,
        adoption_rate: 36.0,
        utilisation_rate: 10.0,
        revenue_per_user: 4.0,
        gross_margin: 80.0,
        monthly_opex: 100_000.0,
        investment_months: 12,
        investment_monthly_opex: 100_000.0,
        population_growth: 10.0,
        terminal_year: 6,
        terminal_multiple: 20.0,
        json: false,
    }
}
