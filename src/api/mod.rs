use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{Datelike, Utc};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::core::{
    EngineError, HistogramBin, HistoricalScenario, ProjectionPoint, ScenarioParameters,
    SeriesPoint, SimulationControls, SimulationRequest, SimulationRun, WithdrawalStrategy,
    default_history, final_portfolios, histogram, net_worth_series, project_scenario,
    projected_retirement_portfolio, spawn_historical, spawn_monte_carlo, years_lasted_counts,
};

const HISTOGRAM_BINS: usize = 20;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliWithdrawalStrategy {
    Fixed,
    Percentage,
    Guardrails,
}

impl From<CliWithdrawalStrategy> for WithdrawalStrategy {
    fn from(value: CliWithdrawalStrategy) -> Self {
        match value {
            CliWithdrawalStrategy::Fixed => WithdrawalStrategy::Fixed,
            CliWithdrawalStrategy::Percentage => WithdrawalStrategy::Percentage,
            CliWithdrawalStrategy::Guardrails => WithdrawalStrategy::Guardrails,
        }
    }
}

impl From<WithdrawalStrategy> for CliWithdrawalStrategy {
    fn from(value: WithdrawalStrategy) -> Self {
        match value {
            WithdrawalStrategy::Fixed => CliWithdrawalStrategy::Fixed,
            WithdrawalStrategy::Percentage => CliWithdrawalStrategy::Percentage,
            WithdrawalStrategy::Guardrails => CliWithdrawalStrategy::Guardrails,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    life_expectancy: Option<u32>,
    current_savings: Option<f64>,
    annual_contribution: Option<f64>,
    annual_expenses: Option<f64>,
    portfolio_stock_pct: Option<f64>,
    expected_return_mean: Option<f64>,
    expected_return_stdev: Option<f64>,
    inflation_rate: Option<f64>,
    withdrawal_strategy: Option<String>,
    seed: Option<u64>,

    num_simulations: Option<u32>,
    retirement_years: Option<u32>,
    initial_portfolio: Option<f64>,
    annual_withdrawal: Option<f64>,
    withdrawal_rate: Option<f64>,

    start_year: Option<i32>,
    inflation_adjusted: Option<bool>,
}

#[derive(Parser, Debug)]
#[command(
    name = "firesim",
    about = "FIRE retirement simulator (deterministic projection, Monte Carlo and historical drawdown)"
)]
struct Cli {
    #[arg(long, default_value_t = 30)]
    current_age: u32,
    #[arg(long, default_value_t = 65)]
    retirement_age: u32,
    #[arg(long, default_value_t = 95)]
    life_expectancy: u32,
    #[arg(long, default_value_t = 50_000.0)]
    current_savings: f64,
    #[arg(long, default_value_t = 10_000.0)]
    annual_contribution: f64,
    #[arg(
        long,
        default_value_t = 40_000.0,
        help = "Baseline retirement spending before inflation"
    )]
    annual_expenses: f64,
    #[arg(
        long,
        default_value_t = 0.8,
        help = "Stock share of the portfolio between 0 and 1; the remainder is bonds"
    )]
    portfolio_stock_pct: f64,
    #[arg(
        long,
        default_value_t = 0.07,
        help = "Expected annual stock return as a decimal, e.g. 0.07"
    )]
    expected_return_mean: f64,
    #[arg(
        long,
        default_value_t = 0.15,
        help = "Annual stock return volatility as a decimal, e.g. 0.15"
    )]
    expected_return_stdev: f64,
    #[arg(
        long,
        default_value_t = 0.03,
        help = "Annual inflation as a decimal, e.g. 0.03"
    )]
    inflation_rate: f64,
    #[arg(long, value_enum, default_value_t = CliWithdrawalStrategy::Fixed)]
    withdrawal_strategy: CliWithdrawalStrategy,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 1_000)]
    simulations: u32,
    #[arg(
        long,
        help = "Retirement horizon in years; defaults to life-expectancy minus retirement-age"
    )]
    retirement_years: Option<u32>,
    #[arg(
        long,
        help = "Portfolio value at retirement; defaults to the deterministically projected value"
    )]
    initial_portfolio: Option<f64>,
    #[arg(
        long,
        default_value_t = 40_000.0,
        help = "Yearly withdrawal for the fixed and guardrails strategies"
    )]
    annual_withdrawal: f64,
    #[arg(
        long,
        default_value_t = 0.04,
        help = "Yearly withdrawal fraction for the percentage strategy, e.g. 0.04"
    )]
    withdrawal_rate: f64,
    #[arg(
        long,
        help = "Calendar year of the first projection point; defaults to the current year"
    )]
    start_year: Option<i32>,
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        help = "Grow the historical-simulation withdrawal with each year's recorded inflation"
    )]
    inflation_adjusted: bool,
}

#[derive(Debug)]
struct ApiScenario {
    params: ScenarioParameters,
    controls: SimulationControls,
    start_year: i32,
    inflation_adjusted: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    start_year: i32,
    retirement_age: u32,
    projected_retirement_portfolio: f64,
    points: Vec<ProjectionPoint>,
    series: Vec<SeriesPoint>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    strategy: WithdrawalStrategy,
    num_simulations: u32,
    retirement_years: u32,
    initial_portfolio: f64,
    success_rate: f64,
    median_balance: f64,
    percentile_10: f64,
    percentile_90: f64,
    histogram: Vec<HistogramBin>,
    years_lasted_counts: Vec<usize>,
    results: Vec<SimulationRun>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoricalResponse {
    num_simulations: u32,
    retirement_years: u32,
    initial_portfolio: f64,
    annual_withdrawal: f64,
    inflation_adjusted: bool,
    success_rate: f64,
    median_balance: f64,
    percentile_10: f64,
    percentile_90: f64,
    worst_start_year: u32,
    best_start_year: u32,
    histogram: Vec<HistogramBin>,
    results: Vec<SimulationRun>,
}

fn build_scenario(cli: Cli) -> Result<ApiScenario, String> {
    if cli.retirement_age <= cli.current_age {
        return Err("--retirement-age must be > --current-age".to_string());
    }

    if cli.life_expectancy <= cli.retirement_age {
        return Err("--life-expectancy must be > --retirement-age".to_string());
    }

    if !cli.current_savings.is_finite() || cli.current_savings < 0.0 {
        return Err("--current-savings must be >= 0".to_string());
    }

    if !cli.annual_contribution.is_finite() || cli.annual_contribution < 0.0 {
        return Err("--annual-contribution must be >= 0".to_string());
    }

    if !cli.annual_expenses.is_finite() || cli.annual_expenses <= 0.0 {
        return Err("--annual-expenses must be > 0".to_string());
    }

    if !(0.0..=1.0).contains(&cli.portfolio_stock_pct) {
        return Err("--portfolio-stock-pct must be between 0 and 1".to_string());
    }

    if !cli.expected_return_mean.is_finite() {
        return Err("--expected-return-mean must be finite".to_string());
    }

    if !cli.expected_return_stdev.is_finite() || cli.expected_return_stdev < 0.0 {
        return Err("--expected-return-stdev must be >= 0".to_string());
    }

    if !cli.inflation_rate.is_finite() {
        return Err("--inflation-rate must be finite".to_string());
    }

    if cli.simulations == 0 {
        return Err("--simulations must be > 0".to_string());
    }

    if !cli.annual_withdrawal.is_finite() || cli.annual_withdrawal <= 0.0 {
        return Err("--annual-withdrawal must be > 0".to_string());
    }

    if !cli.withdrawal_rate.is_finite()
        || cli.withdrawal_rate <= 0.0
        || cli.withdrawal_rate > 1.0
    {
        return Err("--withdrawal-rate must be between 0 and 1".to_string());
    }

    let params = ScenarioParameters {
        current_age: cli.current_age,
        retirement_age: cli.retirement_age,
        life_expectancy: cli.life_expectancy,
        current_savings: cli.current_savings,
        annual_contribution: cli.annual_contribution,
        annual_expenses: cli.annual_expenses,
        portfolio_stock_pct: cli.portfolio_stock_pct,
        expected_return_mean: cli.expected_return_mean,
        expected_return_stdev: cli.expected_return_stdev,
        inflation_rate: cli.inflation_rate,
        withdrawal_strategy: cli.withdrawal_strategy.into(),
        seed: cli.seed,
    };

    let retirement_years = match cli.retirement_years {
        Some(0) => return Err("--retirement-years must be > 0".to_string()),
        Some(years) => years,
        None => cli.life_expectancy - cli.retirement_age,
    };

    let initial_portfolio = match cli.initial_portfolio {
        Some(value) if !value.is_finite() || value < 0.0 => {
            return Err("--initial-portfolio must be >= 0".to_string());
        }
        Some(value) => value,
        None => projected_retirement_portfolio(&params),
    };

    let controls = SimulationControls {
        num_simulations: cli.simulations,
        retirement_years,
        initial_portfolio,
        annual_withdrawal: Some(cli.annual_withdrawal),
        withdrawal_rate: Some(cli.withdrawal_rate),
    };

    let start_year = cli.start_year.unwrap_or_else(|| Utc::now().year());

    Ok(ApiScenario {
        params,
        controls,
        start_year,
        inflation_adjusted: cli.inflation_adjusted,
    })
}

fn scenario_from_payload(payload: SimulatePayload) -> Result<ApiScenario, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.life_expectancy {
        cli.life_expectancy = v;
    }
    if let Some(v) = payload.current_savings {
        cli.current_savings = v;
    }
    if let Some(v) = payload.annual_contribution {
        cli.annual_contribution = v;
    }
    if let Some(v) = payload.annual_expenses {
        cli.annual_expenses = v;
    }
    if let Some(v) = payload.portfolio_stock_pct {
        cli.portfolio_stock_pct = v;
    }
    if let Some(v) = payload.expected_return_mean {
        cli.expected_return_mean = v;
    }
    if let Some(v) = payload.expected_return_stdev {
        cli.expected_return_stdev = v;
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.withdrawal_strategy.as_deref() {
        // unrecognized strategy names fall back to fixed
        cli.withdrawal_strategy = WithdrawalStrategy::parse(v).into();
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }
    if let Some(v) = payload.num_simulations {
        cli.simulations = v;
    }
    if let Some(v) = payload.retirement_years {
        cli.retirement_years = Some(v);
    }
    if let Some(v) = payload.initial_portfolio {
        cli.initial_portfolio = Some(v);
    }
    if let Some(v) = payload.annual_withdrawal {
        cli.annual_withdrawal = v;
    }
    if let Some(v) = payload.withdrawal_rate {
        cli.withdrawal_rate = v;
    }
    if let Some(v) = payload.start_year {
        cli.start_year = Some(v);
    }
    if let Some(v) = payload.inflation_adjusted {
        cli.inflation_adjusted = v;
    }

    build_scenario(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 30,
        retirement_age: 65,
        life_expectancy: 95,
        current_savings: 50_000.0,
        annual_contribution: 10_000.0,
        annual_expenses: 40_000.0,
        portfolio_stock_pct: 0.8,
        expected_return_mean: 0.07,
        expected_return_stdev: 0.15,
        inflation_rate: 0.03,
        withdrawal_strategy: CliWithdrawalStrategy::Fixed,
        seed: 42,
        simulations: 1_000,
        retirement_years: None,
        initial_portfolio: None,
        annual_withdrawal: 40_000.0,
        withdrawal_rate: 0.04,
        start_year: None,
        inflation_adjusted: true,
    }
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route(
            "/api/historical",
            get(historical_get_handler).post(historical_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "simulation API listening");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_handler_impl(payload: SimulatePayload) -> Response {
    let scenario = match scenario_from_payload(payload) {
        Ok(scenario) => scenario,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let points = project_scenario(&scenario.params, scenario.start_year);
    let series = net_worth_series(&points);
    let response = ProjectResponse {
        start_year: scenario.start_year,
        retirement_age: scenario.params.retirement_age,
        projected_retirement_portfolio: projected_retirement_portfolio(&scenario.params),
        points,
        series,
    };
    json_response(StatusCode::OK, response)
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let scenario = match scenario_from_payload(payload) {
        Ok(scenario) => scenario,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let strategy = scenario.params.withdrawal_strategy;
    let controls = scenario.controls.clone();
    let handle = spawn_monte_carlo(SimulationRequest {
        params: scenario.params,
        controls: scenario.controls,
    });
    match handle.join().await {
        Ok(batch) => {
            let finals = final_portfolios(&batch.results);
            let response = SimulateResponse {
                strategy,
                num_simulations: controls.num_simulations,
                retirement_years: controls.retirement_years,
                initial_portfolio: controls.initial_portfolio,
                success_rate: batch.success_rate,
                median_balance: batch.median_balance,
                percentile_10: batch.percentile_10,
                percentile_90: batch.percentile_90,
                histogram: histogram(&finals, HISTOGRAM_BINS),
                years_lasted_counts: years_lasted_counts(
                    &batch.results,
                    controls.retirement_years,
                ),
                results: batch.results,
            };
            json_response(StatusCode::OK, response)
        }
        Err(err) => engine_error_response(err),
    }
}

async fn historical_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    historical_handler_impl(payload).await
}

async fn historical_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    historical_handler_impl(payload).await
}

async fn historical_handler_impl(payload: SimulatePayload) -> Response {
    let scenario = match scenario_from_payload(payload) {
        Ok(scenario) => scenario,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let Some(annual_withdrawal) = scenario.controls.annual_withdrawal else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "--annual-withdrawal is required for the historical simulation",
        );
    };
    let historical = HistoricalScenario {
        initial_portfolio: scenario.controls.initial_portfolio,
        annual_withdrawal,
        portfolio_stock_pct: scenario.params.portfolio_stock_pct,
        retirement_years: scenario.controls.retirement_years,
        num_simulations: scenario.controls.num_simulations,
        inflation_adjusted: scenario.inflation_adjusted,
        seed: scenario.params.seed,
    };

    let handle = spawn_historical(historical.clone(), default_history());
    match handle.join().await {
        Ok(batch) => {
            let finals = final_portfolios(&batch.runs);
            let response = HistoricalResponse {
                num_simulations: historical.num_simulations,
                retirement_years: historical.retirement_years,
                initial_portfolio: historical.initial_portfolio,
                annual_withdrawal: historical.annual_withdrawal,
                inflation_adjusted: historical.inflation_adjusted,
                success_rate: batch.success_rate,
                median_balance: batch.median_final_portfolio,
                percentile_10: batch.percentile_10_final_portfolio,
                percentile_90: batch.percentile_90_final_portfolio,
                worst_start_year: batch.worst_start_year,
                best_start_year: batch.best_start_year,
                histogram: histogram(&finals, HISTOGRAM_BINS),
                results: batch.runs,
            };
            json_response(StatusCode::OK, response)
        }
        Err(err) => engine_error_response(err),
    }
}

fn engine_error_response(err: EngineError) -> Response {
    match &err {
        EngineError::Precondition(msg) => error_response(StatusCode::BAD_REQUEST, msg),
        EngineError::Cancelled | EngineError::TaskFailed => {
            error!(error = %err, "simulation batch failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "calculation failed")
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
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

#[cfg(test)]
fn scenario_from_json(json: &str) -> Result<ApiScenario, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    scenario_from_payload(payload)
}
