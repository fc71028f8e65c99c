use serde::Serialize;
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStrategy {
    Fixed,
    Percentage,
    Guardrails,
}

impl WithdrawalStrategy {
    pub fn parse(value: &str) -> Self {
        match value {
            "percentage" => WithdrawalStrategy::Percentage,
            "guardrails" => WithdrawalStrategy::Guardrails,
            _ => WithdrawalStrategy::Fixed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalStrategy::Fixed => "fixed",
            WithdrawalStrategy::Percentage => "percentage",
            WithdrawalStrategy::Guardrails => "guardrails",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioParameters {
    pub current_age: u32,
    pub retirement_age: u32,
    pub life_expectancy: u32,
    pub current_savings: f64,
    pub annual_contribution: f64,
    pub annual_expenses: f64,
    pub portfolio_stock_pct: f64,
    pub expected_return_mean: f64,
    pub expected_return_stdev: f64,
    pub inflation_rate: f64,
    pub withdrawal_strategy: WithdrawalStrategy,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct SimulationControls {
    pub num_simulations: u32,
    pub retirement_years: u32,
    pub initial_portfolio: f64,
    pub annual_withdrawal: Option<f64>,
    pub withdrawal_rate: Option<f64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionPhase {
    Accumulation,
    Retirement,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionPoint {
    pub age: u32,
    pub year: i32,
    pub net_worth: f64,
    pub phase: ProjectionPhase,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRun {
    pub returns: Vec<f64>,
    pub success: bool,
    pub final_portfolio: f64,
    pub years_lasted: u32,
    pub total_withdrawn: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_year: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloResult {
    pub success_rate: f64,
    pub median_final_portfolio: f64,
    pub percentile_10_final_portfolio: f64,
    pub percentile_90_final_portfolio: f64,
    pub runs: Vec<SimulationRun>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalSimulationResult {
    pub success_rate: f64,
    pub median_final_portfolio: f64,
    pub percentile_10_final_portfolio: f64,
    pub percentile_90_final_portfolio: f64,
    pub worst_start_year: u32,
    pub best_start_year: u32,
    pub runs: Vec<SimulationRun>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("precondition violated: {0}")]
    Precondition(String),
    #[error("simulation was cancelled before it completed")]
    Cancelled,
    #[error("background simulation task failed")]
    TaskFailed,
}

impl EngineError {
    pub fn precondition(reason: impl Into<String>) -> Self {
        EngineError::Precondition(reason.into())
    }
}
