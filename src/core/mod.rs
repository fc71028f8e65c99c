mod engine;
mod guardrails;
mod history;
mod projection;
mod rng;
mod stats;
mod task;
mod types;

pub use engine::{
    BOND_RETURN_MEAN, BOND_RETURN_STDEV, run_monte_carlo, run_monte_carlo_with_cancel,
    validate_scenario,
};
pub use guardrails::{
    DEFAULT_GUARDRAILS, GuardrailsAdjustment, GuardrailsConfig, GuardrailsState, next_withdrawal,
};
pub use history::{
    HISTORICAL_RETURNS, HistoricalScenario, HistoricalYear, default_history, run_historical,
    run_historical_with_cancel,
};
pub use projection::{project_scenario, projected_retirement_portfolio};
pub use rng::Rng;
pub use stats::{
    HistogramBin, RunSummary, SeriesPoint, final_portfolios, histogram, net_worth_series,
    percentile, success_rate, summarize_runs, years_lasted_counts,
};
pub use task::{
    CancelToken, SimulationRequest, SimulationResponse, TaskHandle, spawn_historical,
    spawn_monte_carlo,
};
pub use types::{
    EngineError, HistoricalSimulationResult, MonteCarloResult, ProjectionPhase, ProjectionPoint,
    ScenarioParameters, SimulationControls, SimulationRun, WithdrawalStrategy,
};
