use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::core::engine;
use crate::core::history::{self, HistoricalScenario, HistoricalYear};
use crate::core::types::{
    EngineError, HistoricalSimulationResult, MonteCarloResult, ScenarioParameters,
    SimulationControls, SimulationRun,
};

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct SimulationRequest {
    pub params: ScenarioParameters,
    pub controls: SimulationControls,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResponse {
    pub success_rate: f64,
    pub median_balance: f64,
    pub percentile_10: f64,
    pub percentile_90: f64,
    pub results: Vec<SimulationRun>,
}

impl From<MonteCarloResult> for SimulationResponse {
    fn from(result: MonteCarloResult) -> Self {
        SimulationResponse {
            success_rate: result.success_rate,
            median_balance: result.median_final_portfolio,
            percentile_10: result.percentile_10_final_portfolio,
            percentile_90: result.percentile_90_final_portfolio,
            results: result.runs,
        }
    }
}

pub struct TaskHandle<T> {
    join: JoinHandle<Result<T, EngineError>>,
    cancel: CancelToken,
}

impl<T> TaskHandle<T> {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) -> Result<T, EngineError> {
        match self.join.await {
            Ok(result) => result,
            Err(join_error) => {
                if join_error.is_cancelled() {
                    Err(EngineError::Cancelled)
                } else {
                    warn!(error = %join_error, "simulation worker aborted");
                    Err(EngineError::TaskFailed)
                }
            }
        }
    }
}

pub fn spawn_monte_carlo(request: SimulationRequest) -> TaskHandle<SimulationResponse> {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let join = tokio::task::spawn_blocking(move || {
        let result =
            engine::run_monte_carlo_with_cancel(&request.params, &request.controls, &token)?;
        Ok(SimulationResponse::from(result))
    });
    TaskHandle { join, cancel }
}

pub fn spawn_historical(
    scenario: HistoricalScenario,
    table: &'static [HistoricalYear],
) -> TaskHandle<HistoricalSimulationResult> {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let join = tokio::task::spawn_blocking(move || {
        history::run_historical_with_cancel(&scenario, table, &token)
    });
    TaskHandle { join, cancel }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::default_history;
    use crate::core::types::WithdrawalStrategy;

    fn sample_request(num_simulations: u32) -> SimulationRequest {
        SimulationRequest {
            params: ScenarioParameters {
                current_age: 35,
                retirement_age: 65,
                life_expectancy: 95,
                current_savings: 100_000.0,
                annual_contribution: 20_000.0,
                annual_expenses: 40_000.0,
                portfolio_stock_pct: 0.8,
                expected_return_mean: 0.05,
                expected_return_stdev: 0.12,
                inflation_rate: 0.03,
                withdrawal_strategy: WithdrawalStrategy::Fixed,
                seed: 42,
            },
            controls: SimulationControls {
                num_simulations,
                retirement_years: 30,
                initial_portfolio: 1_200_000.0,
                annual_withdrawal: Some(40_000.0),
                withdrawal_rate: None,
            },
        }
    }

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn spawned_batch_delivers_the_full_aggregate() {
        let handle = spawn_monte_carlo(sample_request(200));
        let response = handle.join().await.unwrap();
        assert_eq!(response.results.len(), 200);
        assert!((0.0..=1.0).contains(&response.success_rate));
        assert!(response.percentile_10 <= response.median_balance);
        assert!(response.median_balance <= response.percentile_90);
    }

    #[tokio::test]
    async fn spawned_batch_matches_the_synchronous_engine() {
        let request = sample_request(300);
        let direct = engine::run_monte_carlo(&request.params, &request.controls).unwrap();
        let response = spawn_monte_carlo(request).join().await.unwrap();
        assert_eq!(response.success_rate, direct.success_rate);
        assert_eq!(response.median_balance, direct.median_final_portfolio);
        assert_eq!(response.percentile_10, direct.percentile_10_final_portfolio);
        assert_eq!(response.percentile_90, direct.percentile_90_final_portfolio);
    }

    #[tokio::test]
    async fn cancelling_the_handle_yields_no_partial_result() {
        let handle = spawn_monte_carlo(sample_request(500_000));
        handle.cancel();
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[tokio::test]
    async fn invalid_request_surfaces_the_precondition() {
        let mut request = sample_request(100);
        request.params.retirement_age = 20;
        let err = spawn_monte_carlo(request).join().await.unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
    }

    #[tokio::test]
    async fn panicked_worker_surfaces_as_task_failure() {
        let handle: TaskHandle<SimulationResponse> = TaskHandle {
            join: tokio::task::spawn_blocking(|| panic!("worker died")),
            cancel: CancelToken::new(),
        };
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, EngineError::TaskFailed));
    }

    #[tokio::test]
    async fn spawned_historical_batch_delivers_start_years() {
        let scenario = HistoricalScenario {
            initial_portfolio: 1_000_000.0,
            annual_withdrawal: 40_000.0,
            portfolio_stock_pct: 0.75,
            retirement_years: 30,
            num_simulations: 200,
            inflation_adjusted: true,
            seed: 42,
        };
        let handle = spawn_historical(scenario, default_history());
        let result = handle.join().await.unwrap();
        assert_eq!(result.runs.len(), 200);
        assert!((1926..=1994).contains(&result.worst_start_year));
        assert!((1926..=1994).contains(&result.best_start_year));
    }

    #[tokio::test]
    async fn cancelled_historical_batch_is_dropped() {
        let scenario = HistoricalScenario {
            initial_portfolio: 1_000_000.0,
            annual_withdrawal: 40_000.0,
            portfolio_stock_pct: 0.75,
            retirement_years: 60,
            num_simulations: 2_000_000,
            inflation_adjusted: true,
            seed: 1,
        };
        let handle = spawn_historical(scenario, default_history());
        handle.cancel();
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }
}
