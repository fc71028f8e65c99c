use tracing::{debug, info};

use crate::core::guardrails::{self, DEFAULT_GUARDRAILS, GuardrailsConfig};
use crate::core::rng::Rng;
use crate::core::stats;
use crate::core::task::CancelToken;
use crate::core::types::{
    EngineError, MonteCarloResult, ScenarioParameters, SimulationControls, SimulationRun,
    WithdrawalStrategy,
};

pub const BOND_RETURN_MEAN: f64 = 0.03;
pub const BOND_RETURN_STDEV: f64 = 0.05;

const PROGRESS_LOG_INTERVAL: u32 = 1000;

enum WithdrawalPlan {
    Fixed {
        annual_withdrawal: f64,
        inflation_rate: f64,
    },
    Percentage {
        rate: f64,
    },
    Guardrails {
        initial_withdrawal: f64,
        config: GuardrailsConfig,
    },
}

pub fn run_monte_carlo(
    params: &ScenarioParameters,
    controls: &SimulationControls,
) -> Result<MonteCarloResult, EngineError> {
    run_monte_carlo_with_cancel(params, controls, &CancelToken::new())
}

pub fn run_monte_carlo_with_cancel(
    params: &ScenarioParameters,
    controls: &SimulationControls,
    cancel: &CancelToken,
) -> Result<MonteCarloResult, EngineError> {
    validate_scenario(params)?;
    validate_controls(controls)?;
    let plan = resolve_plan(params, controls)?;
    info!(
        trials = controls.num_simulations,
        horizon = controls.retirement_years,
        strategy = params.withdrawal_strategy.as_str(),
        "running monte carlo batch"
    );
    let mut runs = Vec::with_capacity(controls.num_simulations as usize);
    for trial in 0..controls.num_simulations {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        runs.push(run_trial(params, controls, &plan, trial));
        if (trial + 1) % PROGRESS_LOG_INTERVAL == 0 {
            debug!(completed = trial + 1, "monte carlo progress");
        }
    }
    let summary = stats::summarize_runs(&runs);
    Ok(MonteCarloResult {
        success_rate: summary.success_rate,
        median_final_portfolio: summary.median,
        percentile_10_final_portfolio: summary.percentile_10,
        percentile_90_final_portfolio: summary.percentile_90,
        runs,
    })
}

fn run_trial(
    params: &ScenarioParameters,
    controls: &SimulationControls,
    plan: &WithdrawalPlan,
    trial: u32,
) -> SimulationRun {
    let mut rng = Rng::for_trial(params.seed, trial);
    let mut portfolio = controls.initial_portfolio;
    let mut previous_withdrawal = 0.0;
    let mut returns = Vec::with_capacity(controls.retirement_years as usize);
    let mut total_withdrawn = 0.0;
    for year in 0..controls.retirement_years {
        let stock = rng.normal(params.expected_return_mean, params.expected_return_stdev);
        let bond = rng.normal(BOND_RETURN_MEAN, BOND_RETURN_STDEV);
        let blended =
            params.portfolio_stock_pct * stock + (1.0 - params.portfolio_stock_pct) * bond;
        let withdrawal = match plan {
            WithdrawalPlan::Fixed {
                annual_withdrawal,
                inflation_rate,
            } => annual_withdrawal * (1.0 + inflation_rate).powi(year as i32),
            WithdrawalPlan::Percentage { rate } => rate * portfolio,
            WithdrawalPlan::Guardrails {
                initial_withdrawal,
                config,
            } => {
                if year == 0 {
                    *initial_withdrawal
                } else {
                    guardrails::next_withdrawal(
                        portfolio,
                        previous_withdrawal,
                        *initial_withdrawal,
                        year,
                        config,
                    )
                    .withdrawal
                }
            }
        };
        previous_withdrawal = withdrawal;
        total_withdrawn += withdrawal.min(portfolio);
        portfolio = (portfolio - withdrawal) * (1.0 + blended);
        returns.push(blended);
        if portfolio <= 0.0 {
            let years_lasted = returns.len() as u32;
            return SimulationRun {
                returns,
                success: false,
                final_portfolio: 0.0,
                years_lasted,
                total_withdrawn,
                start_year: None,
            };
        }
    }
    SimulationRun {
        returns,
        success: true,
        final_portfolio: portfolio,
        years_lasted: controls.retirement_years,
        total_withdrawn,
        start_year: None,
    }
}

fn resolve_plan(
    params: &ScenarioParameters,
    controls: &SimulationControls,
) -> Result<WithdrawalPlan, EngineError> {
    match params.withdrawal_strategy {
        WithdrawalStrategy::Fixed => {
            let annual_withdrawal = required_withdrawal(controls, "fixed")?;
            Ok(WithdrawalPlan::Fixed {
                annual_withdrawal,
                inflation_rate: params.inflation_rate,
            })
        }
        WithdrawalStrategy::Percentage => {
            let rate = controls.withdrawal_rate.ok_or_else(|| {
                EngineError::precondition("withdrawal_rate is required for the percentage strategy")
            })?;
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(EngineError::precondition(
                    "withdrawal_rate must be between 0 and 1",
                ));
            }
            Ok(WithdrawalPlan::Percentage { rate })
        }
        WithdrawalStrategy::Guardrails => {
            let initial_withdrawal = required_withdrawal(controls, "guardrails")?;
            let config = GuardrailsConfig {
                initial_withdrawal_rate: initial_withdrawal / controls.initial_portfolio.max(1e-9),
                inflation_rate: params.inflation_rate,
                ..DEFAULT_GUARDRAILS
            };
            Ok(WithdrawalPlan::Guardrails {
                initial_withdrawal,
                config,
            })
        }
    }
}

fn required_withdrawal(controls: &SimulationControls, strategy: &str) -> Result<f64, EngineError> {
    let amount = controls.annual_withdrawal.ok_or_else(|| {
        EngineError::Precondition(format!(
            "annual_withdrawal is required for the {strategy} strategy"
        ))
    })?;
    if !(amount > 0.0) || !amount.is_finite() {
        return Err(EngineError::precondition("annual_withdrawal must be > 0"));
    }
    Ok(amount)
}

pub fn validate_scenario(params: &ScenarioParameters) -> Result<(), EngineError> {
    if params.retirement_age <= params.current_age {
        return Err(EngineError::precondition(
            "retirement_age must be greater than current_age",
        ));
    }
    if params.life_expectancy <= params.retirement_age {
        return Err(EngineError::precondition(
            "life_expectancy must be greater than retirement_age",
        ));
    }
    if !(params.current_savings >= 0.0) || !params.current_savings.is_finite() {
        return Err(EngineError::precondition("current_savings must be >= 0"));
    }
    if !(params.annual_contribution >= 0.0) || !params.annual_contribution.is_finite() {
        return Err(EngineError::precondition("annual_contribution must be >= 0"));
    }
    if !(params.annual_expenses > 0.0) || !params.annual_expenses.is_finite() {
        return Err(EngineError::precondition("annual_expenses must be > 0"));
    }
    if !(0.0..=1.0).contains(&params.portfolio_stock_pct) {
        return Err(EngineError::precondition(
            "portfolio_stock_pct must be between 0 and 1",
        ));
    }
    if !params.expected_return_mean.is_finite() {
        return Err(EngineError::precondition(
            "expected_return_mean must be finite",
        ));
    }
    if !(params.expected_return_stdev >= 0.0) || !params.expected_return_stdev.is_finite() {
        return Err(EngineError::precondition(
            "expected_return_stdev must be >= 0",
        ));
    }
    if !params.inflation_rate.is_finite() {
        return Err(EngineError::precondition("inflation_rate must be finite"));
    }
    Ok(())
}

fn validate_controls(controls: &SimulationControls) -> Result<(), EngineError> {
    if controls.num_simulations == 0 {
        return Err(EngineError::precondition(
            "num_simulations must be at least 1",
        ));
    }
    if controls.retirement_years == 0 {
        return Err(EngineError::precondition(
            "retirement_years must be at least 1",
        ));
    }
    if !(controls.initial_portfolio >= 0.0) || !controls.initial_portfolio.is_finite() {
        return Err(EngineError::precondition("initial_portfolio must be >= 0"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{any, prop_assert, prop_assert_eq, proptest};

    fn sample_params() -> ScenarioParameters {
        ScenarioParameters {
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
        }
    }

    fn sample_controls() -> SimulationControls {
        SimulationControls {
            num_simulations: 1000,
            retirement_years: 30,
            initial_portfolio: 1_500_000.0,
            annual_withdrawal: Some(40_000.0),
            withdrawal_rate: None,
        }
    }

    fn deterministic_params() -> ScenarioParameters {
        // all-stock portfolio with zero volatility makes every trial identical
        ScenarioParameters {
            expected_return_mean: 0.0,
            expected_return_stdev: 0.0,
            portfolio_stock_pct: 1.0,
            inflation_rate: 0.0,
            ..sample_params()
        }
    }

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn batch_yields_exactly_the_requested_number_of_runs() {
        let result = run_monte_carlo(&sample_params(), &sample_controls()).unwrap();
        assert_eq!(result.runs.len(), 1000);
    }

    #[test]
    fn same_seed_reproduces_the_whole_batch() {
        let params = sample_params();
        let controls = sample_controls();
        let first = run_monte_carlo(&params, &controls).unwrap();
        let second = run_monte_carlo(&params, &controls).unwrap();
        assert_eq!(first.success_rate, second.success_rate);
        assert_eq!(first.median_final_portfolio, second.median_final_portfolio);
        assert_eq!(
            first.percentile_10_final_portfolio,
            second.percentile_10_final_portfolio
        );
        assert_eq!(
            first.percentile_90_final_portfolio,
            second.percentile_90_final_portfolio
        );
        for (a, b) in first.runs.iter().zip(second.runs.iter()) {
            assert_eq!(a.returns, b.returns);
            assert_eq!(a.final_portfolio, b.final_portfolio);
        }
    }

    #[test]
    fn different_seeds_change_the_outcome() {
        let params = sample_params();
        let mut reseeded = sample_params();
        reseeded.seed = 43;
        let controls = sample_controls();
        let first = run_monte_carlo(&params, &controls).unwrap();
        let second = run_monte_carlo(&reseeded, &controls).unwrap();
        assert_ne!(first.runs[0].returns, second.runs[0].returns);
    }

    #[test]
    fn depletion_oracle_fixed_withdrawals_exhaust_on_schedule() {
        // 1m draining 40k/year with zero growth hits zero during year 25
        let params = deterministic_params();
        let mut controls = sample_controls();
        controls.num_simulations = 3;
        controls.initial_portfolio = 1_000_000.0;
        let result = run_monte_carlo(&params, &controls).unwrap();
        assert_eq!(result.success_rate, 0.0);
        for run in &result.runs {
            assert!(!run.success);
            assert_eq!(run.final_portfolio, 0.0);
            assert_eq!(run.years_lasted, 25);
            assert_eq!(run.returns.len(), 25);
            assert_approx(run.total_withdrawn, 1_000_000.0);
        }
    }

    #[test]
    fn survival_oracle_fixed_withdrawals_leave_the_remainder() {
        let params = deterministic_params();
        let mut controls = sample_controls();
        controls.num_simulations = 2;
        controls.initial_portfolio = 2_000_000.0;
        let result = run_monte_carlo(&params, &controls).unwrap();
        assert_eq!(result.success_rate, 1.0);
        for run in &result.runs {
            assert!(run.success);
            assert_approx(run.final_portfolio, 800_000.0);
            assert_eq!(run.years_lasted, 30);
            assert_approx(run.total_withdrawn, 1_200_000.0);
        }
    }

    #[test]
    fn fixed_withdrawals_grow_with_inflation() {
        let mut params = deterministic_params();
        params.inflation_rate = 0.03;
        let mut controls = sample_controls();
        controls.num_simulations = 1;
        controls.retirement_years = 3;
        controls.initial_portfolio = 200_000.0;
        let result = run_monte_carlo(&params, &controls).unwrap();
        // 200000 - 40000 = 160000
        // 160000 - 41200 = 118800
        // 118800 - 42436 = 76364
        assert_approx(result.runs[0].final_portfolio, 76_364.0);
        assert_approx(result.runs[0].total_withdrawn, 123_636.0);
    }

    #[test]
    fn percentage_strategy_rescales_to_the_current_portfolio() {
        let mut params = deterministic_params();
        params.withdrawal_strategy = WithdrawalStrategy::Percentage;
        let mut controls = sample_controls();
        controls.num_simulations = 1;
        controls.annual_withdrawal = None;
        controls.withdrawal_rate = Some(0.04);
        controls.initial_portfolio = 1_000_000.0;
        let result = run_monte_carlo(&params, &controls).unwrap();
        let run = &result.runs[0];
        // withdrawing 4% of whatever remains decays the pot geometrically
        assert!(run.success);
        assert_approx(run.final_portfolio, 1_000_000.0 * 0.96f64.powi(30));
        assert_approx(run.total_withdrawn, 1_000_000.0 * (1.0 - 0.96f64.powi(30)));
    }

    #[test]
    fn guardrails_cuts_extend_portfolio_life_versus_fixed() {
        let fixed_params = deterministic_params();
        let mut guard_params = deterministic_params();
        guard_params.withdrawal_strategy = WithdrawalStrategy::Guardrails;
        let mut controls = sample_controls();
        controls.num_simulations = 1;
        controls.initial_portfolio = 800_000.0;
        let fixed = run_monte_carlo(&fixed_params, &controls).unwrap();
        let guarded = run_monte_carlo(&guard_params, &controls).unwrap();
        assert_eq!(fixed.runs[0].years_lasted, 20);
        assert!(guarded.runs[0].years_lasted > fixed.runs[0].years_lasted);
        assert!(guarded.runs[0].total_withdrawn < fixed.runs[0].total_withdrawn);
    }

    #[test]
    fn guardrails_first_year_spends_the_initial_withdrawal() {
        let mut params = deterministic_params();
        params.withdrawal_strategy = WithdrawalStrategy::Guardrails;
        let mut controls = sample_controls();
        controls.num_simulations = 1;
        controls.retirement_years = 1;
        controls.initial_portfolio = 1_000_000.0;
        let result = run_monte_carlo(&params, &controls).unwrap();
        assert_approx(result.runs[0].total_withdrawn, 40_000.0);
        assert_approx(result.runs[0].final_portfolio, 960_000.0);
    }

    #[test]
    fn end_to_end_seeded_batch_is_reproducible() {
        let params = sample_params();
        let controls = SimulationControls {
            num_simulations: 1000,
            retirement_years: 30,
            initial_portfolio: crate::core::projection::projected_retirement_portfolio(&params),
            annual_withdrawal: Some(40_000.0),
            withdrawal_rate: None,
        };
        let first = run_monte_carlo(&params, &controls).unwrap();
        let second = run_monte_carlo(&params, &controls).unwrap();
        assert_eq!(first.runs.len(), 1000);
        assert_eq!(first.success_rate, second.success_rate);
        assert_eq!(first.median_final_portfolio, second.median_final_portfolio);
        assert!(first.success_rate > 0.0 && first.success_rate <= 1.0);
    }

    #[test]
    fn rejects_incoherent_ages() {
        let mut params = sample_params();
        params.retirement_age = 30;
        let err = run_monte_carlo(&params, &sample_controls()).unwrap_err();
        assert!(matches!(err, EngineError::Precondition(_)));
        assert!(err.to_string().contains("retirement_age"));

        let mut params = sample_params();
        params.life_expectancy = 60;
        let err = run_monte_carlo(&params, &sample_controls()).unwrap_err();
        assert!(err.to_string().contains("life_expectancy"));
    }

    #[test]
    fn rejects_bad_scalar_inputs() {
        let cases: Vec<(ScenarioParameters, &str)> = vec![
            (
                ScenarioParameters {
                    current_savings: -1.0,
                    ..sample_params()
                },
                "current_savings",
            ),
            (
                ScenarioParameters {
                    annual_expenses: 0.0,
                    ..sample_params()
                },
                "annual_expenses",
            ),
            (
                ScenarioParameters {
                    portfolio_stock_pct: 1.5,
                    ..sample_params()
                },
                "portfolio_stock_pct",
            ),
            (
                ScenarioParameters {
                    expected_return_stdev: -0.1,
                    ..sample_params()
                },
                "expected_return_stdev",
            ),
            (
                ScenarioParameters {
                    expected_return_mean: f64::NAN,
                    ..sample_params()
                },
                "expected_return_mean",
            ),
        ];
        for (params, needle) in cases {
            let err = run_monte_carlo(&params, &sample_controls()).unwrap_err();
            assert!(
                err.to_string().contains(needle),
                "expected error naming {needle}, got: {err}"
            );
        }
    }

    #[test]
    fn rejects_bad_controls() {
        let mut controls = sample_controls();
        controls.num_simulations = 0;
        let err = run_monte_carlo(&sample_params(), &controls).unwrap_err();
        assert!(err.to_string().contains("num_simulations"));

        let mut controls = sample_controls();
        controls.retirement_years = 0;
        let err = run_monte_carlo(&sample_params(), &controls).unwrap_err();
        assert!(err.to_string().contains("retirement_years"));
    }

    #[test]
    fn rejects_missing_strategy_parameters() {
        let mut controls = sample_controls();
        controls.annual_withdrawal = None;
        let err = run_monte_carlo(&sample_params(), &controls).unwrap_err();
        assert!(err.to_string().contains("annual_withdrawal"));

        let mut params = sample_params();
        params.withdrawal_strategy = WithdrawalStrategy::Percentage;
        let mut controls = sample_controls();
        controls.withdrawal_rate = None;
        let err = run_monte_carlo(&params, &controls).unwrap_err();
        assert!(err.to_string().contains("withdrawal_rate"));

        let mut controls = sample_controls();
        controls.withdrawal_rate = Some(1.5);
        params.withdrawal_strategy = WithdrawalStrategy::Percentage;
        let err = run_monte_carlo(&params, &controls).unwrap_err();
        assert!(err.to_string().contains("withdrawal_rate"));
    }

    #[test]
    fn cancelled_token_stops_the_batch_before_any_result() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err =
            run_monte_carlo_with_cancel(&sample_params(), &sample_controls(), &cancel).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(40))]

        #[test]
        fn prop_run_count_matches_request(n in 1u32..200) {
            let mut controls = sample_controls();
            controls.num_simulations = n;
            let result = run_monte_carlo(&sample_params(), &controls).unwrap();
            prop_assert_eq!(result.runs.len(), n as usize);
        }

        #[test]
        fn prop_failed_runs_end_at_zero_and_never_exceed_horizon(
            seed in any::<u64>(),
            initial in 100_000.0f64..2_000_000.0,
        ) {
            let mut params = sample_params();
            params.seed = seed;
            let mut controls = sample_controls();
            controls.num_simulations = 50;
            controls.initial_portfolio = initial;
            let result = run_monte_carlo(&params, &controls).unwrap();
            for run in &result.runs {
                prop_assert!(run.returns.len() as u32 <= controls.retirement_years);
                prop_assert_eq!(run.years_lasted as usize, run.returns.len());
                if run.success {
                    prop_assert!(run.final_portfolio > 0.0);
                    prop_assert_eq!(run.years_lasted, controls.retirement_years);
                } else {
                    prop_assert_eq!(run.final_portfolio, 0.0);
                }
            }
        }
    }
}
