use tracing::info;

use crate::core::rng::Rng;
use crate::core::stats;
use crate::core::task::CancelToken;
use crate::core::types::{EngineError, HistoricalSimulationResult, SimulationRun};

#[derive(Debug, Clone, Copy)]
pub struct HistoricalYear {
    pub year: u32,
    pub stock_return: f64,
    pub bond_return: f64,
    pub inflation: f64,
}

const fn rec(year: u32, stock_return: f64, bond_return: f64, inflation: f64) -> HistoricalYear {
    HistoricalYear {
        year,
        stock_return,
        bond_return,
        inflation,
    }
}

// US large-cap total returns, 10-year treasury total returns, and CPI,
// 1926 through 2023.
pub const HISTORICAL_RETURNS: [HistoricalYear; 98] = [
    rec(1926, 0.1162, 0.0777, -0.0112),
    rec(1927, 0.3749, 0.0893, -0.0226),
    rec(1928, 0.4361, 0.0010, -0.0116),
    rec(1929, -0.0842, 0.0342, 0.0058),
    rec(1930, -0.2490, 0.0466, -0.0640),
    rec(1931, -0.4334, -0.0531, -0.0932),
    rec(1932, -0.0819, 0.1684, -0.1027),
    rec(1933, 0.5399, -0.0007, 0.0076),
    rec(1934, -0.0144, 0.1003, 0.0152),
    rec(1935, 0.4767, 0.0498, 0.0299),
    rec(1936, 0.3392, 0.0752, 0.0145),
    rec(1937, -0.3503, 0.0023, 0.0286),
    rec(1938, 0.3112, 0.0553, -0.0278),
    rec(1939, -0.0041, 0.0594, 0.0000),
    rec(1940, -0.0978, 0.0609, 0.0071),
    rec(1941, -0.1159, 0.0093, 0.0993),
    rec(1942, 0.2034, 0.0322, 0.0903),
    rec(1943, 0.2590, 0.0208, 0.0296),
    rec(1944, 0.1975, 0.0281, 0.0230),
    rec(1945, 0.3644, 0.1073, 0.0225),
    rec(1946, -0.0807, -0.0010, 0.1816),
    rec(1947, 0.0571, -0.0262, 0.0884),
    rec(1948, 0.0550, 0.0340, 0.0299),
    rec(1949, 0.1879, 0.0645, -0.0207),
    rec(1950, 0.3171, 0.0006, 0.0593),
    rec(1951, 0.2402, -0.0393, 0.0600),
    rec(1952, 0.1837, 0.0116, 0.0075),
    rec(1953, -0.0099, 0.0364, 0.0075),
    rec(1954, 0.5262, 0.0719, -0.0074),
    rec(1955, 0.3156, -0.0129, 0.0037),
    rec(1956, 0.0656, -0.0559, 0.0299),
    rec(1957, -0.1078, 0.0746, 0.0290),
    rec(1958, 0.4336, -0.0609, 0.0176),
    rec(1959, 0.1196, -0.0226, 0.0173),
    rec(1960, 0.0047, 0.1164, 0.0136),
    rec(1961, 0.2689, 0.0206, 0.0067),
    rec(1962, -0.0873, 0.0569, 0.0133),
    rec(1963, 0.2280, 0.0168, 0.0164),
    rec(1964, 0.1648, 0.0373, 0.0097),
    rec(1965, 0.1245, 0.0072, 0.0192),
    rec(1966, -0.1006, 0.0291, 0.0346),
    rec(1967, 0.2398, -0.0158, 0.0304),
    rec(1968, 0.1106, 0.0327, 0.0472),
    rec(1969, -0.0850, -0.0501, 0.0620),
    rec(1970, 0.0401, 0.1675, 0.0557),
    rec(1971, 0.1431, 0.0979, 0.0327),
    rec(1972, 0.1898, 0.0282, 0.0341),
    rec(1973, -0.1466, 0.0366, 0.0871),
    rec(1974, -0.2647, 0.0199, 0.1234),
    rec(1975, 0.3720, 0.0361, 0.0694),
    rec(1976, 0.2384, 0.1598, 0.0486),
    rec(1977, -0.0718, 0.0129, 0.0670),
    rec(1978, 0.0656, -0.0078, 0.0902),
    rec(1979, 0.1844, 0.0067, 0.1329),
    rec(1980, 0.3242, -0.0299, 0.1252),
    rec(1981, -0.0491, 0.0820, 0.0892),
    rec(1982, 0.2155, 0.3281, 0.0383),
    rec(1983, 0.2256, 0.0320, 0.0379),
    rec(1984, 0.0627, 0.1373, 0.0395),
    rec(1985, 0.3173, 0.2571, 0.0380),
    rec(1986, 0.1867, 0.2428, 0.0110),
    rec(1987, 0.0525, -0.0496, 0.0443),
    rec(1988, 0.1661, 0.0822, 0.0442),
    rec(1989, 0.3169, 0.1769, 0.0465),
    rec(1990, -0.0310, 0.0624, 0.0611),
    rec(1991, 0.3047, 0.1500, 0.0306),
    rec(1992, 0.0762, 0.0936, 0.0290),
    rec(1993, 0.1008, 0.1421, 0.0275),
    rec(1994, 0.0132, -0.0804, 0.0267),
    rec(1995, 0.3758, 0.2348, 0.0254),
    rec(1996, 0.2296, 0.0143, 0.0332),
    rec(1997, 0.3336, 0.0994, 0.0170),
    rec(1998, 0.2858, 0.1492, 0.0161),
    rec(1999, 0.2104, -0.0825, 0.0268),
    rec(2000, -0.0910, 0.1666, 0.0339),
    rec(2001, -0.1189, 0.0557, 0.0155),
    rec(2002, -0.2210, 0.1512, 0.0238),
    rec(2003, 0.2868, 0.0038, 0.0188),
    rec(2004, 0.1088, 0.0449, 0.0326),
    rec(2005, 0.0491, 0.0287, 0.0342),
    rec(2006, 0.1579, 0.0196, 0.0254),
    rec(2007, 0.0549, 0.1021, 0.0408),
    rec(2008, -0.3700, 0.2010, 0.0009),
    rec(2009, 0.2646, -0.1112, 0.0272),
    rec(2010, 0.1506, 0.0846, 0.0150),
    rec(2011, 0.0211, 0.1604, 0.0296),
    rec(2012, 0.1600, 0.0297, 0.0174),
    rec(2013, 0.3239, -0.0910, 0.0150),
    rec(2014, 0.1369, 0.1075, 0.0076),
    rec(2015, 0.0138, 0.0128, 0.0073),
    rec(2016, 0.1196, 0.0069, 0.0207),
    rec(2017, 0.2183, 0.0280, 0.0211),
    rec(2018, -0.0438, -0.0002, 0.0191),
    rec(2019, 0.3149, 0.0964, 0.0229),
    rec(2020, 0.1840, 0.1133, 0.0136),
    rec(2021, 0.2871, -0.0442, 0.0704),
    rec(2022, -0.1811, -0.1783, 0.0645),
    rec(2023, 0.2629, 0.0388, 0.0335),
];

pub fn default_history() -> &'static [HistoricalYear] {
    &HISTORICAL_RETURNS
}

#[derive(Debug, Clone)]
pub struct HistoricalScenario {
    pub initial_portfolio: f64,
    pub annual_withdrawal: f64,
    pub portfolio_stock_pct: f64,
    pub retirement_years: u32,
    pub num_simulations: u32,
    pub inflation_adjusted: bool,
    pub seed: u64,
}

pub fn run_historical(
    scenario: &HistoricalScenario,
    table: &[HistoricalYear],
) -> Result<HistoricalSimulationResult, EngineError> {
    run_historical_with_cancel(scenario, table, &CancelToken::new())
}

pub fn run_historical_with_cancel(
    scenario: &HistoricalScenario,
    table: &[HistoricalYear],
    cancel: &CancelToken,
) -> Result<HistoricalSimulationResult, EngineError> {
    validate(scenario, table)?;
    info!(
        trials = scenario.num_simulations,
        horizon = scenario.retirement_years,
        table_years = table.len(),
        "running historical bootstrap batch"
    );
    let start_count = table.len() - scenario.retirement_years as usize + 1;
    let mut runs = Vec::with_capacity(scenario.num_simulations as usize);
    for trial in 0..scenario.num_simulations {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let mut rng = Rng::for_trial(scenario.seed, trial);
        let start = rng.index(start_count);
        runs.push(run_window(scenario, table, start));
    }

    let mut worst_start = table[0].year;
    let mut best_start = table[0].year;
    let mut worst_final = f64::INFINITY;
    let mut best_final = f64::NEG_INFINITY;
    for run in &runs {
        if let Some(year) = run.start_year {
            if run.final_portfolio < worst_final {
                worst_final = run.final_portfolio;
                worst_start = year;
            }
            if run.final_portfolio > best_final {
                best_final = run.final_portfolio;
                best_start = year;
            }
        }
    }

    let summary = stats::summarize_runs(&runs);
    Ok(HistoricalSimulationResult {
        success_rate: summary.success_rate,
        median_final_portfolio: summary.median,
        percentile_10_final_portfolio: summary.percentile_10,
        percentile_90_final_portfolio: summary.percentile_90,
        worst_start_year: worst_start,
        best_start_year: best_start,
        runs,
    })
}

fn run_window(
    scenario: &HistoricalScenario,
    table: &[HistoricalYear],
    start: usize,
) -> SimulationRun {
    let horizon = scenario.retirement_years;
    let start_year = Some(table[start].year);
    let mut portfolio = scenario.initial_portfolio;
    let mut withdrawal = scenario.annual_withdrawal;
    let mut returns = Vec::with_capacity(horizon as usize);
    let mut total_withdrawn = 0.0;
    for offset in 0..horizon as usize {
        let record = &table[start + offset];
        let blended = scenario.portfolio_stock_pct * record.stock_return
            + (1.0 - scenario.portfolio_stock_pct) * record.bond_return;
        if offset > 0 && scenario.inflation_adjusted {
            // spending tracks the previous year's realized inflation
            withdrawal *= 1.0 + table[start + offset - 1].inflation;
        }
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
                start_year,
            };
        }
    }
    SimulationRun {
        returns,
        success: true,
        final_portfolio: portfolio,
        years_lasted: horizon,
        total_withdrawn,
        start_year,
    }
}

fn validate(scenario: &HistoricalScenario, table: &[HistoricalYear]) -> Result<(), EngineError> {
    if scenario.num_simulations == 0 {
        return Err(EngineError::precondition(
            "num_simulations must be at least 1",
        ));
    }
    if scenario.retirement_years == 0 {
        return Err(EngineError::precondition(
            "retirement_years must be at least 1",
        ));
    }
    if !(scenario.initial_portfolio >= 0.0) || !scenario.initial_portfolio.is_finite() {
        return Err(EngineError::precondition("initial_portfolio must be >= 0"));
    }
    if !(scenario.annual_withdrawal > 0.0) || !scenario.annual_withdrawal.is_finite() {
        return Err(EngineError::precondition("annual_withdrawal must be > 0"));
    }
    if !(0.0..=1.0).contains(&scenario.portfolio_stock_pct) {
        return Err(EngineError::precondition(
            "portfolio_stock_pct must be between 0 and 1",
        ));
    }
    if (table.len() as u32) < scenario.retirement_years {
        return Err(EngineError::Precondition(format!(
            "historical table covers {} years but the requested horizon is {}",
            table.len(),
            scenario.retirement_years
        )));
    }
    Ok(())
}
