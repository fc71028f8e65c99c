use serde::Serialize;

use crate::core::types::{ProjectionPoint, SimulationRun};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBin {
    pub bin_start: f64,
    pub bin_end: f64,
    pub count: usize,
    pub is_success: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub year: i32,
    pub value: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub success_rate: f64,
    pub median: f64,
    pub percentile_10: f64,
    pub percentile_90: f64,
}

pub fn summarize_runs(runs: &[SimulationRun]) -> RunSummary {
    let mut finals = final_portfolios(runs);
    RunSummary {
        success_rate: success_rate(runs),
        median: percentile(&mut finals, 50.0),
        percentile_10: percentile(&mut finals, 10.0),
        percentile_90: percentile(&mut finals, 90.0),
    }
}

pub fn success_rate(runs: &[SimulationRun]) -> f64 {
    if runs.is_empty() {
        return 0.0;
    }
    let successes = runs.iter().filter(|run| run.success).count();
    successes as f64 / runs.len() as f64
}

pub fn final_portfolios(runs: &[SimulationRun]) -> Vec<f64> {
    runs.iter().map(|run| run.final_portfolio).collect()
}

// Nearest-rank: sort ascending, index at floor(pct/100 * n). Deliberately
// not interpolated, so p100 clamps to the last element.
pub fn percentile(values: &mut [f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let index = ((pct / 100.0) * values.len() as f64).floor() as usize;
    values[index.min(values.len() - 1)]
}

pub fn histogram(values: &[f64], bin_count: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bin_count == 0 {
        return Vec::new();
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &value in values {
        min = min.min(value);
        max = max.max(value);
    }
    if max <= min {
        return vec![HistogramBin {
            bin_start: min,
            bin_end: max,
            count: values.len(),
            is_success: max > 0.0,
        }];
    }
    let width = (max - min) / bin_count as f64;
    let mut counts = vec![0usize; bin_count];
    for &value in values {
        let index = (((value - min) / width) as usize).min(bin_count - 1);
        counts[index] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let bin_end = min + (i + 1) as f64 * width;
            HistogramBin {
                bin_start: min + i as f64 * width,
                bin_end,
                count,
                is_success: bin_end > 0.0,
            }
        })
        .collect()
}

pub fn net_worth_series(points: &[ProjectionPoint]) -> Vec<SeriesPoint> {
    points
        .iter()
        .map(|point| SeriesPoint {
            year: point.year,
            value: point.net_worth,
        })
        .collect()
}

pub fn years_lasted_counts(runs: &[SimulationRun], horizon: u32) -> Vec<usize> {
    let mut counts = vec![0usize; horizon as usize + 1];
    for run in runs {
        let years = run.years_lasted.min(horizon) as usize;
        counts[years] += 1;
    }
    counts
}
