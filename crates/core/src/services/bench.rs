//! Aggregation of many score results with percentile bootstrap confidence
//! intervals.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::services::scoring::ScoreResult;

/// One scored bundle, as written one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchRow {
    #[serde(alias = "role", default = "default_label")]
    pub label: String,
    #[serde(default)]
    pub bundle: String,
    pub score: ScoreResult,
}

fn default_label() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchOptions {
    pub resamples: usize,
    pub seed: u64,
    /// Two-sided; 0.05 gives a 95% interval.
    pub alpha: f64,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self { resamples: 10_000, seed: 0, alpha: 0.05 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSummary {
    pub label: String,
    pub n: usize,
    pub f1_nodes: MetricSummary,
    pub f1_edges: MetricSummary,
    pub gcr: MetricSummary,
}

/// Parse JSON lines, skipping blanks and anything that is not a row.
///
/// Log noise before the first `{` on a line is tolerated.
pub fn parse_rows(text: &str) -> Vec<BenchRow> {
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let Some(start) = line.find('{') else {
            continue;
        };
        match serde_json::from_str::<BenchRow>(&line[start..]) {
            Ok(row) => rows.push(row),
            Err(err) => debug!(line = idx + 1, error = %err, "skipping non-row line"),
        }
    }
    rows
}

/// Per-label means with bootstrap intervals, sorted by label.
///
/// Each metric uses its own generator seeded from `options.seed`, so adding a
/// label never shifts another label's intervals.
pub fn aggregate(rows: &[BenchRow], options: &BenchOptions) -> Vec<LabelSummary> {
    let mut by_label: BTreeMap<&str, Vec<&ScoreResult>> = BTreeMap::new();
    for row in rows {
        by_label.entry(row.label.as_str()).or_default().push(&row.score);
    }
    by_label
        .into_iter()
        .map(|(label, scores)| {
            let metric = |f: fn(&ScoreResult) -> f64| {
                let values: Vec<f64> = scores.iter().map(|s| f(s)).collect();
                bootstrap_mean(&values, options)
            };
            LabelSummary {
                label: label.to_string(),
                n: scores.len(),
                f1_nodes: metric(|s| s.f1_nodes),
                f1_edges: metric(|s| s.f1_edges),
                gcr: metric(|s| s.gcr),
            }
        })
        .collect()
}

/// Mean of `values` with a percentile bootstrap interval.
pub fn bootstrap_mean(values: &[f64], options: &BenchOptions) -> MetricSummary {
    if values.is_empty() {
        return MetricSummary { mean: 0.0, ci_low: 0.0, ci_high: 0.0 };
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if values.len() == 1 || options.resamples == 0 {
        return MetricSummary { mean, ci_low: mean, ci_high: mean };
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let n = values.len();
    let mut means: Vec<f64> = (0..options.resamples)
        .map(|_| (0..n).map(|_| values[rng.gen_range(0..n)]).sum::<f64>() / n as f64)
        .collect();
    means.sort_by(|a, b| a.total_cmp(b));

    MetricSummary {
        mean,
        ci_low: percentile(&means, options.alpha / 2.0),
        ci_high: percentile(&means, 1.0 - options.alpha / 2.0),
    }
}

/// Linear-interpolated quantile of sorted data.
pub(crate) fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}
