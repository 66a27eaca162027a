use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use scriptgraph_core::services::bench::{aggregate, parse_rows, BenchOptions, LabelSummary, MetricSummary};

fn fmt_metric(m: &MetricSummary) -> String {
    format!("{:.3} [{:.3}, {:.3}]", m.mean, m.ci_low, m.ci_high)
}

/// Aggregate a JSONL file of score rows per label with bootstrap intervals.
pub fn bench_command(path: &Path, options: &BenchOptions, json: bool) -> Result<Vec<LabelSummary>> {
    if options.resamples == 0 {
        bail!("--resamples must be at least 1");
    }
    if !(options.alpha > 0.0 && options.alpha < 1.0) {
        bail!("--alpha must be between 0 and 1 (got {})", options.alpha);
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read bench rows {}", path.display()))?;
    let rows = parse_rows(&text);
    let summaries = aggregate(&rows, options);

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(summaries);
    }

    println!("Bench ({} rows, {} resamples, alpha {}):", rows.len(), options.resamples, options.alpha);
    if summaries.is_empty() {
        println!("(none)");
        return Ok(summaries);
    }
    for s in &summaries {
        println!(
            "- {} (n={}): f1_nodes {}, f1_edges {}, gcr {}",
            s.label,
            s.n,
            fmt_metric(&s.f1_nodes),
            fmt_metric(&s.f1_edges),
            fmt_metric(&s.gcr)
        );
    }
    Ok(summaries)
}
