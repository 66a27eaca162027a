use std::path::Path;

use anyhow::{Context, Result};
use scriptgraph_core::db::{CommandDurations, RunDb};
use scriptgraph_core::services::scoring::load_document;
use scriptgraph_core::services::stats::{graph_stats, GraphStats};

/// Summarize a serialized graph (`predicted_graph.yaml` or a truth file).
pub fn stats_graph_command(path: &Path, json: bool) -> Result<GraphStats> {
    let doc = load_document(path).with_context(|| format!("Failed to load graph {}", path.display()))?;
    let stats = graph_stats(&doc);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(stats);
    }

    println!("Graph: {}", path.display());
    println!("  Nodes: {}", stats.nodes);
    println!("  Edges: {} (static {}, agent {})", stats.edges, stats.static_edges, stats.agent_edges);
    for (kind, count) in &stats.edges_by_kind {
        println!("    {kind}: {count}");
    }
    println!("  Unresolved: {}", stats.unresolved);
    for (reason, count) in &stats.unresolved_by_reason {
        println!("    {reason}: {count}");
    }
    if !stats.top_callers.is_empty() {
        println!("  Top callers:");
        for d in &stats.top_callers {
            println!("    {} ({})", d.path, d.count);
        }
    }
    if !stats.top_callees.is_empty() {
        println!("  Top callees:");
        for d in &stats.top_callees {
            println!("    {} ({})", d.path, d.count);
        }
    }
    Ok(stats)
}

/// Per-command duration summary over finished runs in a run log.
pub fn stats_runs_command(db_path: &Path, json: bool) -> Result<Vec<CommandDurations>> {
    let db = RunDb::open(db_path).with_context(|| format!("Failed to open run log {}", db_path.display()))?;
    let durations = db.run_durations().context("Failed to summarize run durations")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&durations)?);
        return Ok(durations);
    }

    println!("Run durations:");
    if durations.is_empty() {
        println!("(none)");
        return Ok(durations);
    }
    for d in &durations {
        println!(
            "- {} (runs: {}, mean: {:.3}s, p50: {:.3}s, p95: {:.3}s)",
            d.command, d.count, d.mean_secs, d.p50_secs, d.p95_secs
        );
    }
    Ok(durations)
}
