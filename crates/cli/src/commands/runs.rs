use std::path::Path;

use anyhow::{Context, Result};
use scriptgraph_core::db::{RunDb, RunRecord};

/// List runs recorded in a run log, optionally only those of one command.
pub fn list_runs_command(db_path: &Path, command: Option<&str>, json: bool) -> Result<Vec<RunRecord>> {
    let db = RunDb::open(db_path).with_context(|| format!("Failed to open run log {}", db_path.display()))?;
    let runs = db.list_runs(command).context("Failed to list runs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(runs);
    }

    println!("Runs:");
    if runs.is_empty() {
        println!("(none)");
        return Ok(runs);
    }
    for run in &runs {
        let finished = run.finished_at.as_deref().unwrap_or("(running)");
        let hash = run.config_hash.as_deref().unwrap_or("-");
        println!(
            "- #{} {} [{}] {} (started: {}, finished: {}, config: {})",
            run.id,
            run.command,
            run.status.as_str(),
            run.bundle,
            run.started_at,
            finished,
            hash
        );
    }
    Ok(runs)
}
