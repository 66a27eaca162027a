use std::path::Path;

use anyhow::{Context, Result};
use scriptgraph_core::db::{RunDb, RunStatus};
use scriptgraph_core::services::scoring::{score_files, ScoreOptions, ScoreResult};

/// Score a predicted graph against a truth graph and print the result as JSON.
///
/// With `runlog`, the comparison is also recorded as a `score` run under `label`.
pub fn score_command(
    pred: &Path,
    truth: &Path,
    pred_prefix: Option<String>,
    case_insensitive: bool,
    runlog: Option<&Path>,
    label: Option<&str>,
) -> Result<ScoreResult> {
    let options =
        ScoreOptions { pred_prefix: pred_prefix.unwrap_or_default(), case_sensitive: !case_insensitive };
    let result = score_files(pred, truth, &options)
        .with_context(|| format!("Failed to score {} against {}", pred.display(), truth.display()));

    if let Some(db_path) = runlog {
        let db = RunDb::open(db_path)
            .with_context(|| format!("Failed to open run log {}", db_path.display()))?;
        let bundle = pred.display().to_string();
        let id = db.start_run("score", &bundle, None)?;
        match &result {
            Ok(score) => {
                db.record_score(id, label.unwrap_or("unknown"), &bundle, score)?;
                db.finish_run(id, RunStatus::Succeeded)?;
            }
            Err(err) => {
                db.log_event(id, "error", &format!("{err:#}"))?;
                db.finish_run(id, RunStatus::Failed)?;
            }
        }
    }

    let result = result?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result)
}
