use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use scriptgraph_core::bundle::{detect_windows_bundle, load_seeds, parse_seed_lines, Bundle};
use scriptgraph_core::config::ScanConfig;
use scriptgraph_core::db::{OutputLayout, RunDb, RunStatus};
use scriptgraph_core::services::agent::{AgentEdgeSource, FileAgentSource};
use scriptgraph_core::services::graph::NodePolicy;
use scriptgraph_core::services::pipeline::{run_scan, ScanOptions, ScanReport};
use serde::Serialize;
use tracing::{info, warn};

use crate::canonicalize_or_current;

/// Inputs of one `scan` invocation.
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub folder: String,
    pub out: String,
    pub config: Option<PathBuf>,
    pub seeds: Option<PathBuf>,
    pub budget: Option<usize>,
    pub case_insensitive: bool,
    pub agent_edges: Option<PathBuf>,
    pub nodes: NodePolicy,
    pub runlog: Option<PathBuf>,
    pub json: bool,
}

/// Paths and headline numbers printed after a scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub bundle: String,
    pub graph: String,
    pub report: String,
    pub config_hash: String,
    pub touched: usize,
    pub total: usize,
    pub nodes: usize,
    pub edges: usize,
    pub unresolved: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<i64>,
}

/// Build the effective configuration: file (or defaults), then CLI overrides.
pub fn effective_config(request: &ScanRequest, root: &Path) -> Result<ScanConfig> {
    let mut config = match &request.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };
    if request.case_insensitive || detect_windows_bundle(root) {
        config = config.case_insensitive();
    }
    if let Some(budget) = request.budget {
        config.runtime.file_budget = Some(budget);
    }
    if let Some(runlog) = &request.runlog {
        config.runtime.runlog_path = Some(runlog.clone());
    }
    config.validate().context("Invalid scan configuration")?;
    Ok(config)
}

fn read_seeds(request: &ScanRequest, root: &Path) -> Result<Vec<String>> {
    match &request.seeds {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read seed file {}", path.display()))?;
            Ok(parse_seed_lines(&text))
        }
        None => Ok(load_seeds(root)),
    }
}

fn write_outputs(layout: &OutputLayout, report: &ScanReport, policy: NodePolicy, hash: &str) -> Result<()> {
    fs::create_dir_all(&layout.root)
        .with_context(|| format!("Failed to create output directory {}", layout.root.display()))?;

    let doc = report.graph.to_document(policy);
    let yaml = serde_yaml::to_string(&doc).context("Failed to serialize graph")?;
    fs::write(&layout.graph_path, yaml)
        .with_context(|| format!("Failed to write {}", layout.graph_path.display()))?;

    let run_report = report.run_report(policy, Some(hash.to_string()));
    let json = serde_json::to_string_pretty(&run_report)?;
    fs::write(&layout.report_path, json)
        .with_context(|| format!("Failed to write {}", layout.report_path.display()))?;
    Ok(())
}

/// Scan a bundle folder and write `predicted_graph.yaml` and `run_report.json`.
pub fn scan_command(request: &ScanRequest) -> Result<ScanSummary> {
    let root = canonicalize_or_current(&request.folder)?;
    if !root.is_dir() {
        return Err(anyhow!("Bundle folder does not exist: {}", root.display()));
    }
    let config = effective_config(request, &root)?;
    let hash = config.hash();
    let seeds = read_seeds(request, &root)?;

    let runlog = match &config.runtime.runlog_path {
        Some(path) => Some(
            RunDb::open(path).with_context(|| format!("Failed to open run log {}", path.display()))?,
        ),
        None => None,
    };
    let bundle_label = root.display().to_string();
    let run_id = match &runlog {
        Some(db) => Some(db.start_run("scan", &bundle_label, Some(&hash))?),
        None => None,
    };

    let result = scan_and_write(request, &root, &config, &seeds, &hash);

    if let (Some(db), Some(id)) = (&runlog, run_id) {
        match &result {
            Ok((report, _)) => {
                db.record_report(id, report)?;
                db.log_event(
                    id,
                    "info",
                    &format!(
                        "scanned {} of {} files: {} edges, {} unresolved",
                        report.coverage.touched,
                        report.coverage.total,
                        report.graph.edges.len(),
                        report.graph.unresolved.len()
                    ),
                )?;
                db.finish_run(id, RunStatus::Succeeded)?;
            }
            Err(err) => {
                db.log_event(id, "error", &format!("{err:#}"))?;
                db.finish_run(id, RunStatus::Failed)?;
            }
        }
    }

    let (report, layout) = result?;
    let summary = ScanSummary {
        bundle: bundle_label,
        graph: layout.graph_path.display().to_string(),
        report: layout.report_path.display().to_string(),
        config_hash: hash,
        touched: report.coverage.touched,
        total: report.coverage.total,
        nodes: report.graph.nodes.len(),
        edges: report.graph.edges.len(),
        unresolved: report.graph.unresolved.len(),
        skipped: report.skipped.len(),
        run_id,
    };

    if request.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Scanned bundle: {}", summary.bundle);
        println!("  Files: {} of {} scanned ({} skipped)", summary.touched, summary.total, summary.skipped);
        println!("  Nodes: {}", summary.nodes);
        println!("  Edges: {}", summary.edges);
        println!("  Unresolved: {}", summary.unresolved);
        println!("  Config hash: {}", summary.config_hash);
        println!("  Graph: {}", summary.graph);
        println!("  Report: {}", summary.report);
        if let Some(id) = summary.run_id {
            println!("  Run id: {}", id);
        }
    }
    Ok(summary)
}

fn scan_and_write(
    request: &ScanRequest,
    root: &Path,
    config: &ScanConfig,
    seeds: &[String],
    hash: &str,
) -> Result<(ScanReport, OutputLayout)> {
    let bundle = Bundle::discover(root, config, seeds)?;
    if bundle.files.is_empty() {
        warn!(root = %root.display(), "no scannable files found");
    }

    let agent = request.agent_edges.as_ref().map(|path| FileAgentSource::new(path.clone()));
    let options = ScanOptions::from(config);
    let report = run_scan(&bundle, &options, agent.as_ref().map(|a| a as &dyn AgentEdgeSource))?;

    let layout = OutputLayout::new(&request.out);
    write_outputs(&layout, &report, request.nodes, hash)?;
    info!(graph = %layout.graph_path.display(), "wrote scan outputs");
    Ok((report, layout))
}
