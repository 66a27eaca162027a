//! Scan pipeline: bundle in, graph and diagnostics out.
//!
//! Files are scanned and resolved in parallel (each with its own symbol
//! table, sharing only the read-only file index). Results are collected in
//! file order and folded into one [`GraphBuilder`] on the calling thread, so
//! the output does not depend on scheduling.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bundle::{Bundle, FileIndex};
use crate::config::ScanConfig;
use crate::model::{Edge, ScriptFile, SkippedFile, UnresolvedStub};
use crate::services::agent::{AgentEdgeSource, AgentError};
use crate::services::graph::{Graph, GraphBuilder, NodePolicy, StubRecord};
use crate::services::resolver::{resolve, Resolution, ResolveOptions};
use crate::services::scanners::analyze;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Agent edge source '{name}' failed: {source}")]
    Agent {
        name: &'static str,
        #[source]
        source: AgentError,
    },
}

/// Knobs for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub resolve: ResolveOptions,
    pub case_sensitive_nodes: bool,
    /// Worker threads; `None` uses the global rayon pool.
    pub threads: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { resolve: ResolveOptions::default(), case_sensitive_nodes: true, threads: None }
    }
}

impl From<&ScanConfig> for ScanOptions {
    fn from(cfg: &ScanConfig) -> Self {
        Self {
            resolve: ResolveOptions::from(&cfg.resolution),
            case_sensitive_nodes: cfg.resolution.case_sensitive_nodes,
            threads: cfg.runtime.threads,
        }
    }
}

/// Resolved output of a single file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: String,
    pub edges: Vec<Edge>,
    pub stubs: Vec<UnresolvedStub>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    /// Files actually scanned.
    pub touched: usize,
    /// Files enumerated, scanned or skipped.
    pub total: usize,
}

/// Everything one scan produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub graph: Graph,
    pub skipped: Vec<SkippedFile>,
    pub coverage: Coverage,
    /// Name of the agent source merged into the graph, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

/// Diagnostics written next to the graph (`run_report.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub coverage: Coverage,
    pub nodes: usize,
    pub edges: usize,
    pub skipped: Vec<SkippedFile>,
    pub unresolved: Vec<StubRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

impl ScanReport {
    pub fn run_report(&self, policy: NodePolicy, config_hash: Option<String>) -> RunReport {
        let doc = self.graph.to_document(policy);
        RunReport {
            coverage: self.coverage,
            nodes: doc.nodes.len(),
            edges: doc.edges.len(),
            skipped: self.skipped.clone(),
            unresolved: doc.unresolved,
            config_hash,
        }
    }
}

/// Scan one file and resolve each of its call-sites.
pub fn scan_file(file: &ScriptFile, index: &FileIndex, options: &ResolveOptions) -> FileOutcome {
    let (sites, symbols) = analyze(file);
    let mut outcome = FileOutcome { path: file.relative_path.clone(), ..FileOutcome::default() };
    for site in &sites {
        match resolve(site, &symbols, index, options) {
            Resolution::Edge(edge) => outcome.edges.push(edge),
            Resolution::Stub(stub) => {
                debug!(
                    source = %stub.source_file,
                    line = stub.line,
                    raw = %stub.raw_target_expression,
                    reason = stub.reason.as_str(),
                    "unresolved call-site"
                );
                outcome.stubs.push(stub);
            }
        }
    }
    debug!(
        path = %file.relative_path,
        dialect = %file.dialect,
        sites = sites.len(),
        edges = outcome.edges.len(),
        stubs = outcome.stubs.len(),
        "scanned file"
    );
    outcome
}

/// Run scan -> resolve -> build over `bundle`, then merge agent proposals.
pub fn run_scan(
    bundle: &Bundle,
    options: &ScanOptions,
    agent: Option<&dyn AgentEdgeSource>,
) -> Result<ScanReport, PipelineError> {
    for skip in &bundle.skipped {
        warn!(path = %skip.path, reason = skip.reason.as_str(), "skipped file");
    }

    let outcomes = match options.threads {
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
            pool.install(|| scan_all(bundle, &options.resolve))
        }
        None => scan_all(bundle, &options.resolve),
    };

    let mut builder = GraphBuilder::new(options.case_sensitive_nodes);
    for file in &bundle.files {
        builder.add_node(&file.relative_path);
    }
    for outcome in outcomes {
        for edge in outcome.edges {
            builder.add_edge(edge);
        }
        for stub in outcome.stubs {
            builder.add_stub(stub);
        }
    }

    let mut agent_name = None;
    if let Some(agent) = agent {
        let snapshot = builder.clone().build();
        let proposals =
            agent.propose(&snapshot).map_err(|source| PipelineError::Agent { name: agent.name(), source })?;
        info!(agent = agent.name(), proposals = proposals.len(), "merging agent edges");
        builder.merge_agent_edges(proposals, &bundle.index);
        agent_name = Some(agent.name().to_string());
    }

    let graph = builder.build();
    let coverage = Coverage { touched: bundle.files.len(), total: bundle.total_files() };
    info!(
        touched = coverage.touched,
        total = coverage.total,
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        unresolved = graph.unresolved.len(),
        "scan complete"
    );

    Ok(ScanReport { graph, skipped: bundle.skipped.clone(), coverage, agent: agent_name })
}

fn scan_all(bundle: &Bundle, options: &ResolveOptions) -> Vec<FileOutcome> {
    bundle.files.par_iter().map(|file| scan_file(file, &bundle.index, options)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InvocationKind;

    #[test]
    fn thread_count_does_not_change_output() {
        let bundle = Bundle::from_sources([
            ("run.sh", "./a.sh\n. ./lib.sh\n"),
            ("a.sh", "python3 b.py\n"),
            ("b.py", "import subprocess\nsubprocess.run(['bash', 'run.sh'])\n"),
            ("lib.sh", "$MISSING/x.sh\n"),
        ]);
        let single = run_scan(&bundle, &ScanOptions { threads: Some(1), ..ScanOptions::default() }, None)
            .expect("single-threaded scan");
        let multi = run_scan(&bundle, &ScanOptions { threads: Some(4), ..ScanOptions::default() }, None)
            .expect("multi-threaded scan");
        assert_eq!(single, multi);
        assert_eq!(single.graph.edge("run.sh", "lib.sh").map(|e| e.kind), Some(InvocationKind::Source));
        assert_eq!(single.coverage, Coverage { touched: 4, total: 4 });
    }
}
