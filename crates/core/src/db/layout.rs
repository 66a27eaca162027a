use std::path::{Path, PathBuf};

pub const GRAPH_FILE: &str = "predicted_graph.yaml";
pub const REPORT_FILE: &str = "run_report.json";
pub const RUNLOG_FILE: &str = "runlog.sqlite";

/// Files written by one scan into its output directory.
///
/// This does *not* perform any IO itself; the CLI creates the directory.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub root: PathBuf,
    /// Serialized graph (YAML).
    pub graph_path: PathBuf,
    /// Coverage, skips and stubs (JSON).
    pub report_path: PathBuf,
    /// Default run log database.
    pub runlog_path: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let graph_path = root.join(GRAPH_FILE);
        let report_path = root.join(REPORT_FILE);
        let runlog_path = root.join(RUNLOG_FILE);
        Self { root, graph_path, report_path, runlog_path }
    }
}
