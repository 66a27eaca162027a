//! Graph comparison: node and edge precision/recall/F1 plus the graph
//! coverage ratio (GCR).
//!
//! Paths on both sides are canonicalized (`\` to `/`, `.`/`..` folded,
//! leading `./` dropped) and compared case-insensitively on request. Edge
//! identity is the endpoint pair only; kind does not take part.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ScoringConfig;
use crate::paths;
use crate::services::graph::GraphDocument;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("Failed to read graph {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse graph {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Malformed truth graph: {0}")]
    MalformedTruth(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreOptions {
    /// Directory prefix stripped from predicted paths (e.g. `bundle_07/`).
    pub pred_prefix: String,
    pub case_sensitive: bool,
}

impl Default for ScoreOptions {
    fn default() -> Self {
        Self { pred_prefix: String::new(), case_sensitive: true }
    }
}

impl From<&ScoringConfig> for ScoreOptions {
    fn from(cfg: &ScoringConfig) -> Self {
        Self { pred_prefix: cfg.pred_prefix.clone(), case_sensitive: !cfg.case_insensitive }
    }
}

/// Raw set sizes behind the ratios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreCounts {
    pub node_true_positives: usize,
    pub predicted_nodes: usize,
    pub truth_nodes: usize,
    pub edge_true_positives: usize,
    pub predicted_edges: usize,
    pub truth_edges: usize,
    /// Truth edges whose endpoints are both predicted nodes.
    pub covered_truth_edges: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub precision_nodes: f64,
    pub recall_nodes: f64,
    pub f1_nodes: f64,
    pub precision_edges: f64,
    pub recall_edges: f64,
    pub f1_edges: f64,
    /// 1.0 when the truth graph has no edges.
    pub gcr: f64,
    /// Node and edge sets are identical.
    #[serde(default)]
    pub exact_match: bool,
    #[serde(default)]
    pub counts: ScoreCounts,
}

/// Precision, recall and F1 of `pred` against `truth`. Empty sets score 0
/// and F1 is 0 when precision and recall are both 0.
fn prf<T: Ord>(pred: &BTreeSet<T>, truth: &BTreeSet<T>) -> (f64, f64, f64, usize) {
    let tp = pred.intersection(truth).count();
    let precision = if pred.is_empty() { 0.0 } else { tp as f64 / pred.len() as f64 };
    let recall = if truth.is_empty() { 0.0 } else { tp as f64 / truth.len() as f64 };
    let f1 = if precision + recall == 0.0 { 0.0 } else { 2.0 * precision * recall / (precision + recall) };
    (precision, recall, f1, tp)
}

type EdgeKey = (String, String);

/// Canonical node and edge sets of the truth graph. Fails on empty paths and
/// on edges whose endpoints are not declared nodes.
fn truth_sets(truth: &GraphDocument, case_sensitive: bool) -> Result<(BTreeSet<String>, BTreeSet<EdgeKey>), ScoreError> {
    let mut nodes = BTreeSet::new();
    for (i, node) in truth.nodes.iter().enumerate() {
        let key = paths::canonical_key(node, case_sensitive);
        if key.is_empty() {
            return Err(ScoreError::MalformedTruth(format!("node #{i} has an empty path")));
        }
        nodes.insert(key);
    }
    let mut edges = BTreeSet::new();
    for (i, edge) in truth.edges.iter().enumerate() {
        let src = paths::canonical_key(&edge.src, case_sensitive);
        let dst = paths::canonical_key(&edge.dst, case_sensitive);
        if src.is_empty() || dst.is_empty() {
            return Err(ScoreError::MalformedTruth(format!("edge #{i} has an empty endpoint")));
        }
        for end in [&src, &dst] {
            if !nodes.contains(end) {
                return Err(ScoreError::MalformedTruth(format!(
                    "edge #{i} ({} -> {}) references undeclared node '{end}'",
                    edge.src, edge.dst
                )));
            }
        }
        edges.insert((src, dst));
    }
    Ok((nodes, edges))
}

/// Canonical predicted sets. Edge endpoints count as predicted nodes.
fn predicted_sets(pred: &GraphDocument, options: &ScoreOptions) -> (BTreeSet<String>, BTreeSet<EdgeKey>) {
    let key = |p: &str| {
        let stripped = paths::strip_prefix(p, &options.pred_prefix, options.case_sensitive);
        paths::canonical_key(&stripped, options.case_sensitive)
    };
    let mut nodes: BTreeSet<String> = pred.nodes.iter().map(|n| key(n)).filter(|k| !k.is_empty()).collect();
    let mut edges = BTreeSet::new();
    for edge in &pred.edges {
        let (src, dst) = (key(&edge.src), key(&edge.dst));
        if src.is_empty() || dst.is_empty() {
            continue;
        }
        nodes.insert(src.clone());
        nodes.insert(dst.clone());
        edges.insert((src, dst));
    }
    (nodes, edges)
}

/// Compare a predicted graph with ground truth.
///
/// The two sides are read differently. A predicted graph's node set is its
/// declared nodes plus every edge endpoint, so a prediction that lists only
/// edges still earns node credit. Truth must declare every endpoint as a node
/// and fails with [`ScoreError::MalformedTruth`] otherwise.
pub fn score(pred: &GraphDocument, truth: &GraphDocument, options: &ScoreOptions) -> Result<ScoreResult, ScoreError> {
    let (truth_nodes, truth_edges) = truth_sets(truth, options.case_sensitive)?;
    let (pred_nodes, pred_edges) = predicted_sets(pred, options);

    let (precision_nodes, recall_nodes, f1_nodes, node_tp) = prf(&pred_nodes, &truth_nodes);
    let (precision_edges, recall_edges, f1_edges, edge_tp) = prf(&pred_edges, &truth_edges);

    let covered = truth_edges
        .iter()
        .filter(|(src, dst)| pred_nodes.contains(src) && pred_nodes.contains(dst))
        .count();
    let gcr = if truth_edges.is_empty() { 1.0 } else { covered as f64 / truth_edges.len() as f64 };

    Ok(ScoreResult {
        precision_nodes,
        recall_nodes,
        f1_nodes,
        precision_edges,
        recall_edges,
        f1_edges,
        gcr,
        exact_match: pred_nodes == truth_nodes && pred_edges == truth_edges,
        counts: ScoreCounts {
            node_true_positives: node_tp,
            predicted_nodes: pred_nodes.len(),
            truth_nodes: truth_nodes.len(),
            edge_true_positives: edge_tp,
            predicted_edges: pred_edges.len(),
            truth_edges: truth_edges.len(),
            covered_truth_edges: covered,
        },
    })
}

/// Load a graph document from YAML or JSON.
pub fn load_document(path: &Path) -> Result<GraphDocument, ScoreError> {
    let text = fs::read_to_string(path).map_err(|source| ScoreError::Io { path: path.to_path_buf(), source })?;
    if text.trim().is_empty() {
        return Ok(GraphDocument::default());
    }
    serde_yaml::from_str(&text).map_err(|source| ScoreError::Parse { path: path.to_path_buf(), source })
}

/// Load both documents and score them.
pub fn score_files(pred: &Path, truth: &Path, options: &ScoreOptions) -> Result<ScoreResult, ScoreError> {
    let pred_doc = load_document(pred)?;
    let truth_doc = load_document(truth)?;
    score(&pred_doc, &truth_doc, options)
}
