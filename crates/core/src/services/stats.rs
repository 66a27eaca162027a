//! Summary statistics over a serialized graph.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Provenance;
use crate::services::graph::GraphDocument;

/// How many entries the caller/callee rankings keep.
pub const TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degree {
    pub path: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub edges_by_kind: BTreeMap<String, usize>,
    pub static_edges: usize,
    pub agent_edges: usize,
    pub unresolved: usize,
    pub unresolved_by_reason: BTreeMap<String, usize>,
    /// Highest out-degree first.
    pub top_callers: Vec<Degree>,
    /// Highest in-degree first.
    pub top_callees: Vec<Degree>,
}

pub fn graph_stats(doc: &GraphDocument) -> GraphStats {
    let mut stats = GraphStats { nodes: doc.nodes.len(), edges: doc.edges.len(), ..GraphStats::default() };
    let mut out_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();

    for edge in &doc.edges {
        *stats.edges_by_kind.entry(edge.kind.clone()).or_default() += 1;
        match edge.provenance {
            Provenance::Static => stats.static_edges += 1,
            Provenance::Agent => stats.agent_edges += 1,
        }
        *out_degree.entry(&edge.src).or_default() += 1;
        *in_degree.entry(&edge.dst).or_default() += 1;
    }
    for stub in &doc.unresolved {
        stats.unresolved += 1;
        *stats.unresolved_by_reason.entry(stub.reason.as_str().to_string()).or_default() += 1;
    }

    stats.top_callers = top(out_degree);
    stats.top_callees = top(in_degree);
    stats
}

fn top(degrees: BTreeMap<&str, usize>) -> Vec<Degree> {
    let mut ranked: Vec<Degree> =
        degrees.into_iter().map(|(path, count)| Degree { path: path.to_string(), count }).collect();
    // BTreeMap order already sorts paths; the stable sort keeps it for ties.
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(TOP_N);
    ranked
}
