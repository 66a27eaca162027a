//! Graph building: resolved edges folded into a deduplicated directed graph
//! with stable node identities.
//!
//! Edges are keyed on (source, target). Folding happens in input order, which
//! callers keep deterministic (files sorted, call-sites in line order): a
//! later edge only replaces an earlier one when its kind ranks strictly
//! higher (InterpreterHop > Source > Execute). Static provenance always wins
//! over agent provenance regardless of rank.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bundle::{FileIndex, Lookup};
use crate::model::{Dialect, Edge, InvocationKind, Provenance, StubReason, UnresolvedStub};
use crate::paths;

/// Terminal artifact of one scan: nodes, edges and every unresolved stub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: BTreeSet<String>,
    /// Sorted by (source, target).
    pub edges: Vec<Edge>,
    /// Sorted by (source, line, expression).
    pub unresolved: Vec<UnresolvedStub>,
}

impl Graph {
    pub fn edge(&self, source: &str, target: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.source == source && e.target == target)
    }

    pub fn to_document(&self, policy: NodePolicy) -> GraphDocument {
        let nodes: Vec<String> = match policy {
            NodePolicy::All => self.nodes.iter().cloned().collect(),
            NodePolicy::Participating => {
                let mut used: BTreeSet<&str> = BTreeSet::new();
                for edge in &self.edges {
                    used.insert(&edge.source);
                    used.insert(&edge.target);
                }
                for stub in &self.unresolved {
                    used.insert(&stub.source_file);
                }
                self.nodes.iter().filter(|n| used.contains(n.as_str())).cloned().collect()
            }
        };
        GraphDocument {
            nodes,
            edges: self
                .edges
                .iter()
                .map(|e| EdgeRecord {
                    src: e.source.clone(),
                    dst: e.target.clone(),
                    kind: e.kind.as_str().to_string(),
                    interpreter: e.kind.interpreter(),
                    provenance: e.provenance,
                })
                .collect(),
            unresolved: self
                .unresolved
                .iter()
                .map(|s| StubRecord {
                    src: s.source_file.clone(),
                    raw: s.raw_target_expression.clone(),
                    reason: s.reason,
                    line: s.line,
                })
                .collect(),
        }
    }
}

/// Which nodes a serialized graph keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePolicy {
    /// Nodes on an edge, plus sources of unresolved stubs.
    #[default]
    Participating,
    All,
}

impl FromStr for NodePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "participating" => Ok(NodePolicy::Participating),
            "all" => Ok(NodePolicy::All),
            other => Err(format!("unknown node policy '{other}' (expected participating or all)")),
        }
    }
}

/// Serialized graph record, also the input format of the scorer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<StubRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub dst: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<Dialect>,
    #[serde(default = "default_provenance")]
    pub provenance: Provenance,
}

fn default_kind() -> String {
    InvocationKind::Execute.as_str().to_string()
}

fn default_provenance() -> Provenance {
    Provenance::Static
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubRecord {
    pub src: String,
    pub raw: String,
    pub reason: StubReason,
    #[serde(default)]
    pub line: usize,
}

/// Accumulates nodes, edges and stubs; call [`GraphBuilder::build`] once all
/// per-file results are in.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    case_sensitive: bool,
    /// node key -> first-seen display path
    nodes: BTreeMap<String, String>,
    edges: BTreeMap<(String, String), Edge>,
    stubs: Vec<UnresolvedStub>,
}

impl GraphBuilder {
    pub fn new(case_sensitive: bool) -> Self {
        Self { case_sensitive, nodes: BTreeMap::new(), edges: BTreeMap::new(), stubs: Vec::new() }
    }

    /// Register a node and return its display path.
    pub fn add_node(&mut self, path: &str) -> String {
        self.nodes.entry(paths::node_key(path, self.case_sensitive)).or_insert_with(|| path.to_string()).clone()
    }

    pub fn add_edge(&mut self, mut edge: Edge) {
        edge.source = self.add_node(&edge.source);
        edge.target = self.add_node(&edge.target);
        let key = (
            paths::node_key(&edge.source, self.case_sensitive),
            paths::node_key(&edge.target, self.case_sensitive),
        );
        match self.edges.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(edge);
            }
            Entry::Occupied(mut slot) => fold(slot.get_mut(), edge),
        }
    }

    pub fn add_stub(&mut self, stub: UnresolvedStub) {
        self.add_node(&stub.source_file);
        self.stubs.push(stub);
    }

    /// Merge externally proposed edges under the same dedup rules.
    ///
    /// Both endpoints must be files in `index`; a proposal naming anything
    /// else is recorded as a `MissingFile` stub instead of becoming a node.
    pub fn merge_agent_edges<I>(&mut self, proposals: I, index: &FileIndex)
    where
        I: IntoIterator<Item = Edge>,
    {
        for mut edge in proposals {
            edge.provenance = Provenance::Agent;
            let source = lookup_path(index, &edge.source, self.case_sensitive);
            let target = lookup_path(index, &edge.target, self.case_sensitive);
            match (source, target) {
                (Some(source), Some(target)) => {
                    edge.source = source;
                    edge.target = target;
                    self.add_edge(edge);
                }
                _ => {
                    debug!(source = %edge.source, target = %edge.target, "rejected agent edge");
                    self.stubs.push(UnresolvedStub {
                        source_file: edge.source,
                        raw_target_expression: edge.target,
                        line: 0,
                        reason: StubReason::MissingFile,
                    });
                }
            }
        }
    }

    pub fn build(self) -> Graph {
        let mut unresolved = self.stubs;
        unresolved.sort_by(|a, b| {
            (&a.source_file, a.line, &a.raw_target_expression).cmp(&(&b.source_file, b.line, &b.raw_target_expression))
        });
        Graph { nodes: self.nodes.into_values().collect(), edges: self.edges.into_values().collect(), unresolved }
    }
}

fn fold(existing: &mut Edge, incoming: Edge) {
    let replace = match (existing.provenance, incoming.provenance) {
        (Provenance::Static, Provenance::Agent) => false,
        (Provenance::Agent, Provenance::Static) => true,
        _ => incoming.kind.rank() > existing.kind.rank(),
    };
    let mut evidence = std::mem::take(&mut existing.evidence);
    evidence.extend(incoming.evidence.iter().cloned());
    if replace {
        *existing = incoming;
    }
    existing.evidence = evidence;
}

fn lookup_path(index: &FileIndex, path: &str, case_sensitive: bool) -> Option<String> {
    let canonical = paths::normalize(path)?;
    match index.lookup(&canonical, case_sensitive) {
        Lookup::Found(found) => Some(found),
        _ => None,
    }
}

/// Build a graph in one call: `scanned` files become nodes, then edges and
/// stubs are folded in the given order.
pub fn build<'a, S, E, U>(scanned: S, edges: E, stubs: U, case_sensitive: bool) -> Graph
where
    S: IntoIterator<Item = &'a str>,
    E: IntoIterator<Item = Edge>,
    U: IntoIterator<Item = UnresolvedStub>,
{
    let mut builder = GraphBuilder::new(case_sensitive);
    for path in scanned {
        builder.add_node(path);
    }
    for edge in edges {
        builder.add_edge(edge);
    }
    for stub in stubs {
        builder.add_stub(stub);
    }
    builder.build()
}
