//! Agent merge contract.
//!
//! External stages (language-model roles, manual review) see the static
//! graph and propose extra edges. Proposals are merged by
//! [`GraphBuilder::merge_agent_edges`](crate::services::graph::GraphBuilder::merge_agent_edges)
//! with `Agent` provenance.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::model::{Edge, InvocationKind, Provenance};
use crate::services::graph::{EdgeRecord, Graph, GraphDocument};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to read agent edges from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse agent edges from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Unknown edge kind '{kind}' for {src} -> {dst}")]
    InvalidKind { kind: String, src: String, dst: String },
}

/// A producer of candidate edges beyond static reach.
pub trait AgentEdgeSource: Send + Sync {
    fn propose(&self, graph: &Graph) -> Result<Vec<Edge>, AgentError>;
    fn name(&self) -> &'static str;
}

/// Proposals stored in a YAML or JSON file, either as a graph document
/// (`{edges: [...]}`) or as a bare list of edge records.
pub struct FileAgentSource {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProposalFile {
    Document(GraphDocument),
    Edges(Vec<EdgeRecord>),
}

impl FileAgentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<Edge>, AgentError> {
        let text = fs::read_to_string(&self.path)
            .map_err(|source| AgentError::Io { path: self.path.clone(), source })?;
        let parsed: ProposalFile = serde_yaml::from_str(&text)
            .map_err(|source| AgentError::Parse { path: self.path.clone(), source })?;
        let records = match parsed {
            ProposalFile::Document(doc) => doc.edges,
            ProposalFile::Edges(edges) => edges,
        };
        records.into_iter().map(edge_from_record).collect()
    }
}

impl AgentEdgeSource for FileAgentSource {
    fn propose(&self, _graph: &Graph) -> Result<Vec<Edge>, AgentError> {
        self.load()
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

fn edge_from_record(record: EdgeRecord) -> Result<Edge, AgentError> {
    let kind = InvocationKind::from_parts(&record.kind, record.interpreter).ok_or_else(|| {
        AgentError::InvalidKind { kind: record.kind.clone(), src: record.src.clone(), dst: record.dst.clone() }
    })?;
    Ok(Edge { source: record.src, target: record.dst, kind, provenance: Provenance::Agent, evidence: Vec::new() })
}
