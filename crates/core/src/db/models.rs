use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Allowed status values for logged runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// One CLI invocation (scan, score, bench) as stored in the run log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    pub id: i64,
    /// Command name, e.g. "scan".
    pub command: String,
    /// Bundle root or input file the command worked on.
    pub bundle: String,
    pub config_hash: Option<String>,
    pub status: RunStatus,
    /// RFC 3339 timestamps.
    pub started_at: String,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventRecord {
    pub run_id: i64,
    pub level: String,
    pub message: String,
    pub at: String,
}

/// Wall-clock summary per command, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandDurations {
    pub command: String,
    pub count: usize,
    pub mean_secs: f64,
    pub p50_secs: f64,
    pub p95_secs: f64,
}
