//! scriptgraph-core
//!
//! Core library for extracting "who calls whom" relationships from legacy
//! script estates (POSIX shell, Windows batch, PowerShell, Perl, and CLI-style
//! Python) and for scoring a predicted call graph against ground truth.
//!
//! The pipeline is scan -> resolve -> build -> score:
//! - `bundle` enumerates a filesystem subtree into sorted, dialect-tagged files.
//! - `services::scanners` extracts candidate call-sites per dialect.
//! - `symbols` and `services::resolver` turn call-sites into edges or stubs.
//! - `services::graph` folds edges into a deduplicated, deterministic graph.
//! - `services::scoring` compares graphs (node/edge F1 and coverage ratio).
//!
//! All substantive logic lives here so it is fully testable and reusable
//! from multiple frontends.

pub mod bundle;
pub mod config;
pub mod db;
pub mod model;
pub mod paths;
pub mod services;
pub mod symbols;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
