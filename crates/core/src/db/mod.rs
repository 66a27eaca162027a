//! Run log database and output layout definitions.
//!
//! This module wraps a SQLite database storing:
//! - Runs of each command with status and timestamps
//! - Free-form events logged during a run
//! - Unresolved stubs and skipped files per scan
//! - Score results per bundle
//!
//! It also defines `OutputLayout`, the file names a scan writes.

mod layout;
mod models;
mod run_db;

pub use layout::{OutputLayout, GRAPH_FILE, REPORT_FILE, RUNLOG_FILE};
pub use models::{CommandDurations, EventRecord, RunRecord, RunStatus};
pub use run_db::{DbError, DbResult, RunDb, CURRENT_SCHEMA_VERSION};
