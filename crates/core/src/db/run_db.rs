use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};
use thiserror::Error;
use tracing::debug;

use crate::db::{CommandDurations, EventRecord, RunRecord, RunStatus};
use crate::services::bench::{percentile, BenchRow};
use crate::services::pipeline::ScanReport;
use crate::services::scoring::ScoreResult;

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Error type for run log operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Underlying SQLite error.
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },

    /// A stored JSON payload could not be encoded or decoded.
    #[error("Invalid stored payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("No run with id {0}")]
    UnknownRun(i64),
}

/// Convenience result type for DB operations.
pub type DbResult<T> = Result<T, DbError>;

/// SQLite-backed run log.
///
/// This is a thin wrapper around `rusqlite::Connection` that is responsible for:
/// - Opening/creating the DB file.
/// - Applying schema migrations.
/// - Recording runs with their diagnostics and scores.
#[derive(Debug)]
pub struct RunDb {
    conn: Connection,
}

impl RunDb {
    /// Open (or create) a run log at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory run log, mostly for tests.
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Expose a reference to the underlying connection for advanced callers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Insert a `running` run and return its id.
    pub fn start_run(&self, command: &str, bundle: &str, config_hash: Option<&str>) -> DbResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            r#"
            INSERT INTO runs (command, bundle, config_hash, status, started_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![command, bundle, config_hash, RunStatus::Running.as_str(), now],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(run_id = id, command, bundle, "run started");
        Ok(id)
    }

    pub fn log_event(&self, run_id: i64, level: &str, message: &str) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO events (run_id, level, message, at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![run_id, level, message, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Persist every stub and skipped file of a scan.
    pub fn record_report(&self, run_id: i64, report: &ScanReport) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO unresolved (run_id, source, raw, reason, line)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for stub in &report.graph.unresolved {
                stmt.execute(params![
                    run_id,
                    stub.source_file,
                    stub.raw_target_expression,
                    stub.reason.as_str(),
                    stub.line as i64
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO skipped (run_id, path, reason)
                VALUES (?1, ?2, ?3)
                "#,
            )?;
            for skip in &report.skipped {
                stmt.execute(params![run_id, skip.path, skip.reason.as_str()])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    pub fn record_score(&self, run_id: i64, label: &str, bundle: &str, score: &ScoreResult) -> DbResult<()> {
        let payload = serde_json::to_string(score)?;
        self.conn.execute(
            r#"
            INSERT INTO scores (run_id, label, bundle, f1_nodes, f1_edges, gcr, payload)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![run_id, label, bundle, score.f1_nodes, score.f1_edges, score.gcr, payload],
        )?;
        Ok(())
    }

    /// Set the final status and finish timestamp.
    pub fn finish_run(&self, run_id: i64, status: RunStatus) -> DbResult<()> {
        let affected = self.conn.execute(
            r#"
            UPDATE runs
            SET status = ?1, finished_at = ?2
            WHERE id = ?3
            "#,
            params![status.as_str(), Utc::now().to_rfc3339(), run_id],
        )?;
        if affected == 0 {
            return Err(DbError::UnknownRun(run_id));
        }
        debug!(run_id, status = status.as_str(), "run finished");
        Ok(())
    }

    /// List runs, optionally filtered by command (ordered by id).
    pub fn list_runs(&self, command: Option<&str>) -> DbResult<Vec<RunRecord>> {
        fn map_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
            let status: String = row.get(4)?;
            let status = status
                .parse::<RunStatus>()
                .map_err(|_| rusqlite::Error::InvalidColumnType(4, "status".to_string(), Type::Text))?;
            Ok(RunRecord {
                id: row.get(0)?,
                command: row.get(1)?,
                bundle: row.get(2)?,
                config_hash: row.get(3)?,
                status,
                started_at: row.get(5)?,
                finished_at: row.get(6)?,
            })
        }

        let mut stmt = if command.is_some() {
            self.conn.prepare(
                r#"
                SELECT id, command, bundle, config_hash, status, started_at, finished_at
                FROM runs
                WHERE command = ?1
                ORDER BY id
                "#,
            )?
        } else {
            self.conn.prepare(
                r#"
                SELECT id, command, bundle, config_hash, status, started_at, finished_at
                FROM runs
                ORDER BY id
                "#,
            )?
        };

        let rows = if let Some(cmd) = command {
            stmt.query_map(params![cmd], map_run)?
        } else {
            stmt.query_map([], map_run)?
        };

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn list_events(&self, run_id: i64) -> DbResult<Vec<EventRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT run_id, level, message, at
            FROM events
            WHERE run_id = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(EventRecord { run_id: row.get(0)?, level: row.get(1)?, message: row.get(2)?, at: row.get(3)? })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Stub counts for one run, keyed by reason.
    pub fn unresolved_counts(&self, run_id: i64) -> DbResult<BTreeMap<String, usize>> {
        self.grouped_counts("SELECT reason, COUNT(*) FROM unresolved WHERE run_id = ?1 GROUP BY reason", run_id)
    }

    /// Skipped-file counts for one run, keyed by reason.
    pub fn skipped_counts(&self, run_id: i64) -> DbResult<BTreeMap<String, usize>> {
        self.grouped_counts("SELECT reason, COUNT(*) FROM skipped WHERE run_id = ?1 GROUP BY reason", run_id)
    }

    fn grouped_counts(&self, sql: &str, run_id: i64) -> DbResult<BTreeMap<String, usize>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![run_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut out = BTreeMap::new();
        for row in rows {
            let (reason, count) = row?;
            out.insert(reason, count as usize);
        }
        Ok(out)
    }

    /// Scores recorded for one run, in insertion order.
    pub fn list_scores(&self, run_id: i64) -> DbResult<Vec<BenchRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT label, bundle, payload
            FROM scores
            WHERE run_id = ?1
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (label, bundle, payload) = row?;
            out.push(BenchRow { label, bundle, score: serde_json::from_str(&payload)? });
        }
        Ok(out)
    }

    /// Per-command wall-clock statistics over finished runs, sorted by command.
    pub fn run_durations(&self) -> DbResult<Vec<CommandDurations>> {
        let mut by_command: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for run in self.list_runs(None)? {
            let Some(finished) = run.finished_at.as_deref() else {
                continue;
            };
            match elapsed_secs(&run.started_at, finished) {
                Some(secs) => by_command.entry(run.command).or_default().push(secs),
                None => debug!(run_id = run.id, "skipping run with unparseable timestamps"),
            }
        }

        Ok(by_command
            .into_iter()
            .map(|(command, mut secs)| {
                secs.sort_by(|a, b| a.total_cmp(b));
                CommandDurations {
                    count: secs.len(),
                    mean_secs: secs.iter().sum::<f64>() / secs.len() as f64,
                    p50_secs: percentile(&secs, 0.5),
                    p95_secs: percentile(&secs, 0.95),
                    command,
                }
            })
            .collect())
    }
}

fn elapsed_secs(started: &str, finished: &str) -> Option<f64> {
    let start = DateTime::parse_from_rfc3339(started).ok()?;
    let end = DateTime::parse_from_rfc3339(finished).ok()?;
    let millis = (end - start).num_milliseconds().max(0);
    Some(millis as f64 / 1000.0)
}

/// Apply schema migrations to bring the database to the latest version.
///
/// We use `PRAGMA user_version` as the schema version indicator.
///
/// Version map:
/// - 0: no schema
/// - 1: runs and events
/// - 2: per-run unresolved stubs, skipped files and scores
fn apply_migrations(conn: &Connection) -> DbResult<()> {
    let mut current_version = current_schema_version(conn)?;

    // Reject DBs created with a newer schema than we support.
    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DbError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS runs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                command     TEXT NOT NULL,
                bundle      TEXT NOT NULL,
                config_hash TEXT,
                status      TEXT NOT NULL,
                started_at  TEXT NOT NULL,
                finished_at TEXT
            );

            CREATE TABLE IF NOT EXISTS events (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id  INTEGER NOT NULL,
                level   TEXT NOT NULL,
                message TEXT NOT NULL,
                at      TEXT NOT NULL
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS unresolved (
                run_id INTEGER NOT NULL,
                source TEXT NOT NULL,
                raw    TEXT NOT NULL,
                reason TEXT NOT NULL,
                line   INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS skipped (
                run_id INTEGER NOT NULL,
                path   TEXT NOT NULL,
                reason TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS scores (
                id       INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id   INTEGER NOT NULL,
                label    TEXT NOT NULL,
                bundle   TEXT NOT NULL,
                f1_nodes REAL NOT NULL,
                f1_edges REAL NOT NULL,
                gcr      REAL NOT NULL,
                payload  TEXT NOT NULL
            );
            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
