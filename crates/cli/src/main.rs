use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use scriptgraph::commands::{
    bench_command, list_runs_command, scan_command, score_command, stats_graph_command,
    stats_runs_command, ScanRequest,
};
use scriptgraph::default_log_filter;
use scriptgraph_core::services::bench::BenchOptions;
use scriptgraph_core::services::graph::NodePolicy;
use tracing_subscriber::EnvFilter;

/// Static call-graph extraction for heterogeneous script bundles.
///
/// This CLI is a thin wrapper around `scriptgraph-core` (exposed in code as
/// `scriptgraph_core`). Scanning, resolution, scoring and the run log all
/// live in the library.
#[derive(Parser, Debug)]
#[command(name = "scriptgraph", version, about = "Static call graphs for legacy script estates", long_about = None)]
struct Cli {
    /// Log debug detail to stderr (overridden by RUST_LOG).
    #[arg(long, short = 'v', global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a bundle folder and write the predicted graph.
    ///
    /// Writes `predicted_graph.yaml` and `run_report.json` into `--out`.
    Scan {
        /// Bundle root directory.
        folder: String,

        /// Output directory.
        #[arg(long, default_value = "./out")]
        out: String,

        /// YAML configuration file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seed list (one relative path per line). Defaults to the bundle's
        /// `seeds.txt` or `.seeds`.
        #[arg(long)]
        seeds: Option<PathBuf>,

        /// Maximum number of files to scan.
        #[arg(long)]
        budget: Option<usize>,

        /// Resolve and identify paths case-insensitively.
        #[arg(long, default_value_t = false)]
        case_insensitive: bool,

        /// YAML or JSON file of agent-proposed edges to merge.
        #[arg(long)]
        agent_edges: Option<PathBuf>,

        /// Which nodes the graph file keeps.
        #[arg(long, default_value = "participating")]
        nodes: NodePolicy,

        /// Record the run in this SQLite run log.
        #[arg(long)]
        runlog: Option<PathBuf>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Score a predicted graph against a truth graph (prints JSON).
    Score {
        #[arg(long)]
        pred: PathBuf,

        #[arg(long)]
        truth: PathBuf,

        /// Prefix stripped from predicted paths before matching.
        #[arg(long)]
        pred_prefix: Option<String>,

        #[arg(long, default_value_t = false)]
        case_insensitive: bool,

        /// Record the score in this SQLite run log.
        #[arg(long)]
        runlog: Option<PathBuf>,

        /// Label stored with the logged score.
        #[arg(long, requires = "runlog")]
        label: Option<String>,
    },

    /// Aggregate JSONL score rows per label with bootstrap confidence intervals.
    Bench {
        file: PathBuf,

        #[arg(long, default_value_t = 10_000)]
        resamples: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Two-sided interval level; 0.05 gives 95%.
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Summary statistics over graphs and run logs.
    Stats {
        #[command(subcommand)]
        target: StatsTarget,
    },

    /// List runs recorded in a run log.
    Runs {
        #[arg(long)]
        db: PathBuf,

        /// Only runs of this command (scan, score).
        #[arg(long)]
        command: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum StatsTarget {
    /// Node, edge and stub counts of a serialized graph.
    Graph {
        file: PathBuf,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Duration percentiles per command from a run log.
    Runs {
        #[arg(long)]
        db: PathBuf,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_filter(verbose)));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Scan {
            folder,
            out,
            config,
            seeds,
            budget,
            case_insensitive,
            agent_edges,
            nodes,
            runlog,
            json,
        } => {
            let request = ScanRequest {
                folder,
                out,
                config,
                seeds,
                budget,
                case_insensitive,
                agent_edges,
                nodes,
                runlog,
                json,
            };
            scan_command(&request)?;
        }
        Command::Score { pred, truth, pred_prefix, case_insensitive, runlog, label } => {
            score_command(&pred, &truth, pred_prefix, case_insensitive, runlog.as_deref(), label.as_deref())?;
        }
        Command::Bench { file, resamples, seed, alpha, json } => {
            bench_command(&file, &BenchOptions { resamples, seed, alpha }, json)?;
        }
        Command::Stats { target } => match target {
            StatsTarget::Graph { file, json } => {
                stats_graph_command(&file, json)?;
            }
            StatsTarget::Runs { db, json } => {
                stats_runs_command(&db, json)?;
            }
        },
        Command::Runs { db, command, json } => {
            list_runs_command(&db, command.as_deref(), json)?;
        }
    }

    Ok(())
}
