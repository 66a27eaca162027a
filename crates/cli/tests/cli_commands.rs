use std::fs;

use predicates::prelude::*;
use scriptgraph_core::db::GRAPH_FILE;
use tempfile::tempdir;

fn bundle(root: &std::path::Path) {
    fs::create_dir_all(root.join("jobs")).expect("mkdir");
    fs::write(root.join("run.bat"), "call jobs\\Nightly.BAT\n").expect("write");
    fs::write(root.join("jobs/nightly.bat"), "@echo off\n").expect("write");
}

/// Running the CLI without a subcommand prints usage and fails.
#[test]
fn missing_subcommand_fails() {
    assert_cmd::cargo::cargo_bin_cmd!("scriptgraph").assert().failure();
}

#[test]
fn version_flag_succeeds() {
    assert_cmd::cargo::cargo_bin_cmd!("scriptgraph")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("scriptgraph"));
}

/// `scan` writes into `./out` under the working directory by default.
#[test]
fn scan_defaults_output_to_out_dir() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("bundle");
    bundle(&root);

    assert_cmd::cargo::cargo_bin_cmd!("scriptgraph")
        .current_dir(dir.path())
        .arg("scan")
        .arg("bundle")
        .assert()
        .success()
        .stdout(predicate::str::contains("Edges: 0"));

    assert!(dir.path().join("out").join(GRAPH_FILE).exists());
}

#[test]
fn case_insensitive_scan_resolves_windows_spelling() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("bundle");
    let out = dir.path().join("graphs");
    bundle(&root);

    assert_cmd::cargo::cargo_bin_cmd!("scriptgraph")
        .arg("scan")
        .arg(&root)
        .arg("--out")
        .arg(&out)
        .arg("--case-insensitive")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"edges\": 1"));

    let yaml = fs::read_to_string(out.join(GRAPH_FILE)).expect("graph");
    assert!(yaml.contains("jobs/nightly.bat"));
}

#[test]
fn scan_rejects_unknown_node_policy() {
    let dir = tempdir().expect("tempdir");
    assert_cmd::cargo::cargo_bin_cmd!("scriptgraph")
        .arg("scan")
        .arg(dir.path())
        .arg("--nodes")
        .arg("some")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown node policy"));
}

#[test]
fn score_prints_json() {
    let dir = tempdir().expect("tempdir");
    let pred = dir.path().join("pred.yaml");
    let truth = dir.path().join("truth.yaml");
    fs::write(&pred, "nodes: [a.sh, b.sh]\nedges:\n  - {src: a.sh, dst: b.sh}\n").expect("write");
    fs::write(&truth, "nodes: [a.sh, b.sh, c.sh]\nedges:\n  - {src: a.sh, dst: b.sh}\n  - {src: b.sh, dst: c.sh}\n")
        .expect("write");

    assert_cmd::cargo::cargo_bin_cmd!("scriptgraph")
        .arg("score")
        .arg("--pred")
        .arg(&pred)
        .arg("--truth")
        .arg(&truth)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"recall_edges\": 0.5"))
        .stdout(predicate::str::contains("\"gcr\": 0.5"));
}

#[test]
fn score_fails_on_missing_truth() {
    let dir = tempdir().expect("tempdir");
    let pred = dir.path().join("pred.yaml");
    fs::write(&pred, "nodes: []\n").expect("write");
    assert_cmd::cargo::cargo_bin_cmd!("scriptgraph")
        .arg("score")
        .arg("--pred")
        .arg(&pred)
        .arg("--truth")
        .arg(dir.path().join("truth.yaml"))
        .assert()
        .failure();
}

#[test]
fn runs_and_stats_read_the_run_log() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("bundle");
    let runlog = dir.path().join("runlog.sqlite");
    bundle(&root);

    assert_cmd::cargo::cargo_bin_cmd!("scriptgraph")
        .arg("scan")
        .arg(&root)
        .arg("--out")
        .arg(dir.path().join("out"))
        .arg("--runlog")
        .arg(&runlog)
        .assert()
        .success();

    assert_cmd::cargo::cargo_bin_cmd!("scriptgraph")
        .arg("runs")
        .arg("--db")
        .arg(&runlog)
        .assert()
        .success()
        .stdout(predicate::str::contains("scan [succeeded]"));

    assert_cmd::cargo::cargo_bin_cmd!("scriptgraph")
        .arg("stats")
        .arg("runs")
        .arg("--db")
        .arg(&runlog)
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"command\": \"scan\""));
}

#[test]
fn stats_graph_prints_counts() {
    let dir = tempdir().expect("tempdir");
    let graph = dir.path().join("g.yaml");
    fs::write(&graph, "nodes: [a.sh, b.py]\nedges:\n  - {src: a.sh, dst: b.py, kind: interpreter_hop, interpreter: python}\n")
        .expect("write");
    assert_cmd::cargo::cargo_bin_cmd!("scriptgraph")
        .arg("stats")
        .arg("graph")
        .arg(&graph)
        .assert()
        .success()
        .stdout(predicate::str::contains("interpreter_hop: 1"));
}

#[test]
fn bench_rejects_zero_resamples() {
    let dir = tempdir().expect("tempdir");
    let rows = dir.path().join("rows.jsonl");
    fs::write(&rows, "").expect("write");
    assert_cmd::cargo::cargo_bin_cmd!("scriptgraph")
        .arg("bench")
        .arg(&rows)
        .arg("--resamples")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--resamples"));
}
