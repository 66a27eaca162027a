use std::fs;

use scriptgraph_core::model::Provenance;
use scriptgraph_core::services::bench::{aggregate, bootstrap_mean, parse_rows, BenchOptions};
use scriptgraph_core::services::graph::{EdgeRecord, GraphDocument};
use scriptgraph_core::services::scoring::{load_document, score, score_files, ScoreError, ScoreOptions};
use scriptgraph_core::services::stats::graph_stats;
use tempfile::tempdir;

fn edge(src: &str, dst: &str, kind: &str, provenance: Provenance) -> EdgeRecord {
    EdgeRecord { src: src.into(), dst: dst.into(), kind: kind.into(), interpreter: None, provenance }
}

#[test]
fn prefix_and_separators_are_normalized_before_matching() {
    let truth = GraphDocument {
        nodes: vec!["run.bat".into(), "lib/x.bat".into()],
        edges: vec![edge("run.bat", "lib/x.bat", "execute", Provenance::Static)],
        unresolved: vec![],
    };
    let pred = GraphDocument {
        nodes: vec!["bundle_07\\Run.BAT".into(), "bundle_07/./LIB/x.bat".into()],
        edges: vec![edge("bundle_07\\Run.BAT", "bundle_07/./LIB/x.bat", "source", Provenance::Agent)],
        unresolved: vec![],
    };

    let strict = score(&pred, &truth, &ScoreOptions { pred_prefix: "bundle_07/".into(), case_sensitive: true })
        .expect("score");
    assert_eq!(strict.f1_nodes, 0.0);

    let folded = score(&pred, &truth, &ScoreOptions { pred_prefix: "bundle_07/".into(), case_sensitive: false })
        .expect("score");
    assert_eq!(folded.f1_nodes, 1.0);
    assert_eq!(folded.f1_edges, 1.0, "kind does not take part in edge identity");
    assert!(folded.exact_match);
}

#[test]
fn predicted_edge_endpoints_count_as_nodes() {
    let truth = GraphDocument {
        nodes: vec!["a.sh".into(), "b.sh".into()],
        edges: vec![edge("a.sh", "b.sh", "execute", Provenance::Static)],
        unresolved: vec![],
    };
    let pred = GraphDocument {
        nodes: vec![],
        edges: vec![edge("a.sh", "b.sh", "execute", Provenance::Static)],
        unresolved: vec![],
    };
    let result = score(&pred, &truth, &ScoreOptions::default()).expect("score");
    assert_eq!(result.counts.predicted_nodes, 2);
    assert_eq!(result.recall_nodes, 1.0);
}

#[test]
fn malformed_truth_fails_only_that_comparison() {
    let truth = GraphDocument {
        nodes: vec!["a.sh".into()],
        edges: vec![edge("a.sh", "ghost.sh", "execute", Provenance::Static)],
        unresolved: vec![],
    };
    let err = score(&GraphDocument::default(), &truth, &ScoreOptions::default()).expect_err("malformed");
    assert!(matches!(err, ScoreError::MalformedTruth(_)));
    assert!(err.to_string().contains("ghost.sh"));

    let blank = GraphDocument { nodes: vec!["  ".into(), "".into()], edges: vec![], unresolved: vec![] };
    assert!(matches!(
        score(&GraphDocument::default(), &blank, &ScoreOptions::default()),
        Err(ScoreError::MalformedTruth(_))
    ));
}

#[test]
fn documents_load_from_yaml_json_and_empty_files() {
    let dir = tempdir().expect("tempdir");
    let yaml = dir.path().join("pred.yaml");
    fs::write(&yaml, "nodes: [a.sh, b.sh]\nedges:\n  - {src: a.sh, dst: b.sh}\n").expect("write");
    let json = dir.path().join("truth.json");
    fs::write(&json, r#"{"nodes": ["a.sh", "b.sh"], "edges": [{"src": "a.sh", "dst": "b.sh", "kind": "source"}]}"#)
        .expect("write");
    let empty = dir.path().join("empty.yaml");
    fs::write(&empty, "").expect("write");

    let doc = load_document(&yaml).expect("yaml");
    assert_eq!(doc.edges[0].kind, "execute");
    assert_eq!(doc.edges[0].provenance, Provenance::Static);
    assert_eq!(load_document(&empty).expect("empty"), GraphDocument::default());

    let result = score_files(&yaml, &json, &ScoreOptions::default()).expect("score files");
    assert!(result.exact_match);

    let missing = dir.path().join("missing.yaml");
    assert!(matches!(score_files(&missing, &json, &ScoreOptions::default()), Err(ScoreError::Io { .. })));
}

#[test]
fn bench_rows_aggregate_per_label() {
    let text = "\
noise before any row
{\"label\": \"static\", \"bundle\": \"b1\", \"score\": {\"precision_nodes\": 1.0, \"recall_nodes\": 1.0, \"f1_nodes\": 1.0, \"precision_edges\": 1.0, \"recall_edges\": 0.5, \"f1_edges\": 0.5, \"gcr\": 1.0}}
[log] {\"role\": \"static\", \"bundle\": \"b2\", \"score\": {\"precision_nodes\": 1.0, \"recall_nodes\": 1.0, \"f1_nodes\": 0.5, \"precision_edges\": 1.0, \"recall_edges\": 0.5, \"f1_edges\": 0.5, \"gcr\": 0.5}}
{\"bundle\": \"b3\", \"score\": {\"precision_nodes\": 0.0, \"recall_nodes\": 0.0, \"f1_nodes\": 0.0, \"precision_edges\": 0.0, \"recall_edges\": 0.0, \"f1_edges\": 0.0, \"gcr\": 1.0}}
{\"not\": \"a row\"}
";
    let rows = parse_rows(text);
    assert_eq!(rows.len(), 3);

    let summaries = aggregate(&rows, &BenchOptions { resamples: 500, ..BenchOptions::default() });
    let labels: Vec<_> = summaries.iter().map(|s| (s.label.as_str(), s.n)).collect();
    assert_eq!(labels, vec![("static", 2), ("unknown", 1)]);

    let static_row = &summaries[0];
    assert_eq!(static_row.f1_nodes.mean, 0.75);
    assert!(static_row.f1_nodes.ci_low >= 0.5 && static_row.f1_nodes.ci_high <= 1.0);
    assert_eq!(static_row.f1_edges.ci_low, 0.5);
    assert_eq!(static_row.f1_edges.ci_high, 0.5);

    let again = aggregate(&rows, &BenchOptions { resamples: 500, ..BenchOptions::default() });
    assert_eq!(summaries, again, "seeded resampling is reproducible");
}

#[test]
fn bootstrap_interval_brackets_the_mean() {
    let values = [0.2, 0.4, 0.6, 0.8, 1.0];
    let summary = bootstrap_mean(&values, &BenchOptions { resamples: 2_000, seed: 7, alpha: 0.1 });
    assert!((summary.mean - 0.6).abs() < 1e-12);
    assert!(summary.ci_low <= summary.mean && summary.mean <= summary.ci_high);
    assert!(summary.ci_low >= 0.2 && summary.ci_high <= 1.0);
    assert_eq!(bootstrap_mean(&[], &BenchOptions::default()).mean, 0.0);
}

#[test]
fn stats_count_kinds_provenance_and_degrees() {
    let doc: GraphDocument = serde_yaml::from_str(
        "nodes: [a.sh, b.sh, c.py, d.pl]\n\
         edges:\n\
         \x20 - {src: a.sh, dst: b.sh, kind: execute}\n\
         \x20 - {src: a.sh, dst: c.py, kind: interpreter_hop, interpreter: python}\n\
         \x20 - {src: b.sh, dst: c.py, kind: source, provenance: agent}\n\
         unresolved:\n\
         \x20 - {src: d.pl, raw: $x, reason: dynamic_variable, line: 3}\n",
    )
    .expect("yaml");
    let stats = graph_stats(&doc);
    assert_eq!(stats.nodes, 4);
    assert_eq!(stats.edges, 3);
    assert_eq!(stats.edges_by_kind.get("interpreter_hop"), Some(&1));
    assert_eq!(stats.static_edges, 2);
    assert_eq!(stats.agent_edges, 1);
    assert_eq!(stats.unresolved_by_reason.get("dynamic_variable"), Some(&1));
    assert_eq!(stats.top_callers[0].path, "a.sh");
    assert_eq!(stats.top_callers[0].count, 2);
    assert_eq!(stats.top_callees[0].path, "c.py");
}
