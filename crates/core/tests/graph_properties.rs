use scriptgraph_core::bundle::Bundle;
use scriptgraph_core::model::{Dialect, InvocationKind, Provenance, StubReason};
use scriptgraph_core::paths;
use scriptgraph_core::services::graph::{EdgeRecord, GraphDocument, NodePolicy};
use scriptgraph_core::services::pipeline::{run_scan, ScanOptions};
use scriptgraph_core::services::resolver::{resolve, ResolveOptions};
use scriptgraph_core::services::scanners::analyze;
use scriptgraph_core::services::scoring::{score, ScoreOptions};

fn edge(src: &str, dst: &str) -> EdgeRecord {
    EdgeRecord {
        src: src.into(),
        dst: dst.into(),
        kind: "execute".into(),
        interpreter: None,
        provenance: Provenance::Static,
    }
}

fn doc(nodes: &[&str], edges: &[(&str, &str)]) -> GraphDocument {
    GraphDocument {
        nodes: nodes.iter().map(|n| n.to_string()).collect(),
        edges: edges.iter().map(|(s, d)| edge(s, d)).collect(),
        unresolved: vec![],
    }
}

fn estate() -> Bundle {
    Bundle::from_sources([
        ("run.sh", "UTILS=./utils\nsource ${UTILS}/cleanup.sh\npython3 tools/check.py\n./jobs/nightly.sh\n$UNSET/x.sh\n"),
        ("utils/cleanup.sh", "rm -rf ./tmp\n"),
        ("tools/check.py", "import subprocess\nsubprocess.run(['bash', 'jobs/nightly.sh'])\n"),
        ("jobs/nightly.sh", "perl report.pl\n"),
        ("jobs/report.pl", "system(\"./missing.sh\");\n"),
        ("win/run.bat", "call %DYNAMIC%\ncall helper.bat\n"),
        ("win/helper.bat", "@echo off\n"),
    ])
}

#[test]
fn repeated_scans_are_byte_identical() {
    let bundle = estate();
    let first = run_scan(&bundle, &ScanOptions::default(), None).expect("scan");
    let second = run_scan(&estate(), &ScanOptions { threads: Some(3), ..ScanOptions::default() }, None)
        .expect("scan");

    let a = serde_yaml::to_string(&first.graph.to_document(NodePolicy::All)).expect("yaml");
    let b = serde_yaml::to_string(&second.graph.to_document(NodePolicy::All)).expect("yaml");
    assert_eq!(a, b);
    assert_eq!(first.graph.unresolved, second.graph.unresolved);
}

#[test]
fn normalizing_a_canonical_path_is_a_no_op() {
    for raw in ["./a/b.sh", "a\\b\\..\\c.bat", "x//y/./z.py", "top.pl"] {
        let once = paths::normalize(raw).expect("relative path");
        assert_eq!(paths::normalize(&once).as_deref(), Some(once.as_str()));
    }
}

#[test]
fn resolving_a_call_site_twice_gives_the_same_result() {
    let bundle = estate();
    let options = ResolveOptions::default();
    for file in &bundle.files {
        let (sites, symbols) = analyze(file);
        for site in &sites {
            assert_eq!(
                resolve(site, &symbols, &bundle.index, &options),
                resolve(site, &symbols, &bundle.index, &options)
            );
        }
    }
}

#[test]
fn graph_scored_against_itself_is_perfect() {
    let g = doc(&["a.sh", "b.sh", "c.py"], &[("a.sh", "b.sh"), ("b.sh", "c.py")]);
    let result = score(&g, &g, &ScoreOptions::default()).expect("score");
    assert_eq!(result.precision_nodes, 1.0);
    assert_eq!(result.recall_nodes, 1.0);
    assert_eq!(result.f1_nodes, 1.0);
    assert_eq!(result.precision_edges, 1.0);
    assert_eq!(result.recall_edges, 1.0);
    assert_eq!(result.f1_edges, 1.0);
    assert_eq!(result.gcr, 1.0);
    assert!(result.exact_match);
}

#[test]
fn empty_graphs_score_zero_f1_and_full_coverage() {
    let empty = GraphDocument::default();
    let result = score(&empty, &empty, &ScoreOptions::default()).expect("score");
    assert_eq!(result.f1_nodes, 0.0);
    assert_eq!(result.f1_edges, 0.0);
    assert!(!result.f1_nodes.is_nan());
    assert_eq!(result.gcr, 1.0);
}

#[test]
fn shell_variable_source_resolves_to_bundle_file() {
    let bundle = Bundle::from_sources([
        ("run.sh", "UTILS=./utils\nsource ${UTILS}/cleanup.sh\n"),
        ("utils/cleanup.sh", "echo done\n"),
    ]);
    let (sites, _) = analyze(&bundle.files[0]);
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].kind, InvocationKind::Source);
    assert_eq!(sites[0].raw_target_expression, "${UTILS}/cleanup.sh");

    let report = run_scan(&bundle, &ScanOptions::default(), None).expect("scan");
    let found = report.graph.edge("run.sh", "utils/cleanup.sh").expect("edge");
    assert_eq!(found.kind, InvocationKind::Source);
    assert_eq!(found.provenance, Provenance::Static);
    assert_eq!(report.graph.edges.len(), 1);
    assert!(report.graph.unresolved.is_empty());
}

#[test]
fn python_from_shell_is_an_interpreter_hop() {
    let bundle =
        Bundle::from_sources([("run.sh", "python3 tools/check.py\n"), ("tools/check.py", "print('ok')\n")]);
    let report = run_scan(&bundle, &ScanOptions::default(), None).expect("scan");
    let found = report.graph.edge("run.sh", "tools/check.py").expect("edge");
    assert_eq!(found.kind, InvocationKind::InterpreterHop { lang: Dialect::PythonCli });
}

#[test]
fn unassigned_batch_variable_is_one_dynamic_stub() {
    let bundle = Bundle::from_sources([("run.bat", "call %DYNAMIC%\n")]);
    let report = run_scan(&bundle, &ScanOptions::default(), None).expect("scan");
    assert!(report.graph.edges.is_empty());
    assert_eq!(report.graph.unresolved.len(), 1);
    let stub = &report.graph.unresolved[0];
    assert_eq!(stub.reason, StubReason::DynamicVariable);
    assert_eq!(stub.source_file, "run.bat");
    assert_eq!(stub.raw_target_expression, "%DYNAMIC%");
    assert_eq!(stub.line, 1);
}

#[test]
fn coverage_ratio_credits_discovered_files_without_edges() {
    let truth = doc(&["A", "B", "C"], &[("A", "B"), ("B", "C")]);
    let pred = doc(&["A", "B", "C"], &[("A", "B")]);
    let result = score(&pred, &truth, &ScoreOptions::default()).expect("score");
    assert_eq!(result.gcr, 1.0);
    assert!(result.f1_edges < 1.0);
    assert_eq!(result.counts.covered_truth_edges, 2);
    assert!(!result.exact_match);
}

#[test]
fn estate_scan_reports_every_unresolved_site() {
    let report = run_scan(&estate(), &ScanOptions::default(), None).expect("scan");
    let reasons: Vec<_> =
        report.graph.unresolved.iter().map(|s| (s.source_file.as_str(), s.reason)).collect();
    assert!(reasons.contains(&("run.sh", StubReason::DynamicVariable)));
    assert!(reasons.contains(&("win/run.bat", StubReason::DynamicVariable)));
    assert!(reasons.contains(&("jobs/report.pl", StubReason::MissingFile)));
    assert_eq!(
        report.graph.edge("win/run.bat", "win/helper.bat").map(|e| e.kind),
        Some(InvocationKind::Execute)
    );
    assert_eq!(
        report.graph.edge("jobs/nightly.sh", "jobs/report.pl").map(|e| e.kind),
        Some(InvocationKind::InterpreterHop { lang: Dialect::Perl })
    );
}
