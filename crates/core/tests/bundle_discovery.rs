use std::fs;
use std::path::Path;

use scriptgraph_core::bundle::{detect_windows_bundle, load_seeds, Bundle, BundleError};
use scriptgraph_core::config::ScanConfig;
use scriptgraph_core::model::{Dialect, SkipReason};
use tempfile::tempdir;

fn write(root: &Path, rel: &str, contents: &[u8]) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}

#[test]
fn discovery_sorts_classifies_and_records_skips() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    write(root, "run.sh", b"./lib/helper.sh\n");
    write(root, "lib/helper.sh", b"echo hi\n");
    write(root, "tool", b"#!/usr/bin/env python3\nprint('x')\n");
    write(root, "README.txt", b"docs\n");
    write(root, "noshebang", b"plain text\n");
    write(root, "broken.pl", &[0xff, 0xfe, 0x00, 0x41]);

    let bundle = Bundle::discover(root, &ScanConfig::default(), &[]).expect("discover");

    let files: Vec<_> = bundle.files.iter().map(|f| (f.relative_path.as_str(), f.dialect)).collect();
    assert_eq!(
        files,
        vec![("lib/helper.sh", Dialect::Shell), ("run.sh", Dialect::Shell), ("tool", Dialect::PythonCli)]
    );

    let skipped: Vec<_> = bundle.skipped.iter().map(|s| (s.path.as_str(), s.reason)).collect();
    assert_eq!(
        skipped,
        vec![
            ("README.txt", SkipReason::UnknownDialect),
            ("broken.pl", SkipReason::Unreadable),
            ("noshebang", SkipReason::UnknownDialect),
        ]
    );
    assert!(bundle.index.contains("README.txt"), "unscanned files stay in the index");
    assert_eq!(bundle.total_files(), 6);
}

#[test]
fn ignore_patterns_and_metadata_files_are_not_enumerated() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    write(root, "run.sh", b"echo\n");
    write(root, "vendor/dep.sh", b"echo\n");
    write(root, "meta.json", br#"{"platform": "windows"}"#);
    write(root, "seeds.txt", b"run.sh\n");

    let config = ScanConfig::from_yaml_str("parsing:\n  ignore: [\"vendor/\"]\n").expect("config");
    let bundle = Bundle::discover(root, &config, &[]).expect("discover");

    assert_eq!(bundle.files.len(), 1);
    assert!(bundle.skipped.is_empty());
    assert!(!bundle.index.contains("vendor/dep.sh"));
    assert!(!bundle.index.contains("meta.json"));
}

#[test]
fn budget_keeps_seeds_first_and_reports_the_rest() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path();
    for name in ["a.sh", "b.sh", "c.sh", "z.sh"] {
        write(root, name, b"echo\n");
    }
    write(root, "seeds.txt", b"# entry\n./z.sh\n");

    let seeds = load_seeds(root);
    assert_eq!(seeds, vec!["z.sh".to_string()]);

    let config = ScanConfig::from_yaml_str("runtime:\n  file_budget: 2\n").expect("config");
    let bundle = Bundle::discover(root, &config, &seeds).expect("discover");
    let kept: Vec<_> = bundle.files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(kept, vec!["a.sh", "z.sh"]);

    let over: Vec<_> = bundle
        .skipped
        .iter()
        .filter(|s| s.reason == SkipReason::OverBudget)
        .map(|s| s.path.as_str())
        .collect();
    assert_eq!(over, vec!["b.sh", "c.sh"]);
}

#[test]
fn windows_metadata_is_detected() {
    let dir = tempdir().expect("tempdir");
    assert!(!detect_windows_bundle(dir.path()));
    write(dir.path(), "meta.json", br#"{"platform": "Windows"}"#);
    assert!(detect_windows_bundle(dir.path()));
    write(dir.path(), "meta.json", br#"{"platform": "linux"}"#);
    assert!(!detect_windows_bundle(dir.path()));
}

#[test]
fn missing_root_is_an_error() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("nope");
    match Bundle::discover(&missing, &ScanConfig::default(), &[]) {
        Err(BundleError::MissingRoot(path)) => assert_eq!(path, missing),
        other => panic!("expected MissingRoot, got {other:?}"),
    }
}

#[test]
fn in_memory_sources_detect_dialects() {
    let bundle = Bundle::from_sources([
        ("jobs\\Nightly.BAT", "call x.bat\n"),
        ("bin/tool", "#!/bin/sh\n./x.sh\n"),
        ("data.csv", "a,b\n"),
    ]);
    let files: Vec<_> = bundle.files.iter().map(|f| (f.relative_path.as_str(), f.dialect)).collect();
    assert_eq!(files, vec![("bin/tool", Dialect::Shell), ("jobs/Nightly.BAT", Dialect::Batch)]);
    assert_eq!(bundle.skipped.len(), 1);
    assert_eq!(bundle.skipped[0].reason, SkipReason::UnknownDialect);
    assert!(bundle.index.contains("data.csv"));
}
