use scriptgraph_core::config::{ConfigError, ScanConfig};
use tempfile::tempdir;

#[test]
fn empty_document_is_the_default_configuration() {
    let config = ScanConfig::from_yaml_str("").expect("parse");
    assert_eq!(config, ScanConfig::default());
    config.validate().expect("defaults are valid");
    assert!(config.includes_extension(".PS1"));
    assert!(!config.includes_extension(".txt"));
}

#[test]
fn partial_documents_keep_other_defaults() {
    let config = ScanConfig::from_yaml_str("runtime:\n  threads: 2\nscoring:\n  pred_prefix: bundle_01/\n")
        .expect("parse");
    assert_eq!(config.runtime.threads, Some(2));
    assert_eq!(config.scoring.pred_prefix, "bundle_01/");
    assert!(config.resolution.case_sensitive_lookup);
    assert!(config.resolution.root_relative_fallback);
}

#[test]
fn invalid_combinations_fail_before_scanning() {
    let cases = [
        ("parsing:\n  include_ext: []\n", "include_ext must not be empty"),
        ("parsing:\n  include_ext: [sh]\n", "must start with '.'"),
        ("runtime:\n  file_budget: 0\n", "file_budget"),
        ("runtime:\n  threads: 0\n", "threads"),
        ("resolution:\n  case_sensitive_nodes: false\n", "case_sensitive_nodes"),
        ("parsing:\n  ignore: [\"a/[\"]\n", "Invalid ignore pattern"),
    ];
    for (yaml, needle) in cases {
        let config = ScanConfig::from_yaml_str(yaml).expect("parse");
        let err = config.validate().expect_err(yaml);
        assert!(err.to_string().contains(needle), "{yaml}: {err}");
    }
}

#[test]
fn case_insensitive_switch_is_consistent() {
    let config = ScanConfig::default().case_insensitive();
    config.validate().expect("valid");
    assert!(!config.resolution.case_sensitive_lookup);
    assert!(!config.resolution.case_sensitive_nodes);
    assert!(config.scoring.case_insensitive);
}

#[test]
fn hash_is_short_and_tracks_content() {
    let a = ScanConfig::default();
    let b = ScanConfig::default().case_insensitive();
    assert_eq!(a.hash().len(), 12);
    assert_eq!(a.hash(), ScanConfig::default().hash());
    assert_ne!(a.hash(), b.hash());
}

#[test]
fn load_reports_missing_and_malformed_files() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("absent.yaml");
    assert!(matches!(ScanConfig::load(&missing), Err(ConfigError::Io { .. })));

    let bad = dir.path().join("bad.yaml");
    std::fs::write(&bad, "runtime: [1, 2\n").expect("write");
    assert!(matches!(ScanConfig::load(&bad), Err(ConfigError::Parse { .. })));

    let good = dir.path().join("good.json");
    std::fs::write(&good, r#"{"resolution": {"root_relative_fallback": false}}"#).expect("write");
    let config = ScanConfig::load(&good).expect("load json");
    assert!(!config.resolution.root_relative_fallback);
}
