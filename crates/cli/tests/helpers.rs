use std::fs;

use scriptgraph::{canonicalize_or_current, default_log_filter};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let original = std::env::current_dir().expect("cwd");
    let tmp = tempdir().expect("tempdir");
    std::env::set_current_dir(tmp.path()).expect("chdir tmp");

    let result = canonicalize_or_current(".").expect("canonicalize").canonicalize().expect("canon");
    let expected = tmp.path().canonicalize().expect("canon tmp");
    assert_eq!(result, expected);

    std::env::set_current_dir(original).expect("restore cwd");
}

#[test]
fn canonicalize_or_current_resolves_existing_absolute_path() {
    let tmp = tempdir().expect("tempdir");
    let subdir = tmp.path().join("bundle");
    fs::create_dir_all(&subdir).expect("create bundle dir");

    let result = canonicalize_or_current(subdir.to_str().expect("utf8")).expect("canonicalize");
    assert_eq!(result, subdir.canonicalize().expect("canonicalize subdir"));
}

#[test]
fn canonicalize_or_current_joins_missing_paths_onto_cwd() {
    let result = canonicalize_or_current("definitely/not/here").expect("fallback");
    assert!(result.is_absolute());
    assert!(result.ends_with("definitely/not/here"));
}

#[test]
fn verbose_enables_debug_for_both_crates() {
    assert_eq!(default_log_filter(false), "warn");
    let verbose = default_log_filter(true);
    assert!(verbose.contains("scriptgraph=debug"));
    assert!(verbose.contains("scriptgraph_core=debug"));
}
