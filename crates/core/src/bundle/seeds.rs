use std::fs;
use std::path::Path;

use serde::Deserialize;

/// Files at the bundle root that list seed paths, checked in order.
pub const SEED_FILES: [&str; 2] = ["seeds.txt", ".seeds"];

/// Optional bundle metadata (`{"platform": "windows"}`).
pub const BUNDLE_META_FILE: &str = "meta.json";

/// Read the seed list for a bundle, if one exists.
///
/// One relative path per line; blank lines and `#` comments are ignored.
/// Returns an empty list when no seed file is present or readable.
pub fn load_seeds(root: &Path) -> Vec<String> {
    for name in SEED_FILES {
        let path = root.join(name);
        if let Ok(text) = fs::read_to_string(&path) {
            return parse_seed_lines(&text);
        }
    }
    Vec::new()
}

/// Parse a seed list: one path per line, `#` comments and blanks skipped.
pub fn parse_seed_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| {
            let s = l.replace('\\', "/");
            s.strip_prefix("./").map(str::to_string).unwrap_or(s)
        })
        .collect()
}

#[derive(Deserialize)]
struct BundleMeta {
    #[serde(default)]
    platform: Option<String>,
}

/// True when the bundle declares itself Windows-only in `meta.json`.
///
/// Windows bundles resolve and score paths case-insensitively.
pub fn detect_windows_bundle(root: &Path) -> bool {
    let Ok(text) = fs::read_to_string(root.join(BUNDLE_META_FILE)) else {
        return false;
    };
    match serde_json::from_str::<BundleMeta>(&text) {
        Ok(meta) => meta.platform.map(|p| p.eq_ignore_ascii_case("windows")).unwrap_or(false),
        Err(_) => false,
    }
}
