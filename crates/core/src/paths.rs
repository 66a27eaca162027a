//! Canonical bundle-relative path handling.
//!
//! A canonical path uses `/` separators, has no empty, `.` or `..` segments,
//! no leading `./`, and preserves case. Node identity is derived from the
//! canonical path, lowercased when case-insensitive matching is configured.

/// Normalize a bundle-relative path.
///
/// Returns `None` when the path is absolute or climbs above the bundle root,
/// since such targets can never be part of the bundle.
pub fn normalize(path: &str) -> Option<String> {
    let s = path.replace('\\', "/");
    if s.starts_with('/') || has_drive_prefix(&s) {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for seg in s.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Join `rel` onto the directory `dir` (itself canonical) and normalize.
pub fn join(dir: &str, rel: &str) -> Option<String> {
    let rel = rel.replace('\\', "/");
    if rel.starts_with('/') || has_drive_prefix(&rel) {
        return None;
    }
    if dir.is_empty() {
        normalize(&rel)
    } else {
        normalize(&format!("{dir}/{rel}"))
    }
}

/// Directory part of a canonical path (`""` for files at the bundle root).
pub fn parent_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    }
}

/// File extension including the leading dot, if any.
pub fn extension(path: &str) -> Option<&str> {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.rfind('.').filter(|&i| i > 0).map(|i| &name[i..])
}

/// Lenient canonicalization used when comparing externally produced graphs.
///
/// Unlike [`normalize`], leading `/` and excess `..` segments are dropped
/// rather than rejected, so every input maps to some key.
pub fn canonical_key(path: &str, case_sensitive: bool) -> String {
    let s = path.trim().replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for seg in s.split('/') {
        match seg {
            "" | "." => continue,
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if case_sensitive {
        joined
    } else {
        joined.to_lowercase()
    }
}

/// Identity key for a canonical node path.
pub fn node_key(path: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        path.to_string()
    } else {
        path.to_lowercase()
    }
}

/// Strip a leading directory prefix (e.g. `bundle_01/`) from a path.
///
/// The prefix is compared after canonicalization; paths without the prefix
/// are returned unchanged.
pub fn strip_prefix(path: &str, prefix: &str, case_sensitive: bool) -> String {
    let canon_path = canonical_key(path, true);
    let canon_prefix = canonical_key(prefix, true);
    if canon_prefix.is_empty() {
        return canon_path;
    }
    let path_segs: Vec<&str> = canon_path.split('/').collect();
    let prefix_segs: Vec<&str> = canon_prefix.split('/').collect();
    if prefix_segs.len() > path_segs.len() {
        return canon_path;
    }
    let matches = path_segs.iter().zip(&prefix_segs).all(|(a, b)| {
        if case_sensitive {
            a == b
        } else {
            a.to_lowercase() == b.to_lowercase()
        }
    });
    if !matches {
        return canon_path;
    }
    path_segs[prefix_segs.len()..].join("/")
}

/// `C:` style prefixes mark Windows absolute paths.
fn has_drive_prefix(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_resolves_dots_and_separators() {
        assert_eq!(normalize("./a/./b/../c.sh").as_deref(), Some("a/c.sh"));
        assert_eq!(normalize("a\\b\\c.bat").as_deref(), Some("a/b/c.bat"));
        assert_eq!(normalize("a//b.sh").as_deref(), Some("a/b.sh"));
        assert_eq!(normalize("../outside.sh"), None);
        assert_eq!(normalize("/etc/profile"), None);
        assert_eq!(normalize("C:\\tools\\x.bat"), None);
    }

    #[test]
    fn normalize_is_idempotent() {
        for p in ["a/b.sh", "Tools/Check.py", "x.bat", ""] {
            let once = normalize(p).expect("canonical input");
            assert_eq!(normalize(&once).as_deref(), Some(once.as_str()));
        }
    }

    #[test]
    fn join_uses_source_directory() {
        assert_eq!(join("jobs", "../lib/x.sh").as_deref(), Some("lib/x.sh"));
        assert_eq!(join("", "x.sh").as_deref(), Some("x.sh"));
        assert_eq!(join("a", "/abs.sh"), None);
    }

    #[test]
    fn strip_prefix_only_strips_whole_segments() {
        assert_eq!(strip_prefix("bundle/a.sh", "bundle", true), "a.sh");
        assert_eq!(strip_prefix("./bundle/a.sh", "bundle/", true), "a.sh");
        assert_eq!(strip_prefix("bundle2/a.sh", "bundle", true), "bundle2/a.sh");
        assert_eq!(strip_prefix("Bundle/a.sh", "bundle", false), "a.sh");
        assert_eq!(strip_prefix("bundle", "bundle", true), "");
    }

    #[test]
    fn strip_prefix_folds_non_ascii_segments() {
        // Lowercasing 'İ' changes its byte length.
        assert_eq!(strip_prefix("İ/éa.sh", "İ", false), "éa.sh");
        assert_eq!(strip_prefix("İ/ab.sh", "İ", false), "ab.sh");
        assert_eq!(strip_prefix("ÉTAPE/Run.bat", "étape", false), "Run.bat");
        assert_eq!(strip_prefix("ÉTAPE/Run.bat", "étape", true), "ÉTAPE/Run.bat");
    }

    #[test]
    fn extension_ignores_dotfiles() {
        assert_eq!(extension("a/b.sh"), Some(".sh"));
        assert_eq!(extension("a/.profile"), None);
        assert_eq!(extension("a.d/run"), None);
    }
}
