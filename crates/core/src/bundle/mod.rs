//! Bundle enumeration: a filesystem subtree turned into a sorted list of
//! dialect-tagged script files plus an index of every file present.

mod index;
mod seeds;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use thiserror::Error;
use tracing::{debug, warn};

pub use index::{FileIndex, Lookup};
pub use seeds::{detect_windows_bundle, load_seeds, parse_seed_lines, BUNDLE_META_FILE, SEED_FILES};

use crate::config::ScanConfig;
use crate::model::{Dialect, ScriptFile, SkipReason, SkippedFile};
use crate::paths;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Bundle root not found or not a directory: {0}")]
    MissingRoot(PathBuf),

    #[error("Invalid ignore pattern '{pattern}': {source}")]
    IgnorePattern {
        pattern: String,
        #[source]
        source: ignore::Error,
    },
}

/// The fixed set of files for one scan invocation.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    pub root: Option<PathBuf>,
    /// Files to scan, sorted by canonical relative path.
    pub files: Vec<ScriptFile>,
    /// Enumerated files that will not be scanned, with the reason.
    pub skipped: Vec<SkippedFile>,
    pub index: FileIndex,
}

impl Bundle {
    /// Build a bundle from in-memory sources. Paths are normalized and sorted.
    pub fn from_files(files: impl IntoIterator<Item = ScriptFile>) -> Self {
        let mut index = FileIndex::new();
        let mut out = Vec::new();
        for mut file in files {
            if let Some(canonical) = paths::normalize(&file.relative_path) {
                file.relative_path = canonical;
                index.insert(file.relative_path.clone(), file.dialect);
                out.push(file);
            }
        }
        out.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        out.dedup_by(|a, b| a.relative_path == b.relative_path);
        Self { root: None, files: out, skipped: Vec::new(), index }
    }

    /// Build a bundle from `(path, text)` pairs, detecting each dialect from
    /// the extension or, for extension-less files, the shebang.
    ///
    /// Unknown-dialect sources are indexed and reported as skipped.
    pub fn from_sources<I, P, T>(sources: I) -> Self
    where
        I: IntoIterator<Item = (P, T)>,
        P: AsRef<str>,
        T: Into<String>,
    {
        let mut scripts = Vec::new();
        let mut others = Vec::new();
        for (path, text) in sources {
            let path = path.as_ref();
            let text = text.into();
            let dialect = match paths::extension(path) {
                Some(ext) => Dialect::from_extension(ext),
                None => Dialect::from_shebang(text.lines().next().unwrap_or("")),
            };
            if dialect == Dialect::Unknown {
                others.push(path.to_string());
            } else {
                scripts.push(ScriptFile::new(path, dialect, text));
            }
        }
        let mut bundle = Self::from_files(scripts).with_indexed(&others);
        for path in others.iter().filter_map(|p| paths::normalize(p)) {
            bundle.skipped.push(SkippedFile { path, reason: SkipReason::UnknownDialect });
        }
        bundle.skipped.sort_by(|a, b| a.path.cmp(&b.path));
        bundle
    }

    /// Register additional present-but-unscanned files (data files, binaries).
    pub fn with_indexed<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for path in extra {
            if let Some(canonical) = paths::normalize(path.as_ref()) {
                let dialect = dialect_for_path(&canonical);
                self.index.insert(canonical, dialect);
            }
        }
        self
    }

    /// Walk `root` and classify every file.
    ///
    /// Unreadable and unknown-dialect files are recorded in `skipped`, never
    /// fatal. When `config.runtime.file_budget` is set, `seeds` are kept
    /// first and the remaining budget is filled in lexicographic order.
    pub fn discover(root: &Path, config: &ScanConfig, seeds: &[String]) -> Result<Self, BundleError> {
        if !root.is_dir() {
            return Err(BundleError::MissingRoot(root.to_path_buf()));
        }

        let mut overrides = OverrideBuilder::new(root);
        for pattern in [".git/", BUNDLE_META_FILE, SEED_FILES[0], SEED_FILES[1]] {
            let glob = format!("!/{pattern}");
            overrides
                .add(&glob)
                .map_err(|source| BundleError::IgnorePattern { pattern: glob.clone(), source })?;
        }
        for pattern in &config.parsing.ignore {
            let glob = format!("!{pattern}");
            overrides
                .add(&glob)
                .map_err(|source| BundleError::IgnorePattern { pattern: pattern.clone(), source })?;
        }
        let overrides = overrides
            .build()
            .map_err(|source| BundleError::IgnorePattern { pattern: "<ignore list>".into(), source })?;

        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .overrides(overrides)
            .build();

        let mut relative: Vec<(String, PathBuf)> = Vec::new();
        let mut skipped = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable walk entry");
                    continue;
                }
            };
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let abs = entry.path().to_path_buf();
            let Ok(rel) = abs.strip_prefix(root) else {
                continue;
            };
            match rel.to_str().and_then(paths::normalize) {
                Some(canonical) => relative.push((canonical, abs)),
                None => {
                    let shown = rel.to_string_lossy().replace('\\', "/");
                    warn!(path = %shown, "skipping file with non UTF-8 name");
                    skipped.push(SkippedFile { path: shown, reason: SkipReason::Unreadable });
                }
            }
        }
        relative.sort_by(|a, b| a.0.cmp(&b.0));

        let mut index = FileIndex::new();
        let mut files = Vec::new();
        for (rel, abs) in relative {
            match classify(&rel, &abs, config) {
                Classified::Script(dialect, raw_text) => {
                    index.insert(rel.clone(), dialect);
                    files.push(ScriptFile::new(rel, dialect, raw_text));
                }
                Classified::Skip(dialect, reason) => {
                    debug!(path = %rel, reason = reason.as_str(), "skipping file");
                    index.insert(rel.clone(), dialect);
                    skipped.push(SkippedFile { path: rel, reason });
                }
            }
        }

        let (files, over_budget) = apply_budget(
            files,
            seeds,
            config.runtime.file_budget,
            config.resolution.case_sensitive_lookup,
        );
        for file in over_budget {
            skipped.push(SkippedFile { path: file.relative_path, reason: SkipReason::OverBudget });
        }
        skipped.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(Self { root: Some(root.to_path_buf()), files, skipped, index })
    }

    /// Number of enumerated files, scanned or not.
    pub fn total_files(&self) -> usize {
        self.files.len() + self.skipped.len()
    }
}

enum Classified {
    Script(Dialect, String),
    Skip(Dialect, SkipReason),
}

fn classify(rel: &str, abs: &Path, config: &ScanConfig) -> Classified {
    let by_ext = match paths::extension(rel) {
        Some(ext) if config.includes_extension(ext) => Some(Dialect::from_extension(ext)),
        Some(ext) => return Classified::Skip(Dialect::from_extension(ext), SkipReason::UnknownDialect),
        None => None,
    };
    if by_ext == Some(Dialect::Unknown) {
        return Classified::Skip(Dialect::Unknown, SkipReason::UnknownDialect);
    }

    let bytes = match fs::read(abs) {
        Ok(b) => b,
        Err(err) => {
            warn!(path = %rel, error = %err, "failed to read file");
            return Classified::Skip(by_ext.unwrap_or(Dialect::Unknown), SkipReason::Unreadable);
        }
    };
    let text = match String::from_utf8(bytes) {
        Ok(t) => t,
        Err(_) => {
            warn!(path = %rel, "file is not valid UTF-8");
            return Classified::Skip(by_ext.unwrap_or(Dialect::Unknown), SkipReason::Unreadable);
        }
    };

    let dialect = match by_ext {
        Some(d) => d,
        None => Dialect::from_shebang(text.lines().next().unwrap_or("")),
    };
    if dialect == Dialect::Unknown {
        return Classified::Skip(Dialect::Unknown, SkipReason::UnknownDialect);
    }
    Classified::Script(dialect, text)
}

fn dialect_for_path(path: &str) -> Dialect {
    paths::extension(path).map(Dialect::from_extension).unwrap_or(Dialect::Unknown)
}

/// Truncate `files` to `budget`, keeping seeds first.
///
/// Returns the kept files (re-sorted lexicographically) and the dropped ones.
/// Without a budget every file is kept and seeds have no effect.
pub fn apply_budget(
    files: Vec<ScriptFile>,
    seeds: &[String],
    budget: Option<usize>,
    case_sensitive: bool,
) -> (Vec<ScriptFile>, Vec<ScriptFile>) {
    let Some(budget) = budget else {
        return (files, Vec::new());
    };
    if files.len() <= budget {
        return (files, Vec::new());
    }

    let seed_keys: Vec<String> = seeds
        .iter()
        .filter_map(|s| paths::normalize(s))
        .map(|s| paths::node_key(&s, case_sensitive))
        .collect();

    let mut chosen: BTreeSet<usize> = BTreeSet::new();
    for key in &seed_keys {
        if chosen.len() >= budget {
            break;
        }
        if let Some(pos) =
            files.iter().position(|f| &paths::node_key(&f.relative_path, case_sensitive) == key)
        {
            chosen.insert(pos);
        }
    }
    for pos in 0..files.len() {
        if chosen.len() >= budget {
            break;
        }
        chosen.insert(pos);
    }

    let mut kept = Vec::with_capacity(budget);
    let mut dropped = Vec::new();
    for (pos, file) in files.into_iter().enumerate() {
        if chosen.contains(&pos) {
            kept.push(file);
        } else {
            dropped.push(file);
        }
    }
    (kept, dropped)
}
