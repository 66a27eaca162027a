use std::collections::BTreeMap;

use crate::model::Dialect;

/// Outcome of looking a path up in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Exactly one file matched; carries its canonical (case-preserved) path.
    Found(String),
    /// Several files matched case-insensitively.
    Ambiguous(Vec<String>),
    Missing,
}

/// Every file enumerated from a bundle, keyed by canonical relative path.
///
/// Includes files that are not scanned (unknown dialect, over budget) so that
/// they can still be resolved as call targets.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    exact: BTreeMap<String, Dialect>,
    folded: BTreeMap<String, Vec<String>>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, dialect: Dialect) {
        let path = path.into();
        if self.exact.insert(path.clone(), dialect).is_none() {
            let entry = self.folded.entry(path.to_lowercase()).or_default();
            entry.push(path);
            entry.sort();
        }
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.exact.contains_key(path)
    }

    /// Dialect of an indexed path (`Unknown` for non-script files).
    pub fn dialect_of(&self, path: &str) -> Option<Dialect> {
        self.exact.get(path).copied()
    }

    pub fn lookup(&self, path: &str, case_sensitive: bool) -> Lookup {
        if case_sensitive {
            return if self.exact.contains_key(path) {
                Lookup::Found(path.to_string())
            } else {
                Lookup::Missing
            };
        }
        match self.folded.get(&path.to_lowercase()) {
            None => Lookup::Missing,
            Some(hits) if hits.len() == 1 => Lookup::Found(hits[0].clone()),
            Some(hits) => Lookup::Ambiguous(hits.clone()),
        }
    }

    /// Indexed paths in lexicographic order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.exact.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_lookup_reports_collisions() {
        let mut index = FileIndex::new();
        index.insert("lib/Util.sh", Dialect::Shell);
        index.insert("lib/util.sh", Dialect::Shell);
        index.insert("run.bat", Dialect::Batch);

        assert_eq!(index.lookup("RUN.BAT", false), Lookup::Found("run.bat".into()));
        assert_eq!(index.lookup("RUN.BAT", true), Lookup::Missing);
        assert!(matches!(index.lookup("LIB/UTIL.SH", false), Lookup::Ambiguous(hits) if hits.len() == 2));
        assert_eq!(index.lookup("lib/util.sh", true), Lookup::Found("lib/util.sh".into()));
    }
}
