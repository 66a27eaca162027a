//! Path and indirection resolution: one call-site in, one edge or stub out.
//!
//! Resolution never opens the target file. Chains across several scripts
//! come from every file being scanned, not from recursion here.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bundle::{FileIndex, Lookup};
use crate::config::ResolutionConfig;
use crate::model::{CallSite, Dialect, Edge, InvocationKind, Provenance, StubReason, UnresolvedStub};
use crate::paths;
use crate::services::scanners::grammar_for;
use crate::services::scanners::text::{
    has_script_extension, interpreter_target, is_variable_word, split_words, unquote,
};
use crate::symbols::{SymbolTable, UnboundReference};

/// Lookup behavior for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOptions {
    pub case_sensitive: bool,
    /// Retry paths relative to the bundle root when the source directory misses.
    pub root_relative_fallback: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { case_sensitive: true, root_relative_fallback: true }
    }
}

impl From<&ResolutionConfig> for ResolveOptions {
    fn from(cfg: &ResolutionConfig) -> Self {
        Self {
            case_sensitive: cfg.case_sensitive_lookup,
            root_relative_fallback: cfg.root_relative_fallback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Edge(Edge),
    Stub(UnresolvedStub),
}

impl Resolution {
    pub fn as_edge(&self) -> Option<&Edge> {
        match self {
            Resolution::Edge(edge) => Some(edge),
            Resolution::Stub(_) => None,
        }
    }

    pub fn as_stub(&self) -> Option<&UnresolvedStub> {
        match self {
            Resolution::Stub(stub) => Some(stub),
            Resolution::Edge(_) => None,
        }
    }
}

/// Resolve one call-site against its file's symbol table and the bundle index.
pub fn resolve(site: &CallSite, symbols: &SymbolTable, index: &FileIndex, options: &ResolveOptions) -> Resolution {
    let expanded = match symbols.expand(&site.raw_target_expression, site.line) {
        Ok(text) => text,
        Err(unbound) => {
            debug!(source = %site.source_file, line = site.line, name = %unbound.name, "unbound reference");
            return stub(site, StubReason::DynamicVariable);
        }
    };

    let (target, kind) = match command_target(site, &expanded, symbols) {
        Ok(found) => found,
        Err(unbound) => {
            debug!(source = %site.source_file, line = site.line, name = %unbound.name, "unbound reference");
            return stub(site, StubReason::DynamicVariable);
        }
    };
    if target.is_empty() || is_absolute(&target) {
        return stub(site, StubReason::MissingFile);
    }

    let source_dialect = index.dialect_of(&site.source_file).unwrap_or(Dialect::Unknown);
    let found = match locate(&site.source_file, &target, index, options) {
        Lookup::Found(path) => path,
        Lookup::Ambiguous(_) => return stub(site, StubReason::AmbiguousInterpreter),
        Lookup::Missing if has_script_extension(&target) => return stub(site, StubReason::MissingFile),
        Lookup::Missing => {
            let lang = kind.interpreter().unwrap_or(source_dialect);
            match complete(&site.source_file, &target, lang, index, options) {
                Lookup::Found(path) => path,
                Lookup::Ambiguous(_) => return stub(site, StubReason::AmbiguousInterpreter),
                Lookup::Missing => return stub(site, StubReason::MissingFile),
            }
        }
    };

    let target_dialect = index.dialect_of(&found).unwrap_or(Dialect::Unknown);
    Resolution::Edge(Edge {
        source: site.source_file.clone(),
        target: found,
        kind: final_kind(kind, source_dialect, target_dialect),
        provenance: Provenance::Static,
        evidence: vec![site.clone()],
    })
}

/// Script path and kind named by an expanded call-site.
///
/// When the program is a variable followed by arguments (`$PY tools/x.py`),
/// an interpreter in the expansion names the script; otherwise only the
/// program word is the target.
fn command_target(
    site: &CallSite,
    expanded: &str,
    symbols: &SymbolTable,
) -> Result<(String, InvocationKind), UnboundReference> {
    let raw_words = split_words(site.raw_target_expression.trim());
    match raw_words.first() {
        Some(program) if raw_words.len() > 1 && is_variable_word(&program.text) => {
            if interpreter_target(&split_words(expanded.trim())).is_some() {
                return Ok(strip_interpreter_prefix(expanded, site.kind));
            }
            let program = symbols.expand(&program.text, site.line)?;
            Ok(strip_interpreter_prefix(&program, site.kind))
        }
        _ => Ok(strip_interpreter_prefix(expanded, site.kind)),
    }
}

/// A variable may expand to a whole command line (`python tools/x.py`);
/// keep only the script path and let the interpreter set the kind.
fn strip_interpreter_prefix(expanded: &str, kind: InvocationKind) -> (String, InvocationKind) {
    let words = split_words(expanded.trim());
    if words.len() <= 1 {
        let bare = words.first().map(|w| w.text.clone()).unwrap_or_default();
        return (unquote(&bare).to_string(), kind);
    }
    match interpreter_target(&words) {
        Some((lang, idx)) => {
            let kind = match kind {
                InvocationKind::Source => InvocationKind::Source,
                _ => InvocationKind::InterpreterHop { lang },
            };
            (words[idx].text.clone(), kind)
        }
        // A quoted path with spaces stays whole.
        None if words[0].quoted => (words[0].text.clone(), kind),
        None => (unquote(expanded).to_string(), kind),
    }
}

fn is_absolute(target: &str) -> bool {
    let t = target.replace('\\', "/");
    t.starts_with('/') || t.as_bytes().get(1) == Some(&b':') || t.starts_with('~')
}

/// Base directories tried in order: the source file's directory, then the
/// bundle root.
fn bases<'a>(source: &'a str, options: &ResolveOptions) -> Vec<&'a str> {
    let dir = paths::parent_dir(source);
    if options.root_relative_fallback && !dir.is_empty() {
        vec![dir, ""]
    } else {
        vec![dir]
    }
}

fn locate(source: &str, target: &str, index: &FileIndex, options: &ResolveOptions) -> Lookup {
    for base in bases(source, options) {
        let Some(candidate) = paths::join(base, target) else {
            continue;
        };
        match index.lookup(&candidate, options.case_sensitive) {
            Lookup::Missing => continue,
            hit => return hit,
        }
    }
    Lookup::Missing
}

/// Try the interpreter's conventional extensions. More than one hit under
/// the same base directory is ambiguous.
fn complete(source: &str, target: &str, lang: Dialect, index: &FileIndex, options: &ResolveOptions) -> Lookup {
    let Some(grammar) = grammar_for(lang) else {
        return Lookup::Missing;
    };
    for base in bases(source, options) {
        let mut hits: Vec<String> = Vec::new();
        for ext in grammar.completions {
            let Some(candidate) = paths::join(base, &format!("{target}{ext}")) else {
                continue;
            };
            match index.lookup(&candidate, options.case_sensitive) {
                Lookup::Found(path) => hits.push(path),
                Lookup::Ambiguous(paths) => return Lookup::Ambiguous(paths),
                Lookup::Missing => {}
            }
        }
        match hits.len() {
            0 => continue,
            1 => return Lookup::Found(hits.remove(0)),
            _ => return Lookup::Ambiguous(hits),
        }
    }
    Lookup::Missing
}

/// Kind of the final edge.
///
/// An interpreter hop between two files of the interpreter's own dialect is
/// plain execution; plain execution into a file of another dialect is a hop.
fn final_kind(kind: InvocationKind, source: Dialect, target: Dialect) -> InvocationKind {
    match kind {
        InvocationKind::Source => InvocationKind::Source,
        InvocationKind::InterpreterHop { lang } if lang == source && target == source => InvocationKind::Execute,
        InvocationKind::InterpreterHop { lang } => InvocationKind::InterpreterHop { lang },
        InvocationKind::Execute if target != Dialect::Unknown && target != source => {
            InvocationKind::InterpreterHop { lang: target }
        }
        InvocationKind::Execute => InvocationKind::Execute,
    }
}

fn stub(site: &CallSite, reason: StubReason) -> Resolution {
    Resolution::Stub(UnresolvedStub {
        source_file: site.source_file.clone(),
        raw_target_expression: site.raw_target_expression.clone(),
        line: site.line,
        reason,
    })
}
