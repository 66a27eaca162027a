//! Dialect scanners.
//!
//! Each dialect is an independent entry in a dispatch table keyed by
//! [`Dialect`]: a scan function producing call-sites, a binding collector
//! producing the file's [`SymbolTable`], and the extension completions the
//! resolver may try for targets written without one. Scanners are pure
//! functions of the file text; scanning the same file twice yields the same
//! call-sites in the same order.
//!
//! When one command matches several rules, an interpreter hop naming a known
//! interpreter wins; otherwise the first rule in the dialect's documented
//! priority order wins. Each command yields at most one call-site.

mod batch;
mod perl;
mod powershell;
mod python_cli;
mod shell;
pub mod text;

use crate::model::{CallSite, Dialect, ScriptFile};
use crate::symbols::{ReferenceSyntax, SymbolTable};

use self::text::LogicalLine;

/// Per-dialect entry in the dispatch table.
pub struct DialectGrammar {
    pub dialect: Dialect,
    pub syntax: ReferenceSyntax,
    /// Split raw text into comment-free logical lines.
    pub lines: fn(&str) -> Vec<LogicalLine>,
    /// Extract call-sites from the logical lines of one file.
    pub scan: fn(&str, &[LogicalLine]) -> Vec<CallSite>,
    /// Record assignments into the file's symbol table.
    pub bind: fn(&[LogicalLine], &mut SymbolTable),
    /// Extensions tried, in order, when a target written without one misses.
    pub completions: &'static [&'static str],
}

static SHELL: DialectGrammar = DialectGrammar {
    dialect: Dialect::Shell,
    syntax: ReferenceSyntax::Shell,
    lines: shell::lines,
    scan: shell::scan,
    bind: shell::bind,
    completions: &[".sh", ".bash", ".ksh"],
};

static BATCH: DialectGrammar = DialectGrammar {
    dialect: Dialect::Batch,
    syntax: ReferenceSyntax::Batch,
    lines: batch::lines,
    scan: batch::scan,
    bind: batch::bind,
    completions: &[".bat", ".cmd"],
};

static POWERSHELL: DialectGrammar = DialectGrammar {
    dialect: Dialect::PowerShell,
    syntax: ReferenceSyntax::PowerShell,
    lines: powershell::lines,
    scan: powershell::scan,
    bind: powershell::bind,
    completions: &[".ps1", ".psm1"],
};

static PERL: DialectGrammar = DialectGrammar {
    dialect: Dialect::Perl,
    syntax: ReferenceSyntax::Perl,
    lines: perl::lines,
    scan: perl::scan,
    bind: perl::bind,
    completions: &[".pl", ".pm"],
};

static PYTHON: DialectGrammar = DialectGrammar {
    dialect: Dialect::PythonCli,
    syntax: ReferenceSyntax::Python,
    lines: python_cli::lines,
    scan: python_cli::scan,
    bind: python_cli::bind,
    completions: &[".py"],
};

/// Look up the grammar for a dialect. `Unknown` has none.
pub fn grammar_for(dialect: Dialect) -> Option<&'static DialectGrammar> {
    match dialect {
        Dialect::Shell => Some(&SHELL),
        Dialect::Batch => Some(&BATCH),
        Dialect::PowerShell => Some(&POWERSHELL),
        Dialect::Perl => Some(&PERL),
        Dialect::PythonCli => Some(&PYTHON),
        Dialect::Unknown => None,
    }
}

/// Extract candidate call-sites from one file.
pub fn scan(file: &ScriptFile) -> Vec<CallSite> {
    match grammar_for(file.dialect) {
        Some(grammar) => {
            let lines = (grammar.lines)(&file.raw_text);
            (grammar.scan)(&file.relative_path, &lines)
        }
        None => Vec::new(),
    }
}

/// Build the file's symbol table in one forward pass.
pub fn build_symbols(file: &ScriptFile) -> SymbolTable {
    match grammar_for(file.dialect) {
        Some(grammar) => {
            let mut table = SymbolTable::new(grammar.syntax);
            let lines = (grammar.lines)(&file.raw_text);
            (grammar.bind)(&lines, &mut table);
            table
        }
        None => SymbolTable::new(ReferenceSyntax::Shell),
    }
}

/// Scan and build symbols from a single split of the text.
pub fn analyze(file: &ScriptFile) -> (Vec<CallSite>, SymbolTable) {
    match grammar_for(file.dialect) {
        Some(grammar) => {
            let lines = (grammar.lines)(&file.raw_text);
            let mut table = SymbolTable::new(grammar.syntax);
            (grammar.bind)(&lines, &mut table);
            ((grammar.scan)(&file.relative_path, &lines), table)
        }
        None => (Vec::new(), SymbolTable::new(ReferenceSyntax::Shell)),
    }
}

/// Build a call-site; shared by all scanners.
pub(crate) fn call_site(
    source: &str,
    line: &LogicalLine,
    target: &str,
    kind: crate::model::InvocationKind,
    confidence: crate::model::Confidence,
) -> CallSite {
    CallSite {
        source_file: source.to_string(),
        raw_target_expression: target.trim().to_string(),
        line: line.number,
        kind,
        confidence,
    }
}
