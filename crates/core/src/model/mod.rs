//! Core data model for script files, call-sites, edges, and stubs.
//!
//! Every path stored in these types is a canonical bundle-relative path
//! (forward slashes, no `.`/`..` segments, case preserved). Identity of a
//! script file is its relative path.

use serde::{Deserialize, Serialize};

/// Scripting grammar family of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Dialect {
    #[serde(rename = "shell")]
    Shell,
    #[serde(rename = "batch")]
    Batch,
    #[serde(rename = "powershell")]
    PowerShell,
    #[serde(rename = "perl")]
    Perl,
    #[serde(rename = "python")]
    PythonCli,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Dialect {
    /// Every dialect that has a scanner, in a stable order.
    pub const SCANNABLE: [Dialect; 5] =
        [Dialect::Shell, Dialect::Batch, Dialect::PowerShell, Dialect::Perl, Dialect::PythonCli];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Shell => "shell",
            Dialect::Batch => "batch",
            Dialect::PowerShell => "powershell",
            Dialect::Perl => "perl",
            Dialect::PythonCli => "python",
            Dialect::Unknown => "unknown",
        }
    }

    /// Classify by file extension (leading dot optional, case-insensitive).
    pub fn from_extension(ext: &str) -> Dialect {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "sh" | "bash" | "ksh" | "zsh" => Dialect::Shell,
            "bat" | "cmd" => Dialect::Batch,
            "ps1" | "psm1" => Dialect::PowerShell,
            "pl" | "pm" => Dialect::Perl,
            "py" => Dialect::PythonCli,
            _ => Dialect::Unknown,
        }
    }

    /// Classify by the interpreter named on a `#!` line.
    pub fn from_shebang(line: &str) -> Dialect {
        let Some(rest) = line.strip_prefix("#!") else {
            return Dialect::Unknown;
        };
        let mut words = rest.split_whitespace();
        let Some(first) = words.next() else {
            return Dialect::Unknown;
        };
        let program = first.rsplit('/').next().unwrap_or(first);
        // `#!/usr/bin/env python3` names the interpreter in the second word.
        let program = if program == "env" {
            match words.find(|w| !w.starts_with('-')) {
                Some(p) => p,
                None => return Dialect::Unknown,
            }
        } else {
            program
        };
        Dialect::from_interpreter(program).unwrap_or(Dialect::Unknown)
    }

    /// Map an interpreter program name (`bash`, `python3`, `pwsh.exe`, ...) to its dialect.
    pub fn from_interpreter(program: &str) -> Option<Dialect> {
        let lower = program.to_ascii_lowercase();
        let name = lower.strip_suffix(".exe").unwrap_or(&lower);
        match name {
            "sh" | "bash" | "ksh" | "zsh" | "dash" => Some(Dialect::Shell),
            "cmd" => Some(Dialect::Batch),
            "powershell" | "pwsh" => Some(Dialect::PowerShell),
            "perl" => Some(Dialect::Perl),
            _ if is_python_program(name) => Some(Dialect::PythonCli),
            _ => None,
        }
    }
}

/// `python`, `python3`, `python3.11`, `py`.
fn is_python_program(name: &str) -> bool {
    if name == "py" {
        return true;
    }
    match name.strip_prefix("python") {
        Some(rest) => rest.chars().all(|c| c.is_ascii_digit() || c == '.'),
        None => false,
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A script file in a bundle. Immutable once scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFile {
    pub relative_path: String,
    pub dialect: Dialect,
    pub raw_text: String,
}

impl ScriptFile {
    pub fn new(relative_path: impl Into<String>, dialect: Dialect, raw_text: impl Into<String>) -> Self {
        Self { relative_path: relative_path.into(), dialect, raw_text: raw_text.into() }
    }
}

/// How one script reaches another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    /// Spawns the target as a child process.
    Execute,
    /// Dot-sources / includes the target into the current context.
    Source,
    /// Runs the target through an explicitly named interpreter of another dialect.
    InterpreterHop { lang: Dialect },
}

impl InvocationKind {
    /// Specificity rank used when two call-sites produce the same edge.
    pub fn rank(&self) -> u8 {
        match self {
            InvocationKind::InterpreterHop { .. } => 3,
            InvocationKind::Source => 2,
            InvocationKind::Execute => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationKind::Execute => "execute",
            InvocationKind::Source => "source",
            InvocationKind::InterpreterHop { .. } => "interpreter_hop",
        }
    }

    pub fn interpreter(&self) -> Option<Dialect> {
        match self {
            InvocationKind::InterpreterHop { lang } => Some(*lang),
            _ => None,
        }
    }

    /// Rebuild a kind from its label and optional interpreter dialect.
    pub fn from_parts(kind: &str, interpreter: Option<Dialect>) -> Option<InvocationKind> {
        match kind {
            "execute" | "call" => Some(InvocationKind::Execute),
            "source" => Some(InvocationKind::Source),
            "interpreter_hop" => {
                Some(InvocationKind::InterpreterHop { lang: interpreter.unwrap_or(Dialect::Unknown) })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Static,
    Heuristic,
}

/// A textual location where one script appears to invoke or include another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub source_file: String,
    /// Target as written, possibly still containing variable references.
    pub raw_target_expression: String,
    /// 1-based line number.
    pub line: usize,
    pub kind: InvocationKind,
    pub confidence: Confidence,
}

/// Where an edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Static,
    Agent,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Static => "static",
            Provenance::Agent => "agent",
        }
    }
}

/// A resolved file-to-file relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: InvocationKind,
    pub provenance: Provenance,
    /// Call-sites that produced this edge. Empty for agent-proposed edges.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<CallSite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StubReason {
    /// A variable reference had no static literal binding.
    DynamicVariable,
    /// No file in the index matched the target.
    MissingFile,
    /// More than one file could be the target.
    AmbiguousInterpreter,
}

impl StubReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StubReason::DynamicVariable => "dynamic_variable",
            StubReason::MissingFile => "missing_file",
            StubReason::AmbiguousInterpreter => "ambiguous_interpreter",
        }
    }
}

/// A call-site that could not be statically resolved to a concrete target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedStub {
    pub source_file: String,
    pub raw_target_expression: String,
    pub line: usize,
    pub reason: StubReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Present on disk but not decodable as UTF-8 text.
    Unreadable,
    UnknownDialect,
    /// Dropped by the file budget.
    OverBudget,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Unreadable => "unreadable",
            SkipReason::UnknownDialect => "unknown_dialect",
            SkipReason::OverBudget => "over_budget",
        }
    }
}

/// A file that was enumerated but not scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
}
