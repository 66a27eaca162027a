//! Per-file symbol tables.
//!
//! A table is filled by one forward pass over a script and answers "what was
//! the last static assignment to NAME at or before line N". Assignments nested in
//! conditionals or loops, and assignments whose value is not a literal, are
//! recorded as `Unknown`. There is no data-flow analysis beyond that.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingValue {
    Literal(String),
    Unknown,
}

/// One recorded assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolBinding {
    pub name: String,
    pub line: usize,
    pub value: BindingValue,
}

/// A variable reference that could not be substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnboundReference {
    pub name: String,
}

/// How a dialect writes variable references inside a target expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSyntax {
    /// `$NAME`, `${NAME}`; positional `$1` and `$@` are always unbound.
    Shell,
    /// `%NAME%`, `!NAME!`, loop variables `%%F`; positional `%1` unbound.
    Batch,
    /// `$NAME`, `${NAME}`, `$env:NAME`.
    PowerShell,
    /// `$name`, `${name}`.
    Perl,
    /// f-string placeholders `{NAME}`.
    Python,
}

static SHELL_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([^}]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)|\$([0-9@*#?!$-])").expect("shell ref regex")
});
static BATCH_LOOP_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%%~?([A-Za-z])").expect("batch loop ref regex"));
static BATCH_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"%([A-Za-z_][A-Za-z0-9_.\-]*)%|!([A-Za-z_][A-Za-z0-9_.\-]*)!|%(~?[0-9*])")
        .expect("batch ref regex")
});
static PS_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$env:([A-Za-z_][A-Za-z0-9_]*)|\$\{([^}]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("powershell ref regex")
});
static PERL_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)|\$([0-9])")
        .expect("perl ref regex")
});
static PY_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("python ref regex"));
static SIMPLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("name regex"));

impl ReferenceSyntax {
    /// Whether variable names are compared case-sensitively.
    pub fn case_sensitive(&self) -> bool {
        !matches!(self, ReferenceSyntax::Batch | ReferenceSyntax::PowerShell)
    }

    /// Tokens that denote the directory of the running script, with their
    /// replacement relative to that directory.
    fn script_dir_tokens(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ReferenceSyntax::Shell => &[
                ("$(dirname \"${BASH_SOURCE[0]}\")", "."),
                ("$(dirname \"$BASH_SOURCE\")", "."),
                ("$(dirname \"$0\")", "."),
                ("$(dirname $0)", "."),
                ("`dirname $0`", "."),
                ("${0%/*}", "."),
            ],
            ReferenceSyntax::Batch => &[("%~dp0", "./"), ("%CD%", ".")],
            ReferenceSyntax::PowerShell => &[("$PSScriptRoot", "."), ("${PSScriptRoot}", ".")],
            ReferenceSyntax::Perl => &[("$FindBin::RealBin", "."), ("$FindBin::Bin", ".")],
            ReferenceSyntax::Python => &[],
        }
    }

    fn key(&self, name: &str) -> String {
        if self.case_sensitive() {
            name.to_string()
        } else {
            name.to_ascii_lowercase()
        }
    }

    /// True when `expr` still holds constructs no static table can resolve.
    fn has_dynamic_construct(&self, expr: &str) -> Option<String> {
        match self {
            ReferenceSyntax::Shell | ReferenceSyntax::PowerShell => {
                if expr.contains("$(") || expr.contains('`') {
                    return Some("$(...)".to_string());
                }
                None
            }
            ReferenceSyntax::Perl => expr.contains('`').then(|| "`...`".to_string()),
            _ => None,
        }
    }
}

/// Assignments seen in one file, in line order.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    syntax: ReferenceSyntax,
    bindings: BTreeMap<String, Vec<(usize, BindingValue)>>,
    order: Vec<SymbolBinding>,
}

impl SymbolTable {
    pub fn new(syntax: ReferenceSyntax) -> Self {
        Self { syntax, bindings: BTreeMap::new(), order: Vec::new() }
    }

    pub fn syntax(&self) -> ReferenceSyntax {
        self.syntax
    }

    /// Record `name = value` at `line`. References inside `value` are expanded
    /// against bindings made before this line; if any is unbound the binding
    /// becomes `Unknown`.
    pub fn bind_literal(&mut self, name: &str, line: usize, value: &str) {
        let resolved = match self.expand(value, line) {
            Ok(v) => BindingValue::Literal(v),
            Err(_) => BindingValue::Unknown,
        };
        self.push(name, line, resolved);
    }

    pub fn bind_unknown(&mut self, name: &str, line: usize) {
        self.push(name, line, BindingValue::Unknown);
    }

    fn push(&mut self, name: &str, line: usize, value: BindingValue) {
        self.bindings.entry(self.syntax.key(name)).or_default().push((line, value.clone()));
        self.order.push(SymbolBinding { name: name.to_string(), line, value });
    }

    /// Last binding of `name` made at or before `line`.
    ///
    /// Same-line bindings count so that `for %%F in (x) do call %%F` and
    /// `X=a.sh; sh $X` resolve.
    pub fn lookup(&self, name: &str, line: usize) -> Option<&BindingValue> {
        self.find(name, |bound_at| bound_at <= line)
    }

    /// Last binding of `name` made strictly before `line`.
    ///
    /// Batch `%NAME%` is expanded when cmd parses the whole line, so a `set`
    /// earlier on the same line is not visible yet.
    pub fn lookup_before(&self, name: &str, line: usize) -> Option<&BindingValue> {
        self.find(name, |bound_at| bound_at < line)
    }

    fn find(&self, name: &str, visible: impl Fn(usize) -> bool) -> Option<&BindingValue> {
        self.bindings
            .get(&self.syntax.key(name))?
            .iter()
            .rev()
            .find(|(bound_at, _)| visible(*bound_at))
            .map(|(_, value)| value)
    }

    /// Every recorded binding in the order it was seen.
    pub fn bindings(&self) -> &[SymbolBinding] {
        &self.order
    }

    /// Substitute every reference in `expr` as seen from `line`.
    pub fn expand(&self, expr: &str, line: usize) -> Result<String, UnboundReference> {
        let mut text = expr.to_string();
        for (token, replacement) in self.syntax.script_dir_tokens() {
            if text.contains(token) {
                text = text.replace(token, replacement);
            }
        }
        if let Some(name) = self.syntax.has_dynamic_construct(&text) {
            return Err(UnboundReference { name });
        }

        match self.syntax {
            ReferenceSyntax::Shell => self.substitute(&SHELL_REF, &text, line, |caps| {
                if let Some(braced) = caps.get(1) {
                    let inner = braced.as_str();
                    return if SIMPLE_NAME.is_match(inner) {
                        Name::Bound(inner.to_string())
                    } else {
                        Name::Unbound(inner.to_string())
                    };
                }
                if let Some(plain) = caps.get(2) {
                    return Name::Bound(plain.as_str().to_string());
                }
                Name::Unbound(caps[0].to_string())
            }),
            ReferenceSyntax::Batch => {
                let text = self.substitute(&BATCH_LOOP_REF, &text, line, |caps| {
                    Name::Bound(format!("%%{}", &caps[1]))
                })?;
                self.substitute(&BATCH_REF, &text, line, |caps| {
                    if let Some(m) = caps.get(1) {
                        return Name::ParseTime(m.as_str().to_string());
                    }
                    match caps.get(2) {
                        Some(m) => Name::Bound(m.as_str().to_string()),
                        None => Name::Unbound(caps[0].to_string()),
                    }
                })
            }
            ReferenceSyntax::PowerShell => self.substitute(&PS_REF, &text, line, |caps| {
                if let Some(env) = caps.get(1) {
                    return Name::Bound(format!("env:{}", env.as_str()));
                }
                let name = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()).unwrap_or("");
                if let Some(env) = name.strip_prefix("env:").or_else(|| name.strip_prefix("ENV:")) {
                    return Name::Bound(format!("env:{env}"));
                }
                Name::Bound(name.to_string())
            }),
            ReferenceSyntax::Perl => self.substitute(&PERL_REF, &text, line, |caps| {
                match caps.get(1).or_else(|| caps.get(2)) {
                    Some(m) => Name::Bound(m.as_str().to_string()),
                    None => Name::Unbound(caps[0].to_string()),
                }
            }),
            ReferenceSyntax::Python => {
                self.substitute(&PY_REF, &text, line, |caps| Name::Bound(caps[1].to_string()))
            }
        }
    }

    fn substitute<F>(&self, re: &Regex, text: &str, line: usize, name_of: F) -> Result<String, UnboundReference>
    where
        F: Fn(&Captures<'_>) -> Name,
    {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in re.captures_iter(text) {
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
            let (name, value) = match name_of(&caps) {
                Name::Bound(name) => {
                    let value = self.lookup(&name, line);
                    (name, value)
                }
                Name::ParseTime(name) => {
                    let value = self.lookup_before(&name, line);
                    (name, value)
                }
                Name::Unbound(name) => return Err(UnboundReference { name }),
            };
            match value {
                Some(BindingValue::Literal(value)) => {
                    out.push_str(&text[last..whole.0]);
                    out.push_str(value);
                    last = whole.1;
                }
                Some(BindingValue::Unknown) | None => return Err(UnboundReference { name }),
            }
        }
        out.push_str(&text[last..]);
        Ok(out)
    }
}

enum Name {
    Bound(String),
    /// Bound, but only to assignments on earlier lines.
    ParseTime(String),
    Unbound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_binding_before_use_wins() {
        let mut table = SymbolTable::new(ReferenceSyntax::Shell);
        table.bind_literal("DIR", 1, "./a");
        table.bind_literal("DIR", 5, "./b");
        assert_eq!(table.expand("$DIR/x.sh", 3).as_deref(), Ok("./a/x.sh"));
        assert_eq!(table.expand("${DIR}/x.sh", 9).as_deref(), Ok("./b/x.sh"));
        assert!(table.expand("$DIR/x.sh", 0).is_err());
    }

    #[test]
    fn unknown_binding_halts_substitution() {
        let mut table = SymbolTable::new(ReferenceSyntax::Shell);
        table.bind_literal("A", 1, "lib");
        table.bind_unknown("A", 2);
        let err = table.expand("$A/x.sh", 3).unwrap_err();
        assert_eq!(err.name, "A");
    }

    #[test]
    fn chained_bindings_expand_at_bind_time() {
        let mut table = SymbolTable::new(ReferenceSyntax::Shell);
        table.bind_literal("BASE", 1, "tools");
        table.bind_literal("BIN", 2, "$BASE/bin");
        table.bind_literal("BROKEN", 3, "$NOPE/bin");
        assert_eq!(table.lookup("BIN", 4), Some(&BindingValue::Literal("tools/bin".into())));
        assert_eq!(table.lookup("BROKEN", 4), Some(&BindingValue::Unknown));
    }

    #[test]
    fn batch_names_are_case_insensitive() {
        let mut table = SymbolTable::new(ReferenceSyntax::Batch);
        table.bind_literal("Tools", 1, "lib\\tools");
        assert_eq!(table.expand("%TOOLS%\\x.bat", 2).as_deref(), Ok("lib\\tools\\x.bat"));
        assert_eq!(table.expand("!tools!\\y.cmd", 2).as_deref(), Ok("lib\\tools\\y.cmd"));
        assert_eq!(table.expand("%~dp0z.bat", 2).as_deref(), Ok("./z.bat"));
        assert!(table.expand("%1", 2).is_err());
    }

    #[test]
    fn batch_percent_references_ignore_same_line_sets() {
        let mut table = SymbolTable::new(ReferenceSyntax::Batch);
        table.bind_literal("X", 1, "old.bat");
        table.bind_literal("X", 2, "new.bat");
        table.bind_literal("%%F", 3, "loop.bat");
        assert_eq!(table.expand("%X%", 2).as_deref(), Ok("old.bat"));
        assert_eq!(table.expand("!X!", 2).as_deref(), Ok("new.bat"));
        assert_eq!(table.expand("%%F", 3).as_deref(), Ok("loop.bat"));
        assert_eq!(table.expand("%X%", 3).as_deref(), Ok("new.bat"));

        let mut fresh = SymbolTable::new(ReferenceSyntax::Batch);
        fresh.bind_literal("Y", 4, "a.bat");
        assert!(fresh.expand("%Y%", 4).is_err());
    }

    #[test]
    fn shell_command_substitution_is_dynamic() {
        let table = SymbolTable::new(ReferenceSyntax::Shell);
        assert!(table.expand("$(find . -name x.sh)", 1).is_err());
        assert_eq!(table.expand("$(dirname \"$0\")/x.sh", 1).as_deref(), Ok("./x.sh"));
    }

    #[test]
    fn powershell_env_variables_resolve() {
        let mut table = SymbolTable::new(ReferenceSyntax::PowerShell);
        table.bind_literal("env:TOOLS", 1, "ps");
        assert_eq!(table.expand("$env:Tools/step.ps1", 2).as_deref(), Ok("ps/step.ps1"));
        assert_eq!(table.expand("$PSScriptRoot/a.ps1", 2).as_deref(), Ok("./a.ps1"));
    }
}
