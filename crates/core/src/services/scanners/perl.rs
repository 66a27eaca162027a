//! Perl (.pl, .pm).
//!
//! Rule priority per statement:
//! 1. `system(...)` / `exec(...)`; an interpreter named first makes it a hop
//! 2. backticks and `qx{...}`
//! 3. pipe opens: `open(my $fh, '-|', 'x.sh')`, `open(FH, "x.sh |")` (heuristic)
//! 4. `require "x.pl"` / `do "x.pl"` as includes
//!
//! Bareword `require Module::Name` is a library import and is ignored.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{CallSite, Confidence, InvocationKind};
use crate::symbols::SymbolTable;

use super::call_site;
use super::text::{
    bracket_group, brace_segments, has_script_extension, interpreter_target, is_relative_path,
    leading_keyword, logical_lines, split_args, split_commands, split_words, BlockStack, CommentStyle,
    Continuation, LogicalLine, Segment, Word,
};

static SYSTEM_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:system|exec)\b\s*").expect("Invalid Perl system regex"));
static BACKTICKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"`([^`]*)`|\bqx\s*\{([^}]*)\}|\bqx\s*\(([^)]*)\)").expect("Invalid Perl backtick regex")
});
static PIPE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bopen\b\s*").expect("Invalid Perl open regex"));
static INCLUDE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:require|do)\b\s*\(?\s*("[^"]*"|'[^']*'|\$[A-Za-z_][A-Za-z0-9_]*)"#)
        .expect("Invalid Perl require regex")
});
static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?:(?:my|our|local)\s+)?\$([A-Za-z_][A-Za-z0-9_]*)\s*=\s*([^=~\s].*?)\s*;?\s*$"#)
        .expect("Invalid Perl assignment regex")
});
static POSTFIX_GUARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s(?:if|unless|for|foreach|while|until|and|or)\s|&&|\|\||//=|\|\|=")
        .expect("Invalid Perl guard regex")
});

const CONDITIONAL_BLOCKS: &[&str] =
    &["if", "unless", "elsif", "else", "for", "foreach", "while", "until", "do", "eval"];

pub(super) fn lines(raw: &str) -> Vec<LogicalLine> {
    logical_lines(raw, CommentStyle::Perl, Continuation::Brackets)
}

fn statements(text: &str) -> Vec<&str> {
    brace_segments(text)
        .into_iter()
        .filter_map(|s| match s {
            Segment::Code(code) => Some(code),
            _ => None,
        })
        .flat_map(|code| split_commands(code, &[';']))
        .collect()
}

pub(super) fn scan(source: &str, lines: &[LogicalLine]) -> Vec<CallSite> {
    let mut out = Vec::new();
    for line in lines {
        for statement in statements(&line.text) {
            if let Some(site) = classify(source, line, statement) {
                out.push(site);
            }
        }
    }
    out
}

fn classify(source: &str, line: &LogicalLine, statement: &str) -> Option<CallSite> {
    if let Some(m) = SYSTEM_CALL.find(statement) {
        let rest = &statement[m.end()..];
        let args = if rest.starts_with('(') { bracket_group(rest, 0) } else { rest };
        if let Some(site) = command_site(source, line, &list_words(args), Confidence::Static) {
            return Some(site);
        }
    }

    if let Some(caps) = BACKTICKS.captures(statement) {
        let body = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)).map(|m| m.as_str());
        if let Some(site) = command_site(source, line, &split_words(body.unwrap_or("")), Confidence::Static) {
            return Some(site);
        }
    }

    if let Some(m) = PIPE_OPEN.find(statement) {
        let rest = &statement[m.end()..];
        let args_text = if rest.starts_with('(') { bracket_group(rest, 0) } else { rest };
        let args = split_args(args_text);
        let command = match args.as_slice() {
            [_, mode, cmd, ..] if matches!(perl_string(mode).as_deref(), Some("-|") | Some("|-")) => {
                perl_string(cmd)
            }
            [_, spec] => perl_string(spec).and_then(|s| {
                let t = s.trim();
                t.strip_suffix('|').or_else(|| t.strip_prefix('|')).map(|c| c.trim().to_string())
            }),
            _ => None,
        };
        if let Some(command) = command {
            if let Some(site) = command_site(source, line, &split_words(&command), Confidence::Heuristic) {
                return Some(site);
            }
        }
    }

    if let Some(caps) = INCLUDE.captures(statement) {
        let target = perl_string(&caps[1])?;
        return Some(call_site(source, line, &target, InvocationKind::Source, Confidence::Static));
    }
    None
}

/// Words of a `system` argument list: one string is a command line, several
/// are an argv.
fn list_words(args: &str) -> Vec<Word> {
    let parts = split_args(args);
    match parts.as_slice() {
        [single] => perl_string(single).map(|s| split_words(&s)).unwrap_or_default(),
        many => many
            .iter()
            .filter_map(|p| perl_string(p))
            .map(|text| Word { text, quoted: true })
            .collect(),
    }
}

fn command_site(source: &str, line: &LogicalLine, words: &[Word], confidence: Confidence) -> Option<CallSite> {
    if let Some((lang, idx)) = interpreter_target(words) {
        let kind = InvocationKind::InterpreterHop { lang };
        return Some(call_site(source, line, &words[idx].text, kind, confidence));
    }
    let program = words.first()?;
    let text = program.text.as_str();
    if has_script_extension(text) || is_relative_path(text) || text.starts_with('$') {
        return Some(call_site(source, line, text, InvocationKind::Execute, confidence));
    }
    None
}

/// Value of a quoted string or a scalar variable reference.
fn perl_string(expr: &str) -> Option<String> {
    let expr = expr.trim();
    let quoted = |open: char, close: char| {
        expr.strip_prefix(open)
            .and_then(|s| s.strip_suffix(close))
            .filter(|inner| !inner.contains(close))
            .map(str::to_string)
    };
    if let Some(s) = quoted('"', '"').or_else(|| quoted('\'', '\'')) {
        return Some(s);
    }
    for prefix in ["qq", "q"] {
        if let Some(rest) = expr.strip_prefix(prefix) {
            let rest = rest.trim_start();
            if rest.starts_with(['{', '(', '[']) {
                return Some(bracket_group(rest, 0).to_string());
            }
        }
    }
    if expr.starts_with('$') && !expr.contains(char::is_whitespace) {
        return Some(expr.to_string());
    }
    None
}

pub(super) fn bind(lines: &[LogicalLine], table: &mut SymbolTable) {
    let mut blocks = BlockStack::default();
    let mut last_keyword = String::new();
    for line in lines {
        for segment in brace_segments(&line.text) {
            match segment {
                Segment::Open => {
                    let conditional = CONDITIONAL_BLOCKS.contains(&last_keyword.as_str())
                        || last_keyword.starts_with('}');
                    blocks.open(conditional);
                    last_keyword.clear();
                }
                Segment::Close => blocks.close(),
                Segment::Code(code) => {
                    for statement in split_commands(code, &[';']) {
                        last_keyword = leading_keyword(statement);
                        let Some(caps) = ASSIGNMENT.captures(statement) else {
                            continue;
                        };
                        let name = &caps[1];
                        let guarded = blocks.in_conditional() || POSTFIX_GUARD.is_match(statement);
                        match perl_string(&caps[2]) {
                            Some(value) if !guarded && !caps[2].trim().starts_with('\'') => {
                                table.bind_literal(name, line.number, &value)
                            }
                            Some(value) if !guarded && !value.contains('$') => {
                                table.bind_literal(name, line.number, &value)
                            }
                            _ => table.bind_unknown(name, line.number),
                        }
                    }
                }
            }
        }
    }
}
