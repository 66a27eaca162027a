//! PowerShell (.ps1, .psm1).
//!
//! Rule priority per command:
//! 1. interpreter hop: `pwsh -File x.ps1`, `python x.py`, `& python x.py`
//! 2. dot-source: `. ./lib.ps1`
//! 3. call operator: `& "$PSScriptRoot\x.ps1"`
//! 4. `Import-Module ./mod.psm1` (treated as an include)
//! 5. `Invoke-Expression` / `iex` (heuristic)
//! 6. `Start-Process` (heuristic)
//! 7. bare invocation: `.\x.ps1`, `tools\y.ps1`
//!
//! `Join-Path A B` is rewritten to `A/B` before the rules run; call-sites
//! built from it are heuristic.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{CallSite, Confidence, InvocationKind};
use crate::symbols::SymbolTable;

use super::call_site;
use super::text::{
    brace_segments, has_script_extension, interpreter_target, is_relative_path, leading_keyword,
    logical_lines, split_commands, split_words, unquote, BlockStack, CommentStyle, Continuation,
    LogicalLine, Segment, Word,
};

static JOIN_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\(?\s*Join-Path\s+(?:-Path\s+)?("[^"]*"|'[^']*'|[^\s()]+)\s+(?:-ChildPath\s+)?("[^"]*"|'[^']*'|[^\s()]+)\s*\)?"#,
    )
    .expect("Invalid Join-Path regex")
});

static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\$(?:(env|script|global):)?([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$")
        .expect("Invalid PowerShell assignment regex")
});

/// Keywords whose blocks run conditionally or repeatedly.
const CONDITIONAL_BLOCKS: &[&str] =
    &["if", "elseif", "else", "foreach", "for", "while", "do", "until", "switch", "try", "catch", "finally", "trap"];

pub(super) fn lines(raw: &str) -> Vec<LogicalLine> {
    logical_lines(raw, CommentStyle::PowerShell, Continuation::Trailing('`'))
}

/// Rewrite `Join-Path A B` to a quoted `A/B`; reports whether it fired.
fn rewrite_join_path(text: &str) -> (String, bool) {
    if !JOIN_PATH.is_match(text) {
        return (text.to_string(), false);
    }
    let rewritten = JOIN_PATH.replace_all(text, |caps: &regex::Captures<'_>| {
        format!("\"{}/{}\"", unquote(&caps[1]), unquote(&caps[2]))
    });
    (rewritten.into_owned(), true)
}

/// Commands on a line after braces and control heads are peeled off.
fn commands(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for segment in brace_segments(text) {
        let Segment::Code(code) = segment else {
            continue;
        };
        for command in split_commands(code, &[';', '|']) {
            let stripped = strip_control_head(command);
            if !stripped.is_empty() {
                out.push(stripped.to_string());
            }
        }
    }
    out
}

/// Drop `if (...)`, `foreach (...)`, `else`, `function Name` heads.
fn strip_control_head(command: &str) -> &str {
    let keyword = leading_keyword(command);
    if keyword == "function" || keyword == "filter" || keyword == "param" {
        return "";
    }
    if !CONDITIONAL_BLOCKS.contains(&keyword.as_str()) {
        return command;
    }
    let rest = command[keyword.len()..].trim_start();
    if rest.starts_with('(') {
        let inner = super::text::bracket_group(rest, 0);
        let consumed = (inner.len() + 2).min(rest.len());
        rest[consumed..].trim_start()
    } else if rest.starts_with('[') {
        // `catch [System.Exception]`
        rest.find(']').map(|i| rest[i + 1..].trim_start()).unwrap_or("")
    } else {
        rest
    }
}

pub(super) fn scan(source: &str, lines: &[LogicalLine]) -> Vec<CallSite> {
    let mut out = Vec::new();
    for line in lines {
        let (text, joined) = rewrite_join_path(&line.text);
        for command in commands(&text) {
            let words = split_words(&command);
            if let Some(mut site) = classify(source, line, &words, &command) {
                if joined {
                    site.confidence = Confidence::Heuristic;
                }
                out.push(site);
            }
        }
    }
    out
}

fn classify(source: &str, line: &LogicalLine, words: &[Word], command: &str) -> Option<CallSite> {
    let program = words.first()?;
    let lower = program.text.to_ascii_lowercase();

    if let Some(site) = hop(source, line, words, Confidence::Static) {
        return Some(site);
    }

    if program.text == "." && !program.quoted {
        let target = words.get(1)?;
        return Some(call_site(source, line, &target.text, InvocationKind::Source, Confidence::Static));
    }

    if program.text == "&" && !program.quoted {
        let rest = &words[1..];
        if let Some(site) = hop(source, line, rest, Confidence::Static) {
            return Some(site);
        }
        let target = rest.first()?;
        return Some(call_site(source, line, &target.text, InvocationKind::Execute, Confidence::Static));
    }

    if lower == "import-module" {
        let target = words[1..].iter().find(|w| !w.is_flag() || w.quoted)?;
        if has_script_extension(&target.text) || is_relative_path(&target.text) {
            return Some(call_site(source, line, &target.text, InvocationKind::Source, Confidence::Static));
        }
        return None;
    }

    if lower == "invoke-expression" || lower == "iex" {
        let arg = command[program.text.len()..].trim();
        let arg = arg.strip_prefix("-Command").map(str::trim).unwrap_or(arg);
        let inner = split_words(unquote(arg));
        if let Some(site) = hop(source, line, &inner, Confidence::Heuristic) {
            return Some(site);
        }
        let target = inner.iter().find(|w| is_script_token(&w.text))?;
        return Some(call_site(source, line, &target.text, InvocationKind::Execute, Confidence::Heuristic));
    }

    if lower == "start-process" || lower == "saps" {
        return start_process(source, line, &words[1..]);
    }

    if is_script_token(&program.text) && !program.text.starts_with('$') {
        return Some(call_site(source, line, &program.text, InvocationKind::Execute, Confidence::Static));
    }
    None
}

fn hop(source: &str, line: &LogicalLine, words: &[Word], confidence: Confidence) -> Option<CallSite> {
    let (lang, idx) = interpreter_target(words)?;
    let kind = InvocationKind::InterpreterHop { lang };
    Some(call_site(source, line, &words[idx].text, kind, confidence))
}

fn is_script_token(token: &str) -> bool {
    has_script_extension(token) || is_relative_path(token)
}

/// `Start-Process [-FilePath] X [-ArgumentList Y]`.
fn start_process(source: &str, line: &LogicalLine, args: &[Word]) -> Option<CallSite> {
    let mut file_path: Option<&Word> = None;
    let mut argument_list: Vec<Word> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let word = &args[i];
        let lower = word.text.to_ascii_lowercase();
        if !word.quoted && (lower == "-filepath" || lower == "-file") {
            file_path = args.get(i + 1);
            i += 2;
        } else if !word.quoted && (lower == "-argumentlist" || lower == "-args") {
            if let Some(list) = args.get(i + 1) {
                argument_list =
                    list.text.split(',').flat_map(|part| split_words(unquote(part.trim()))).collect();
            }
            i += 2;
        } else if !word.quoted && word.text.starts_with('-') {
            i += 2;
        } else {
            if file_path.is_none() {
                file_path = Some(word);
            }
            i += 1;
        }
    }
    let program = file_path?;
    let mut full = vec![program.clone()];
    full.extend(argument_list);
    if let Some(site) = hop(source, line, &full, Confidence::Heuristic) {
        return Some(site);
    }
    Some(call_site(source, line, &program.text, InvocationKind::Execute, Confidence::Heuristic))
}

pub(super) fn bind(lines: &[LogicalLine], table: &mut SymbolTable) {
    let mut blocks = BlockStack::default();
    let mut last_keyword = String::new();
    for line in lines {
        let (text, _) = rewrite_join_path(&line.text);
        for segment in brace_segments(&text) {
            match segment {
                Segment::Open => {
                    blocks.open(CONDITIONAL_BLOCKS.contains(&last_keyword.as_str()));
                    last_keyword.clear();
                }
                Segment::Close => blocks.close(),
                Segment::Code(code) => {
                    for command in split_commands(code, &[';']) {
                        last_keyword = leading_keyword(command);
                        let body = strip_control_head(command);
                        let conditional = blocks.in_conditional() || body.len() != command.len();
                        bind_assignment(body, line, conditional, table);
                    }
                }
            }
        }
    }
}

fn bind_assignment(command: &str, line: &LogicalLine, conditional: bool, table: &mut SymbolTable) {
    let Some(caps) = ASSIGNMENT.captures(command.trim()) else {
        return;
    };
    let name = match caps.get(1).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(scope) if scope == "env" => format!("env:{}", &caps[2]),
        _ => caps[2].to_string(),
    };
    let value = caps[3].trim();
    let literal = match value.chars().next() {
        Some('"') | Some('\'') if value.len() >= 2 && value.ends_with(value.chars().next().unwrap_or('"')) => {
            Some(unquote(value))
        }
        Some('$') if !value.contains(char::is_whitespace) && !value.starts_with("$(") => Some(value),
        _ => None,
    };
    match literal {
        Some(v) if !conditional => table.bind_literal(&name, line.number, v),
        _ => table.bind_unknown(&name, line.number),
    }
}
