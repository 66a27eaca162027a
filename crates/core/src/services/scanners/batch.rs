//! Windows batch (.bat, .cmd).
//!
//! Rule priority per command:
//! 1. interpreter hop: `powershell -File x.ps1`, `python x.py`, `cmd /c x.bat`
//! 2. `start ["title"] [/b /wait ...] target`
//! 3. `call target` (`call :label` is an internal jump and ignored)
//! 4. bare invocation: `helper.bat`, `%~dp0sub\run.cmd`, `%TOOL%`, `%PY% x.py`
//!
//! `if` conditions, `for ... do` heads and `( ... )` block delimiters are
//! peeled off before the rules run.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{CallSite, Confidence, InvocationKind};
use crate::symbols::SymbolTable;

use super::call_site;
use super::text::{
    has_script_extension, interpreter_target, is_relative_path, logical_lines, program_expression,
    split_commands_with,
    split_words_with, CommentStyle, Continuation, LogicalLine, Word,
};

const QUOTES: &[char] = &['"'];

static FOR_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^for\s+(/[a-z]\s+(?:"[^"]*"\s+|[^%\s]\S*\s+)?)?%%([A-Za-z])\s+in\s+\(([^)]*)\)\s+do\b"#)
        .expect("Invalid batch for regex")
});

pub(super) fn lines(raw: &str) -> Vec<LogicalLine> {
    logical_lines(raw, CommentStyle::Batch, Continuation::Trailing('^'))
}

/// One command after control-flow prefixes are removed.
struct Command {
    words: Vec<Word>,
    /// Guarded by `if` or run by `for`.
    guarded: bool,
}

fn commands(text: &str) -> Vec<Command> {
    let mut out = Vec::new();
    for piece in split_commands_with(text, &['&', '|'], QUOTES) {
        let piece = piece.trim_start_matches('@');
        let blanked = blank_block_parens(piece);
        let words = split_words_with(&blanked, QUOTES);
        for group in words.split(|w| !w.quoted && w.text.eq_ignore_ascii_case("else")) {
            let (rest, guarded) = strip_control(group);
            if !rest.is_empty() {
                out.push(Command { words: rest.to_vec(), guarded });
            }
        }
    }
    out
}

/// Replace block parentheses with spaces; the `for` set keeps its parens
/// only long enough to find `do`.
fn blank_block_parens(piece: &str) -> String {
    let mut out = String::with_capacity(piece.len());
    let mut in_quote = false;
    for c in piece.chars() {
        match c {
            '"' => {
                in_quote = !in_quote;
                out.push(c);
            }
            '(' | ')' if !in_quote => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

fn strip_control(words: &[Word]) -> (&[Word], bool) {
    let mut rest = words;
    let mut guarded = false;
    loop {
        let Some(first) = rest.first() else {
            return (rest, guarded);
        };
        let lower = first.text.trim_start_matches('@').to_ascii_lowercase();
        if first.quoted {
            return (rest, guarded);
        }
        match lower.as_str() {
            "if" => {
                guarded = true;
                rest = &rest[1..];
                while rest.first().map(|w| {
                    let l = w.text.to_ascii_lowercase();
                    l == "/i" || l == "not"
                }) == Some(true)
                {
                    rest = &rest[1..];
                }
                let skip = match rest.first().map(|w| w.text.to_ascii_lowercase()) {
                    Some(ref k) if k == "exist" || k == "defined" || k == "errorlevel" => 2,
                    Some(ref k) if k.contains("==") => 1,
                    Some(_) => match rest.get(1).map(|w| w.text.to_ascii_lowercase()) {
                        Some(ref op) if is_comparison(op) => 3,
                        _ => 1,
                    },
                    None => 0,
                };
                rest = &rest[skip.min(rest.len())..];
            }
            "for" => {
                guarded = true;
                match rest.iter().position(|w| !w.quoted && w.text.eq_ignore_ascii_case("do")) {
                    Some(pos) => rest = &rest[pos + 1..],
                    None => return (&rest[rest.len()..], guarded),
                }
            }
            _ => return (rest, guarded),
        }
    }
}

fn is_comparison(op: &str) -> bool {
    matches!(op, "==" | "equ" | "neq" | "lss" | "leq" | "gtr" | "geq")
}

pub(super) fn scan(source: &str, lines: &[LogicalLine]) -> Vec<CallSite> {
    let mut out = Vec::new();
    for line in lines {
        for command in commands(&line.text) {
            if let Some(site) = classify(source, line, &command.words) {
                out.push(site);
            }
        }
    }
    out
}

fn classify(source: &str, line: &LogicalLine, words: &[Word]) -> Option<CallSite> {
    let program = words.first()?;
    let lower = program.text.to_ascii_lowercase();

    if let Some(site) = hop(source, line, words) {
        return Some(site);
    }

    if lower == "start" && !program.quoted {
        let mut rest = &words[1..];
        // The first quoted argument is the window title.
        if rest.first().map(|w| w.quoted).unwrap_or(false) {
            rest = &rest[1..];
        }
        while let Some(flag) = rest.first().filter(|w| !w.quoted && w.text.starts_with('/')) {
            let takes_value = flag.text.eq_ignore_ascii_case("/d");
            rest = &rest[if takes_value { 2.min(rest.len()) } else { 1 }..];
        }
        if let Some(site) = hop(source, line, rest) {
            return Some(site);
        }
        let target = rest.first()?;
        return Some(call_site(source, line, &target.text, InvocationKind::Execute, Confidence::Static));
    }

    if lower == "call" && !program.quoted {
        let rest = &words[1..];
        let target = rest.first()?;
        if target.text.starts_with(':') {
            return None;
        }
        if let Some(site) = hop(source, line, rest) {
            return Some(site);
        }
        let raw = program_expression(rest);
        return Some(call_site(source, line, &raw, InvocationKind::Execute, Confidence::Static));
    }

    if is_bare_target(&program.text) {
        let raw = program_expression(words);
        return Some(call_site(source, line, &raw, InvocationKind::Execute, Confidence::Static));
    }
    None
}

fn hop(source: &str, line: &LogicalLine, words: &[Word]) -> Option<CallSite> {
    let (lang, idx) = interpreter_target(words)?;
    let kind = InvocationKind::InterpreterHop { lang };
    Some(call_site(source, line, &words[idx].text, kind, Confidence::Static))
}

fn is_bare_target(program: &str) -> bool {
    has_script_extension(program)
        || is_relative_path(program)
        || program.starts_with("%~dp0")
        || ((program.starts_with('%') || program.starts_with('!')) && !program.contains('.'))
}

pub(super) fn bind(lines: &[LogicalLine], table: &mut SymbolTable) {
    let mut depth = 0i32;
    for line in lines {
        let text = line.text.trim_start_matches('@').trim();
        let in_block = depth > 0;

        if let Some(caps) = FOR_HEAD.captures(text) {
            let var = format!("%%{}", &caps[2]);
            let items: Vec<&str> =
                caps[3].split(|c: char| c.is_whitespace() || c == ',' || c == ';').filter(|s| !s.is_empty()).collect();
            let parse_mode = caps.get(1).is_some();
            let single = items.len() == 1 && !items[0].contains(['*', '?']);
            if single && !parse_mode && !in_block {
                table.bind_literal(&var, line.number, items[0].trim_matches('"'));
            } else {
                table.bind_unknown(&var, line.number);
            }
        }

        for command in commands(text) {
            bind_set(&command, line, in_block, table);
        }
        depth += paren_balance(text);
        if depth < 0 {
            depth = 0;
        }
    }
}

fn bind_set(command: &Command, line: &LogicalLine, in_block: bool, table: &mut SymbolTable) {
    let Some(first) = command.words.first() else {
        return;
    };
    if first.quoted || !first.text.eq_ignore_ascii_case("set") {
        return;
    }
    let mut rest = &command.words[1..];
    let mut dynamic = false;
    if let Some(flag) = rest.first().filter(|w| !w.quoted && w.text.starts_with('/')) {
        dynamic = flag.text.eq_ignore_ascii_case("/a") || flag.text.eq_ignore_ascii_case("/p");
        rest = &rest[1..];
    }
    let joined: Vec<&str> = rest.iter().map(|w| w.text.as_str()).collect();
    let joined = joined.join(" ");
    let Some((name, value)) = joined.split_once('=') else {
        return;
    };
    let name = name.trim();
    if name.is_empty() || name.contains(' ') {
        return;
    }
    if dynamic || command.guarded || in_block {
        table.bind_unknown(name, line.number);
    } else {
        table.bind_literal(name, line.number, value.trim());
    }
}

/// Block nesting change on one line; parens of a `for` set cancel out.
fn paren_balance(text: &str) -> i32 {
    let mut depth = 0;
    let mut in_quote = false;
    for c in text.chars() {
        match c {
            '"' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth -= 1,
            _ => {}
        }
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dialect, ScriptFile};
    use crate::services::scanners::analyze;
    use crate::symbols::BindingValue;

    fn analyze_text(text: &str) -> (Vec<CallSite>, SymbolTable) {
        analyze(&ScriptFile::new("jobs/nightly.bat", Dialect::Batch, text))
    }

    #[test]
    fn recognizes_calls_hops_and_starts() {
        let (sites, _) = analyze_text(
            "@echo off\r\nREM call ignored.bat\r\ncall helper.bat arg\r\ncall :sub\r\n\
             powershell -NoProfile -File .\\ps\\stage.ps1\r\nstart \"\" /wait cleanup.cmd\r\n%~dp0tail.bat\r\n",
        );
        let found: Vec<_> = sites.iter().map(|s| (s.raw_target_expression.as_str(), s.kind, s.line)).collect();
        assert_eq!(
            found,
            vec![
                ("helper.bat", InvocationKind::Execute, 3),
                (".\\ps\\stage.ps1", InvocationKind::InterpreterHop { lang: Dialect::PowerShell }, 5),
                ("cleanup.cmd", InvocationKind::Execute, 6),
                ("%~dp0tail.bat", InvocationKind::Execute, 7),
            ]
        );
    }

    #[test]
    fn if_and_else_branches_both_yield_calls() {
        let (sites, _) = analyze_text("if exist a.bat (call a.bat) else (call b.bat)\n");
        let targets: Vec<_> = sites.iter().map(|s| s.raw_target_expression.as_str()).collect();
        assert_eq!(targets, vec!["a.bat", "b.bat"]);
    }

    #[test]
    fn dynamic_variable_is_still_a_call_site() {
        let (sites, table) = analyze_text("call %DYNAMIC%\n");
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].raw_target_expression, "%DYNAMIC%");
        assert!(table.lookup("DYNAMIC", 1).is_none());
    }

    #[test]
    fn set_bindings_respect_guards_and_blocks() {
        let (_, table) = analyze_text(
            "set TOOLS=lib\\tools\nset \"QUOTED=x y\"\nif \"%1\"==\"full\" set MODE=full\nif defined X (\n  set INNER=a\n)\nset /a N=1+1\nsetlocal\n",
        );
        assert_eq!(table.lookup("tools", 1), Some(&BindingValue::Literal("lib\\tools".into())));
        assert_eq!(table.lookup("QUOTED", 2), Some(&BindingValue::Literal("x y".into())));
        assert_eq!(table.lookup("MODE", 3), Some(&BindingValue::Unknown));
        assert_eq!(table.lookup("INNER", 5), Some(&BindingValue::Unknown));
        assert_eq!(table.lookup("N", 7), Some(&BindingValue::Unknown));
    }

    #[test]
    fn single_item_for_loop_binds_its_variable() {
        let (sites, table) = analyze_text("for %%F in (stage1.bat) do call %%F\nfor %%G in (a.bat b.bat) do call %%G\n");
        assert_eq!(sites.len(), 2);
        assert_eq!(table.expand("%%F", 1).as_deref(), Ok("stage1.bat"));
        assert!(table.expand("%%G", 2).is_err());
    }
}
