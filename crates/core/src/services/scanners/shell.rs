//! POSIX shell (sh, bash, ksh, zsh).
//!
//! Rule priority per command:
//! 1. interpreter hop: `bash x.sh`, `python3 tools/check.py`, `perl -w x.pl`
//! 2. source include: `source x.sh`, `. x.sh`
//! 3. direct execution: `./x.sh`, `lib/x.sh`, `$TOOLS/x.sh`, `"$RUNNER"`,
//!    `$PY tools/x.py` (arguments kept when the program is a variable)
//!
//! Command substitutions (`$(...)`, backticks) are scanned as nested commands.

use crate::model::{CallSite, Confidence, InvocationKind};
use crate::symbols::SymbolTable;

use super::call_site;
use super::text::{
    has_script_extension, interpreter_target, is_assignment_word, is_relative_path, logical_lines,
    program_expression, split_commands, split_words, CommentStyle, Continuation, LogicalLine, Word,
};

const SEPARATORS: &[char] = &[';', '&', '|'];

/// Words that precede the actual command without changing the target.
const PREFIX_WORDS: &[&str] =
    &["then", "do", "else", "elif", "if", "while", "until", "!", "{", "}", "(", "exec", "time", "nohup", "command", "builtin"];

const BLOCK_OPENERS: &[&str] = &["if", "for", "while", "until", "case", "select"];
const BLOCK_CLOSERS: &[&str] = &["fi", "done", "esac"];

pub(super) fn lines(raw: &str) -> Vec<LogicalLine> {
    logical_lines(raw, CommentStyle::Hash, Continuation::Trailing('\\'))
}

pub(super) fn scan(source: &str, lines: &[LogicalLine]) -> Vec<CallSite> {
    let mut out = Vec::new();
    for line in lines {
        scan_text(source, line, &line.text, 0, &mut out);
    }
    out
}

fn scan_text(source: &str, line: &LogicalLine, text: &str, nesting: usize, out: &mut Vec<CallSite>) {
    for command in split_commands(text, SEPARATORS) {
        let words = split_words(command);
        if let Some(site) = classify(source, line, strip_prefixes(&words)) {
            out.push(site);
        }
        if nesting < 2 {
            for inner in substitutions(command) {
                scan_text(source, line, &inner, nesting + 1, out);
            }
        }
    }
}

fn classify(source: &str, line: &LogicalLine, words: &[Word]) -> Option<CallSite> {
    let program = words.first()?;

    if let Some((lang, idx)) = interpreter_target(words) {
        let kind = InvocationKind::InterpreterHop { lang };
        return Some(call_site(source, line, &words[idx].text, kind, Confidence::Static));
    }

    if program.text == "source" || (program.text == "." && !program.quoted) {
        let target = words.get(1)?;
        return Some(call_site(source, line, &target.text, InvocationKind::Source, Confidence::Static));
    }

    if is_direct_target(&program.text) {
        let raw = program_expression(words);
        return Some(call_site(source, line, &raw, InvocationKind::Execute, Confidence::Static));
    }
    None
}

fn is_direct_target(program: &str) -> bool {
    if program.starts_with("$(") && !program.starts_with("$(dirname") {
        return false;
    }
    has_script_extension(program) || is_relative_path(program) || program.starts_with('$')
}

/// Drop control keywords, wrappers, and `NAME=value` environment prefixes.
fn strip_prefixes(words: &[Word]) -> &[Word] {
    let mut rest = words;
    loop {
        match rest.first() {
            Some(w) if !w.quoted && PREFIX_WORDS.contains(&w.text.as_str()) => rest = &rest[1..],
            Some(w) if !w.quoted && w.text == "sudo" => {
                rest = &rest[1..];
                while let Some(flag) = rest.first().filter(|f| f.text.starts_with('-')) {
                    let takes_value = flag.text == "-u" || flag.text == "-g";
                    rest = &rest[if takes_value { 2.min(rest.len()) } else { 1 }..];
                }
            }
            Some(w) if !w.quoted && w.text == "env" => {
                rest = &rest[1..];
                while rest.first().map(|f| f.text.starts_with('-')).unwrap_or(false) {
                    rest = &rest[1..];
                }
            }
            Some(w) if is_assignment_word(w) => rest = &rest[1..],
            _ => return rest,
        }
    }
}

/// Bodies of `$(...)` and backtick substitutions in a command.
fn substitutions(command: &str) -> Vec<String> {
    let mut out = Vec::new();
    let bytes = command.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'(') && bytes.get(i + 2) != Some(&b'(') {
            let body = super::text::bracket_group(command, i + 1);
            if !body.trim_start().starts_with("dirname") {
                out.push(body.to_string());
            }
            i += body.len() + 3;
            continue;
        }
        if bytes[i] == b'`' {
            if let Some(end) = command[i + 1..].find('`') {
                let body = &command[i + 1..i + 1 + end];
                if !body.trim_start().starts_with("dirname") {
                    out.push(body.to_string());
                }
                i += end + 2;
                continue;
            }
        }
        i += 1;
    }
    out
}

pub(super) fn bind(lines: &[LogicalLine], table: &mut SymbolTable) {
    let mut depth = 0usize;
    for line in lines {
        let short_circuit = line.text.contains("&&") || line.text.contains("||");
        for command in split_commands(&line.text, SEPARATORS) {
            let words = split_words(command);
            let mut rest: &[Word] = &words;
            let mut opened_here = false;
            while let Some(first) = rest.first().filter(|w| !w.quoted) {
                let word = first.text.as_str();
                if BLOCK_CLOSERS.contains(&word) {
                    depth = depth.saturating_sub(1);
                    rest = &rest[1..];
                } else if BLOCK_OPENERS.contains(&word) {
                    depth += 1;
                    opened_here = true;
                    break;
                } else if matches!(word, "then" | "do" | "else" | "elif" | "{" | "}" | "!") {
                    rest = &rest[1..];
                } else {
                    break;
                }
            }
            if opened_here {
                bind_loop_variable(rest, line, table);
                continue;
            }
            let conditional = depth > 0 || short_circuit;
            bind_command(rest, line, conditional, table);
        }
    }
}

/// `for NAME in ...` and `select NAME in ...` rebind NAME on every pass.
fn bind_loop_variable(words: &[Word], line: &LogicalLine, table: &mut SymbolTable) {
    if let (Some(keyword), Some(name)) = (words.first(), words.get(1)) {
        if keyword.text == "for" || keyword.text == "select" {
            table.bind_unknown(&name.text, line.number);
        }
    }
}

fn bind_command(words: &[Word], line: &LogicalLine, conditional: bool, table: &mut SymbolTable) {
    let Some(first) = words.first() else {
        return;
    };
    let (assignments, declared) = match first.text.as_str() {
        "export" | "readonly" | "local" | "declare" | "typeset" => {
            let args: Vec<&Word> = words[1..].iter().filter(|w| !w.text.starts_with('-')).collect();
            (args, true)
        }
        "read" => {
            for w in words[1..].iter().filter(|w| !w.text.starts_with('-')) {
                table.bind_unknown(&w.text, line.number);
            }
            return;
        }
        _ => (words.iter().take_while(|w| is_assignment_word(w)).collect(), false),
    };
    // `FOO=bar cmd` only sets FOO for that one command.
    if !declared && assignments.len() < words.len() {
        return;
    }
    for word in assignments {
        let Some((name, value)) = word.text.split_once('=') else {
            continue;
        };
        let name = name.trim_end_matches('+');
        if conditional || value.starts_with('(') {
            table.bind_unknown(name, line.number);
        } else {
            table.bind_literal(name, line.number, value);
        }
    }
}
