//! CLI-oriented Python (.py). Surface patterns only; every call-site is
//! `Heuristic`.
//!
//! Rule priority per call expression:
//! 1. `subprocess.run/call/check_call/check_output/Popen/getoutput(...)`
//! 2. `os.system(...)`, `os.popen(...)`, `os.exec*(...)`, `os.spawn*(...)`
//! 3. `runpy.run_path(...)` and `exec(open(...).read())` as includes
//! 4. bare `run(...)`, `check_call(...)`, ... when the file has
//!    `from subprocess import ...`
//!
//! A command given as a list is an argv; a string is split like a shell
//! command line. `sys.executable` stands for `python`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{CallSite, Confidence, InvocationKind};
use crate::symbols::SymbolTable;

use super::call_site;
use super::text::{
    bracket_group, has_script_extension, interpreter_target, is_relative_path, leading_keyword, logical_lines,
    split_args, split_words, CommentStyle, Continuation, LogicalLine, Word,
};

static SUBPROCESS_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bsubprocess\.(?:run|call|check_call|check_output|Popen|getoutput|getstatusoutput)\s*\(")
        .expect("Invalid subprocess regex")
});
static OS_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bos\.(system|popen|exec[lv]p?e?|spawn[lv]p?e?)\s*\(").expect("Invalid os call regex")
});
static INCLUDE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\brunpy\.run_path\s*\(|\bexec\s*\(\s*open\s*\(").expect("Invalid run_path regex")
});
static BARE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^.\w])((?:run|call|check_call|check_output|Popen|getoutput|getstatusoutput)\s*\()")
        .expect("Invalid bare call regex")
});
static SUBPROCESS_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^from\s+subprocess\s+import\b").expect("Invalid import regex"));
static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*(?::\s*[A-Za-z_][\w\[\], .]*)?=\s*([^=].*)$")
        .expect("Invalid Python assignment regex")
});
static FOR_LOOP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:async\s+)?for\s+([A-Za-z_][A-Za-z0-9_]*)\s+in\b").expect("Invalid for regex")
});
static IDENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid name regex"));

const CONDITIONAL_BLOCKS: &[&str] =
    &["if", "elif", "else", "for", "while", "try", "except", "finally", "with", "match", "case", "async"];
const PLAIN_BLOCKS: &[&str] = &["def", "class"];

pub(super) fn lines(raw: &str) -> Vec<LogicalLine> {
    logical_lines(raw, CommentStyle::Hash, Continuation::Brackets)
}

pub(super) fn scan(source: &str, lines: &[LogicalLine]) -> Vec<CallSite> {
    let bare_calls = lines.iter().any(|l| SUBPROCESS_IMPORT.is_match(&l.text));
    let mut out = Vec::new();
    for line in lines {
        let mut found: Vec<(usize, CallSite)> = Vec::new();
        let text = line.text.as_str();

        for m in SUBPROCESS_CALL.find_iter(text).filter(|m| !in_string(text, m.start())) {
            let args = split_args(bracket_group(text, m.end() - 1));
            if let Some(site) = args.first().and_then(|first| command_site(source, line, command_words(first))) {
                found.push((m.start(), site));
            }
        }

        for caps in OS_CALL.captures_iter(text) {
            let (Some(whole), Some(func)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if in_string(text, whole.start()) {
                continue;
            }
            let args = split_args(bracket_group(text, whole.end() - 1));
            let words = match func.as_str() {
                "system" | "popen" => args.first().map(|a| command_words(a)).unwrap_or_default(),
                f => exec_words(&args, f.starts_with("spawn")),
            };
            if let Some(site) = command_site(source, line, words) {
                found.push((whole.start(), site));
            }
        }

        for m in INCLUDE_CALL.find_iter(text).filter(|m| !in_string(text, m.start())) {
            let args = split_args(bracket_group(text, m.end() - 1));
            if let Some(target) = args.first().and_then(|a| py_value(a)) {
                let site = call_site(source, line, &target, InvocationKind::Source, Confidence::Heuristic);
                found.push((m.start(), site));
            }
        }

        if bare_calls {
            for m in BARE_CALL.captures_iter(text).filter_map(|caps| caps.get(1)) {
                if in_string(text, m.start()) {
                    continue;
                }
                let args = split_args(bracket_group(text, m.end() - 1));
                if let Some(site) = args.first().and_then(|first| command_site(source, line, command_words(first))) {
                    found.push((m.start(), site));
                }
            }
        }

        found.sort_by_key(|(pos, _)| *pos);
        out.extend(found.into_iter().map(|(_, site)| site));
    }
    out
}

fn command_site(source: &str, line: &LogicalLine, words: Vec<Word>) -> Option<CallSite> {
    if let Some((lang, idx)) = interpreter_target(&words) {
        let kind = InvocationKind::InterpreterHop { lang };
        return Some(call_site(source, line, &words[idx].text, kind, Confidence::Heuristic));
    }
    let program = words.first()?;
    let text = program.text.as_str();
    if has_script_extension(text) || is_relative_path(text) || text.starts_with('{') {
        return Some(call_site(source, line, text, InvocationKind::Execute, Confidence::Heuristic));
    }
    None
}

/// Words of a command argument: a list is an argv, a string is a command
/// line, anything else one opaque word.
fn command_words(arg: &str) -> Vec<Word> {
    let arg = arg.trim();
    if arg.starts_with('[') || arg.starts_with('(') {
        return list_items(arg).collect();
    }
    let arg = arg.strip_prefix("shlex.split(").and_then(|a| a.strip_suffix(')')).unwrap_or(arg);
    match string_literal(arg) {
        Some(command) => split_words(&command),
        None => py_value(arg).map(|text| vec![Word { text, quoted: true }]).unwrap_or_default(),
    }
}

fn list_items(list: &str) -> impl Iterator<Item = Word> + '_ {
    split_args(bracket_group(list, 0))
        .into_iter()
        .filter_map(py_value)
        .map(|text| Word { text, quoted: false })
}

/// `os.execv(path, [argv0, ...])`, `os.execl(path, argv0, ...)` and the
/// `spawn*` forms, which take a mode first.
fn exec_words(args: &[&str], has_mode: bool) -> Vec<Word> {
    let args = if has_mode { args.get(1..).unwrap_or(&[]) } else { args };
    let Some(path) = args.first().and_then(|p| py_value(p)) else {
        return Vec::new();
    };
    let mut words = vec![Word { text: path, quoted: false }];
    match &args[1..] {
        [list] if list.starts_with('[') || list.starts_with('(') => words.extend(list_items(list).skip(1)),
        rest => words.extend(
            rest.iter()
                .skip(1)
                .filter_map(|a| py_value(a))
                .map(|text| Word { text, quoted: false }),
        ),
    }
    words
}

/// Content of a plain, raw or f-string literal.
fn string_literal(expr: &str) -> Option<String> {
    let expr = expr.trim();
    let body = expr.trim_start_matches(|c: char| matches!(c, 'f' | 'F' | 'r' | 'R' | 'b' | 'B' | 'u' | 'U'));
    if expr.len() - body.len() > 2 {
        return None;
    }
    for q in ['"', '\''] {
        if let Some(inner) = body.strip_prefix(q).and_then(|s| s.strip_suffix(q)) {
            return (!inner.contains(q)).then(|| inner.to_string());
        }
    }
    None
}

/// Static value of a Python expression, with identifiers as `{NAME}`
/// references for the symbol table.
fn py_value(expr: &str) -> Option<String> {
    let expr = expr.trim().trim_end_matches(',').trim();
    if expr.contains("__file__") {
        return (expr.contains("dirname") || expr.ends_with(".parent")).then(|| ".".to_string());
    }
    if let Some(s) = string_literal(expr) {
        return Some(s);
    }
    if expr == "sys.executable" {
        return Some("python".to_string());
    }
    if IDENT.is_match(expr) {
        return Some(format!("{{{expr}}}"));
    }
    for wrapper in ["os.path.join(", "str(", "Path(", "pathlib.Path(", "os.path.abspath(", "os.path.normpath("] {
        if let Some(inner) = expr.strip_prefix(wrapper).and_then(|s| s.strip_suffix(')')) {
            if bracket_group(expr, wrapper.len() - 1).len() != inner.len() {
                break;
            }
            let parts = split_args(inner).into_iter().map(py_value).collect::<Option<Vec<_>>>()?;
            return Some(parts.join("/"));
        }
    }
    for (sep, glue) in [('+', ""), ('/', "/")] {
        let parts = split_top_level(expr, sep);
        if parts.len() > 1 {
            let values = parts.into_iter().map(py_value).collect::<Option<Vec<_>>>()?;
            return Some(values.join(glue));
        }
    }
    None
}

/// Split on `sep` outside quotes and brackets.
fn split_top_level(expr: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ if c == sep && depth == 0 => {
                    out.push(expr[start..i].trim());
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    out.push(expr[start..].trim());
    out
}

fn in_string(text: &str, pos: usize) -> bool {
    let mut quote: Option<char> = None;
    for c in text[..pos].chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None => {}
        }
    }
    quote.is_some()
}

pub(super) fn bind(lines: &[LogicalLine], table: &mut SymbolTable) {
    // (indent, conditional) of every open block.
    let mut blocks: Vec<(usize, bool)> = Vec::new();
    for line in lines {
        while blocks.last().map(|(indent, _)| *indent >= line.indent).unwrap_or(false) {
            blocks.pop();
        }
        let text = line.text.as_str();
        let conditional = blocks.iter().any(|(_, c)| *c);
        let keyword = leading_keyword(text);
        let keyword = keyword.trim_end_matches(':');

        if let Some(caps) = FOR_LOOP.captures(text) {
            table.bind_unknown(&caps[1], line.number);
        }

        if CONDITIONAL_BLOCKS.contains(&keyword) || PLAIN_BLOCKS.contains(&keyword) {
            let opens_conditional = CONDITIONAL_BLOCKS.contains(&keyword);
            if text.ends_with(':') {
                blocks.push((line.indent, opens_conditional));
            } else if let Some((_, body)) = text.split_once(':') {
                // `if x: NAME = ...` on one line.
                if let Some(caps) = ASSIGNMENT.captures(body.trim()) {
                    table.bind_unknown(&caps[1], line.number);
                }
            }
            continue;
        }

        let Some(caps) = ASSIGNMENT.captures(text) else {
            continue;
        };
        match py_value(&caps[2]) {
            Some(value) if !conditional => table.bind_literal(&caps[1], line.number, &value),
            _ => table.bind_unknown(&caps[1], line.number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dialect, ScriptFile};
    use crate::services::scanners::analyze;
    use crate::symbols::BindingValue;

    fn analyze_text(text: &str) -> (Vec<CallSite>, SymbolTable) {
        analyze(&ScriptFile::new("tools/driver.py", Dialect::PythonCli, text))
    }

    #[test]
    fn recognizes_subprocess_and_os_patterns() {
        let (sites, _) = analyze_text(
            "import subprocess, os, sys, runpy\nfrom subprocess import check_call\nTOOLS = \"tools\"\n\
             subprocess.run([\"bash\", \"jobs/a.sh\", \"--x\"], check=True)\nos.system(\"./cleanup.sh now\")\n\
             check_call([sys.executable, f\"{TOOLS}/check.py\"])\nsubprocess.Popen(\"perl report.pl\", shell=True)\n\
             runpy.run_path(\"lib/shared.py\")\nos.execv(\"./final.sh\", [\"final.sh\", \"-q\"])\nprint(\"run(x.sh)\")\n",
        );
        let found: Vec<_> = sites.iter().map(|s| (s.raw_target_expression.as_str(), s.kind, s.line)).collect();
        assert_eq!(
            found,
            vec![
                ("jobs/a.sh", InvocationKind::InterpreterHop { lang: Dialect::Shell }, 4),
                ("./cleanup.sh", InvocationKind::Execute, 5),
                ("{TOOLS}/check.py", InvocationKind::InterpreterHop { lang: Dialect::PythonCli }, 6),
                ("report.pl", InvocationKind::InterpreterHop { lang: Dialect::Perl }, 7),
                ("lib/shared.py", InvocationKind::Source, 8),
                ("./final.sh", InvocationKind::Execute, 9),
            ]
        );
        assert!(sites.iter().all(|s| s.confidence == Confidence::Heuristic));
    }

    #[test]
    fn bare_calls_need_a_subprocess_import() {
        let (sites, _) = analyze_text("run(['./a.sh'])\n");
        assert!(sites.is_empty());
    }

    #[test]
    fn identifier_arguments_become_references() {
        let (sites, table) = analyze_text("import subprocess\nSCRIPT = 'jobs/b.sh'\nsubprocess.call(SCRIPT)\n");
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].raw_target_expression, "{SCRIPT}");
        assert_eq!(table.expand("{SCRIPT}", 3).as_deref(), Ok("jobs/b.sh"));
    }

    #[test]
    fn bindings_follow_indentation_blocks() {
        let (_, table) = analyze_text(
            "import os\nHERE = os.path.dirname(os.path.abspath(__file__))\nBIN = os.path.join(HERE, \"bin\")\n\
             if os.name == \"nt\":\n    BIN = \"win\"\nRUNNER = f\"{BIN}/run.sh\"\nfor step in steps:\n    pass\n\
             def main():\n    LOCAL = \"x.sh\"\n",
        );
        assert_eq!(table.lookup("BIN", 3), Some(&BindingValue::Literal("./bin".into())));
        assert_eq!(table.lookup("BIN", 5), Some(&BindingValue::Unknown));
        assert_eq!(table.lookup("RUNNER", 6), Some(&BindingValue::Unknown));
        assert_eq!(table.lookup("step", 7), Some(&BindingValue::Unknown));
        assert_eq!(table.lookup("LOCAL", 10), Some(&BindingValue::Literal("x.sh".into())));
    }
}
