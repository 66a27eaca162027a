//! Lexical helpers shared by the dialect scanners.

use crate::model::Dialect;

/// Extensions that mark a token as a script path.
pub const SCRIPT_EXTENSIONS: &[&str] =
    &["sh", "bash", "ksh", "zsh", "bat", "cmd", "ps1", "psm1", "pl", "pm", "py"];

/// Comment-stripped, continuation-joined source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-based number of the first physical line.
    pub number: usize,
    /// Leading whitespace width of the first physical line (tab = 4).
    pub indent: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `#` to end of line.
    Hash,
    /// `REM` and `::` lines.
    Batch,
    /// `#` plus `<# ... #>` blocks.
    PowerShell,
    /// `#` plus `=pod ... =cut` blocks.
    Perl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// A trailing character joins the next physical line.
    Trailing(char),
    /// Lines are joined while brackets stay open.
    Brackets,
}

/// Physical lines merged into one logical line at most.
const MAX_JOINED_LINES: usize = 32;

pub fn logical_lines(raw: &str, comments: CommentStyle, continuation: Continuation) -> Vec<LogicalLine> {
    let mut out = Vec::new();
    let mut pending: Option<(LogicalLine, usize)> = None;
    let mut in_block = false;

    for (idx, physical) in raw.lines().enumerate() {
        let number = idx + 1;
        let stripped = match comments {
            CommentStyle::Hash => strip_hash_comment(physical).to_string(),
            CommentStyle::Batch => strip_batch_comment(physical).to_string(),
            CommentStyle::PowerShell => strip_powershell_comments(physical, &mut in_block),
            CommentStyle::Perl => {
                let trimmed = physical.trim_start();
                if physical.starts_with('=') && trimmed.len() > 1 {
                    in_block = !physical.starts_with("=cut");
                    continue;
                }
                if in_block {
                    continue;
                }
                strip_hash_comment(physical).to_string()
            }
        };

        let (text, joins) = match continuation {
            Continuation::Trailing(c) => {
                let trimmed = stripped.trim_end();
                match trimmed.strip_suffix(c) {
                    Some(body) => (body.to_string(), true),
                    None => (stripped.clone(), false),
                }
            }
            Continuation::Brackets => (stripped.clone(), false),
        };

        let (mut line, count) = match pending.take() {
            Some((mut acc, count)) => {
                acc.text = format!("{} {}", acc.text.trim_end(), text.trim());
                (acc, count + 1)
            }
            None => (LogicalLine { number, indent: indent_of(physical), text }, 1),
        };

        let open = match continuation {
            Continuation::Trailing(_) => joins,
            Continuation::Brackets => bracket_balance(&line.text) > 0,
        };
        if open && count < MAX_JOINED_LINES {
            pending = Some((line, count));
            continue;
        }
        line.text = line.text.trim().to_string();
        if !line.text.is_empty() {
            out.push(line);
        }
    }
    if let Some((mut line, _)) = pending {
        line.text = line.text.trim().to_string();
        if !line.text.is_empty() {
            out.push(line);
        }
    }
    out
}

fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Cut a `#` comment that starts a word outside quotes.
pub fn strip_hash_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            prev = Some(c);
            continue;
        }
        match quote {
            Some(q) => {
                if c == '\\' && q == '"' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\\' => escaped = true,
                '"' | '\'' => quote = Some(c),
                '#' if prev.map(|p| p.is_whitespace() || p == ';').unwrap_or(true) => {
                    return &line[..i];
                }
                _ => {}
            },
        }
        prev = Some(c);
    }
    line
}

fn strip_batch_comment(line: &str) -> &str {
    let trimmed = line.trim_start().trim_start_matches('@');
    let lower = trimmed.to_ascii_lowercase();
    if lower == "rem" || lower.starts_with("rem ") || lower.starts_with("rem\t") || trimmed.starts_with("::") {
        return "";
    }
    line
}

fn strip_powershell_comments(line: &str, in_block: &mut bool) -> String {
    let mut rest = line;
    let mut kept = String::new();
    loop {
        if *in_block {
            match rest.find("#>") {
                Some(end) => {
                    rest = &rest[end + 2..];
                    *in_block = false;
                }
                None => break,
            }
        } else {
            match rest.find("<#") {
                Some(start) => {
                    kept.push_str(&rest[..start]);
                    kept.push(' ');
                    rest = &rest[start + 2..];
                    *in_block = true;
                }
                None => {
                    kept.push_str(rest);
                    break;
                }
            }
        }
    }
    strip_hash_comment(&kept).to_string()
}

/// Net count of open brackets outside quotes.
pub fn bracket_balance(text: &str) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                _ => {}
            },
        }
    }
    depth
}

/// Split a line into commands on the given separators, outside quotes and
/// outside `$( ... )` / `( ... )` groups.
pub fn split_commands<'a>(line: &'a str, separators: &[char]) -> Vec<&'a str> {
    split_commands_with(line, separators, &['"', '\''])
}

/// [`split_commands`] with an explicit set of quote characters.
pub fn split_commands_with<'a>(line: &'a str, separators: &[char], quotes: &[char]) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in line.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                _ if quotes.contains(&c) => quote = Some(c),
                '(' => depth += 1,
                ')' => depth -= 1,
                _ if depth <= 0 && separators.contains(&c) => {
                    out.push(&line[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    out.push(&line[start..]);
    out.into_iter().map(str::trim).filter(|s| !s.is_empty()).collect()
}

/// One whitespace-separated word with surrounding quotes removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub quoted: bool,
}

impl Word {
    pub fn is_flag(&self) -> bool {
        !self.quoted && (self.text.starts_with('-') || (self.text.starts_with('/') && self.text.len() == 2))
    }
}

/// Split a command into words, honoring single and double quotes.
///
/// Grouping constructs `$(...)` and `${...}` are kept inside one word.
pub fn split_words(command: &str) -> Vec<Word> {
    split_words_with(command, &['"', '\''])
}

/// [`split_words`] with an explicit set of quote characters.
pub fn split_words_with(command: &str, quotes: &[char]) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut depth = 0i32;

    for c in command.chars() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            } else {
                current.push(c);
            }
            continue;
        }
        match c {
            _ if depth == 0 && quotes.contains(&c) => {
                quote = Some(c);
                quoted = true;
                in_word = true;
            }
            '(' | '{' if current.ends_with('$') || depth > 0 => {
                depth += 1;
                current.push(c);
                in_word = true;
            }
            ')' | '}' if depth > 0 => {
                depth -= 1;
                current.push(c);
            }
            c if c.is_whitespace() && depth == 0 => {
                if in_word {
                    words.push(Word { text: std::mem::take(&mut current), quoted });
                    quoted = false;
                    in_word = false;
                }
            }
            _ => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(Word { text: current, quoted });
    }
    words
}

/// Remove one layer of matching quotes.
pub fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Whether the token ends in a known script extension.
pub fn has_script_extension(token: &str) -> bool {
    let token = token.trim_end_matches(|c| c == '"' || c == '\'' || c == ')' || c == ';');
    let name = token.rsplit(['/', '\\']).next().unwrap_or(token);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            SCRIPT_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext))
        }
        _ => false,
    }
}

/// Whether the whole word is one variable reference: `$X`, `${X}`, `%X%`
/// or `!X!`.
pub fn is_variable_word(text: &str) -> bool {
    let name = if let Some(inner) = text.strip_prefix("${").and_then(|t| t.strip_suffix('}')) {
        inner
    } else if let Some(inner) = text.strip_prefix('$') {
        inner
    } else if text.len() > 2
        && ((text.starts_with('%') && text.ends_with('%')) || (text.starts_with('!') && text.ends_with('!')))
    {
        &text[1..text.len() - 1]
    } else {
        return false;
    };
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Rejoin words into a command line, re-quoting words that were quoted.
pub fn command_line(words: &[Word]) -> String {
    words
        .iter()
        .map(|w| if w.quoted { format!("\"{}\"", w.text) } else { w.text.clone() })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Raw target of a command whose program is `words[0]`.
///
/// A program held in a variable may be an interpreter (`$PY tools/x.py`), so
/// its arguments are kept for the resolver.
pub fn program_expression(words: &[Word]) -> String {
    match words.first() {
        Some(program) if words.len() > 1 && is_variable_word(&program.text) => command_line(words),
        Some(program) => program.text.clone(),
        None => String::new(),
    }
}

/// Whether the token looks like a relative path (`./x`, `.\x`, `../x`).
pub fn is_relative_path(token: &str) -> bool {
    token.starts_with("./") || token.starts_with(".\\") || token.starts_with("../") || token.starts_with("..\\")
}

/// Interpreter named by the program word, if any.
pub fn interpreter_of(program: &str) -> Option<Dialect> {
    let name = program.rsplit(['/', '\\']).next().unwrap_or(program);
    Dialect::from_interpreter(name)
}

/// Flags that consume the following word as their value.
fn flag_takes_value(lang: Dialect, flag: &str) -> bool {
    let lower = flag.to_ascii_lowercase();
    match lang {
        Dialect::PowerShell => matches!(
            lower.as_str(),
            "-executionpolicy" | "-ep" | "-windowstyle" | "-configurationname" | "-version" | "-workingdirectory"
        ),
        Dialect::PythonCli => matches!(lower.as_str(), "-w" | "-x"),
        Dialect::Shell => matches!(lower.as_str(), "-o" | "+o"),
        Dialect::Perl => false,
        _ => false,
    }
}

/// Flags after which no script path follows (inline code, module mode).
fn flag_ends_search(lang: Dialect, flag: &str) -> bool {
    let lower = flag.to_ascii_lowercase();
    match lang {
        Dialect::PowerShell => matches!(lower.as_str(), "-command" | "-c" | "-encodedcommand" | "-e" | "-ec"),
        Dialect::PythonCli => matches!(lower.as_str(), "-c" | "-m"),
        Dialect::Shell => lower == "-c",
        Dialect::Perl => matches!(lower.as_str(), "-e" | "-e5" | "-m"),
        Dialect::Batch => false,
        Dialect::Unknown => false,
    }
}

/// For a command whose first word names an interpreter, return the
/// interpreter dialect and the index of the script argument.
pub fn interpreter_target(words: &[Word]) -> Option<(Dialect, usize)> {
    let program = words.first()?;
    let lang = interpreter_of(&program.text)?;
    let mut i = 1;
    while i < words.len() {
        let word = &words[i];
        if word.is_flag() {
            let lower = word.text.to_ascii_lowercase();
            if flag_ends_search(lang, &lower) {
                return None;
            }
            // `cmd /c target` and `pwsh -File target` name the script next.
            if lower == "/c" || lower == "/k" || lower == "-file" || lower == "-f" {
                return (i + 1 < words.len()).then_some((lang, i + 1));
            }
            i += if flag_takes_value(lang, &lower) { 2 } else { 1 };
            continue;
        }
        return Some((lang, i));
    }
    None
}

/// True for `NAME=value` words (environment prefixes and assignments).
pub fn is_assignment_word(word: &Word) -> bool {
    match word.text.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().next().map(|c| c.is_ascii_alphabetic() || c == '_').unwrap_or(false)
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}

/// Text inside the bracket group that opens at byte `open` (which must be
/// `(`, `[` or `{`), up to its matching close, or to the end of the text.
pub fn bracket_group(text: &str, open: usize) -> &str {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in text[open..].char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return &text[open + 1..open + i];
                    }
                }
                _ => {}
            },
        }
    }
    &text[(open + 1).min(text.len())..]
}

/// Split an argument list on top-level commas (and Perl's `=>`).
pub fn split_args(args: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    let bytes = args.as_bytes();
    for (i, c) in args.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                ',' if depth == 0 => {
                    out.push(&args[start..i]);
                    start = i + 1;
                }
                '=' if depth == 0 && bytes.get(i + 1) == Some(&b'>') => {
                    out.push(&args[start..i]);
                    start = i + 2;
                }
                _ => {}
            },
        }
    }
    out.push(&args[start..]);
    out.into_iter().map(str::trim).filter(|s| !s.is_empty()).collect()
}

/// Piece of a line split at block braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Code(&'a str),
    Open,
    Close,
}

/// Split a line at block braces outside quotes. `${...}`, `@{...}` and
/// subscripts such as `$ENV{X}` or `$h->{k}` are kept inside code.
pub fn brace_segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut quote: Option<char> = None;
    let mut inline_depth = 0i32;
    let mut start = 0;
    let mut prev: Option<char> = None;
    // Inside a `$name` / `@name` token, or right after `->`.
    let mut in_variable = false;
    for (i, c) in text.char_indices() {
        let subscript = in_variable || (prev == Some('>') && text[..i].ends_with("->"));
        in_variable = match c {
            '$' | '@' => true,
            _ if c.is_ascii_alphanumeric() || c == '_' || c == ':' => in_variable,
            _ => false,
        };
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '{' if inline_depth > 0 || subscript || matches!(prev, Some('$') | Some('@') | Some('%')) => {
                    inline_depth += 1;
                }
                '}' if inline_depth > 0 => {
                    inline_depth -= 1;
                    // `$h{a}{b}` chains.
                    in_variable = inline_depth == 0;
                }
                '{' | '}' => {
                    let code = text[start..i].trim();
                    if !code.is_empty() {
                        out.push(Segment::Code(code));
                    }
                    out.push(if c == '{' { Segment::Open } else { Segment::Close });
                    start = i + 1;
                }
                _ => {}
            },
        }
        prev = Some(c);
    }
    let code = text[start..].trim();
    if !code.is_empty() {
        out.push(Segment::Code(code));
    }
    out
}

/// Stack of open blocks, each flagged conditional or not.
#[derive(Debug, Default)]
pub struct BlockStack {
    blocks: Vec<bool>,
}

impl BlockStack {
    pub fn open(&mut self, conditional: bool) {
        self.blocks.push(conditional);
    }

    pub fn close(&mut self) {
        self.blocks.pop();
    }

    pub fn truncate(&mut self, len: usize) {
        self.blocks.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// True when any enclosing block is a conditional or loop.
    pub fn in_conditional(&self) -> bool {
        self.blocks.iter().any(|c| *c)
    }
}

/// First word of `code`, lowercased, without a trailing `(`.
pub fn leading_keyword(code: &str) -> String {
    code.split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_comments_respect_quotes_and_parameter_length() {
        assert_eq!(strip_hash_comment("echo 'a # b' # trailing"), "echo 'a # b' ");
        assert_eq!(strip_hash_comment("echo ${#ARR[@]}"), "echo ${#ARR[@]}");
        assert_eq!(strip_hash_comment("# whole line"), "");
    }

    #[test]
    fn trailing_continuations_join_lines() {
        let lines = logical_lines("bash \\\n  tools/a.sh\necho done\n", CommentStyle::Hash, Continuation::Trailing('\\'));
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].number, 1);
        assert_eq!(lines[0].text, "bash tools/a.sh");
        assert_eq!(lines[1].number, 3);
    }

    #[test]
    fn bracket_continuations_join_calls() {
        let text = "subprocess.run([\n    'bash',\n    'x.sh',\n])\nprint('ok')\n";
        let lines = logical_lines(text, CommentStyle::Hash, Continuation::Brackets);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].text.contains("'x.sh'"));
    }

    #[test]
    fn powershell_block_comments_are_removed() {
        let text = "<# header\n. ./hidden.ps1\n#>\n. ./real.ps1\n";
        let lines = logical_lines(text, CommentStyle::PowerShell, Continuation::Trailing('`'));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].number, 4);
    }

    #[test]
    fn perl_pod_blocks_are_removed() {
        let text = "=pod\nsystem('x.sh');\n=cut\nsystem('y.sh');\n";
        let lines = logical_lines(text, CommentStyle::Perl, Continuation::Brackets);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].text.contains("y.sh"));
    }

    #[test]
    fn words_keep_substitutions_together() {
        let words = split_words("bash \"$(dirname \"$0\")/x.sh\" --flag");
        assert_eq!(words.len(), 3);
        assert!(words[1].quoted);
        let words = split_words("source ${UTILS}/cleanup.sh");
        assert_eq!(words[1].text, "${UTILS}/cleanup.sh");
    }

    #[test]
    fn variable_programs_keep_their_arguments() {
        assert!(is_variable_word("$PY"));
        assert!(is_variable_word("${PY}"));
        assert!(is_variable_word("%PYTHON%"));
        assert!(is_variable_word("!Tool!"));
        assert!(!is_variable_word("$TOOLS/x.sh"));
        assert!(!is_variable_word("%~dp0x.bat"));
        assert!(!is_variable_word("%%F"));

        let words = split_words("$PY -u \"my tools/check.py\"");
        assert_eq!(program_expression(&words), "$PY -u \"my tools/check.py\"");
        assert_eq!(program_expression(&split_words("./run.sh --fast")), "./run.sh");
        assert_eq!(program_expression(&split_words("$RUNNER")), "$RUNNER");
    }

    #[test]
    fn interpreter_target_skips_flags() {
        let words = split_words("powershell -NoProfile -ExecutionPolicy Bypass -File .\\ps\\stage.ps1");
        assert_eq!(interpreter_target(&words), Some((Dialect::PowerShell, 5)));
        let words = split_words("python3 -u tools/check.py --fast");
        assert_eq!(interpreter_target(&words), Some((Dialect::PythonCli, 2)));
        let words = split_words("python3 -m http.server");
        assert_eq!(interpreter_target(&words), None);
        let words = split_words("cmd /c build.bat");
        assert_eq!(interpreter_target(&words), Some((Dialect::Batch, 2)));
    }

    #[test]
    fn brace_segments_keep_variable_braces() {
        let segs = brace_segments("if ($x) { . ${Root}/a.ps1 } else { @{a=1} }");
        assert_eq!(
            segs,
            vec![
                Segment::Code("if ($x)"),
                Segment::Open,
                Segment::Code(". ${Root}/a.ps1"),
                Segment::Close,
                Segment::Code("else"),
                Segment::Open,
                Segment::Code("@{a=1}"),
                Segment::Close,
            ]
        );
    }

    #[test]
    fn args_split_on_top_level_commas() {
        assert_eq!(split_args("['bash', 'x.sh'], check=True"), vec!["['bash', 'x.sh']", "check=True"]);
        assert_eq!(bracket_group("run(['a', f(b)]) + 1", 3), "['a', f(b)]");
    }
}
