//! Allow-listed inspection commands whose output must be empty
//!
//! A command line is lexed once, quote-aware, into simple commands. Every
//! command position must name an allow-listed binary (or a side-effect free
//! shell builtin) and output may only be redirected to `/dev/null` or another
//! descriptor. Plain invocations run directly; anything using shell syntax
//! runs through `sh -c` after validation.

use super::{mismatch, EvalContext, Evaluator};
use crate::check::{Check, Family};
use hostaudit_core::{truncate_snippet, Error, ErrorKind, Evidence, Outcome, Result};
use hostaudit_parsers::HostRoot;
use hostaudit_snapshot::{CommandOutput, CommandRunner};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Read-only binaries a rule may run
pub const ALLOWED_COMMANDS: &[&str] = &["find", "awk", "grep", "stat", "ls", "cut", "sort", "uniq"];

/// Builtins accepted inside shell constructs
const ALLOWED_BUILTINS: &[&str] = &["echo", "printf", "test", "[", "read"];

/// Words that open or continue a construct; the next word is a command
const LEADING_KEYWORDS: &[&str] = &["if", "then", "else", "elif", "do", "while", "until", "!", "{"];

/// Words that close a construct and are followed by nothing to check
const CLOSING_KEYWORDS: &[&str] = &["fi", "done", "esac", "}"];

/// `find` actions that delete, write files or spawn programs
const FIND_WRITE_ACTIONS: &[&str] = &[
    "-delete", "-exec", "-execdir", "-ok", "-okdir", "-fprint", "-fprint0", "-fprintf", "-fls",
];

const OUTPUT_CHARS: usize = 100;

/// `2>/dev/null`, `>&2`, `2>&1`
static SAFE_REDIRECT_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(/dev/null|&[0-9]|&-)$").unwrap());

static ASSIGNMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*=").unwrap());

/// awk `system()`, pipes (`||` aside) and `print > file`
static AWK_SIDE_EFFECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bsystem\s*\(|(^|[^|])\|([^|]|$)|\bprintf?\b[^;{}]*>|\binplace\b").unwrap()
});

/// A validated command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Single allow-listed program with literal arguments
    Direct { program: String, args: Vec<String> },
    /// Script for `sh -c`; every command in it was checked
    Shell(String),
}

impl CommandLine {
    /// Validate a command line against the allow-list
    pub fn parse(command: &str) -> Result<Self> {
        let lexed = lex(command)?;

        for words in &lexed.commands {
            let start = command_index(words);
            let leading = &words[..start.unwrap_or(words.len())];
            for assignment in leading.iter().filter(|w| ASSIGNMENT.is_match(w)) {
                if let Some((_, value)) = assignment.split_once('=') {
                    if hides_write_args(value) {
                        return Err(Error::CommandNotAllowed {
                            command: assignment.clone(),
                        });
                    }
                }
            }

            let Some(start) = start else {
                continue;
            };
            let program = words[start].as_str();
            if !ALLOWED_COMMANDS.contains(&program)
                && !(lexed.shell && ALLOWED_BUILTINS.contains(&program))
            {
                return Err(Error::CommandNotAllowed {
                    command: program.to_string(),
                });
            }
            if let Some(arg) = write_arg(program, &words[start + 1..]) {
                return Err(Error::CommandNotAllowed {
                    command: format!("{} {}", program, arg),
                });
            }
        }

        if lexed.shell {
            return Ok(CommandLine::Shell(command.trim().to_string()));
        }

        let mut words = lexed.commands.into_iter().next().unwrap_or_default();
        if words.is_empty() {
            return Err(Error::CommandNotAllowed {
                command: String::new(),
            });
        }
        let program = words.remove(0);
        Ok(CommandLine::Direct {
            program,
            args: words,
        })
    }

    fn run(&self, runner: &CommandRunner) -> Result<CommandOutput> {
        match self {
            CommandLine::Direct { program, args } => runner.run(program, args),
            CommandLine::Shell(script) => runner.run_shell(script),
        }
    }
}

/// Position of the word in a simple command that names something to execute
fn command_index(words: &[String]) -> Option<usize> {
    for (i, word) in words.iter().map(String::as_str).enumerate() {
        if ASSIGNMENT.is_match(word) {
            continue;
        }
        if LEADING_KEYWORDS.contains(&word) {
            continue;
        }
        if CLOSING_KEYWORDS.contains(&word) {
            // `done | sort` style tails have no command of their own
            return None;
        }
        if word == "for" || word == "case" || word == "in" {
            // Loop variables and word lists are not commands
            return None;
        }
        return Some(i);
    }
    None
}

/// Argument that would make an allow-listed binary write or spawn
fn write_arg<'w>(program: &str, args: &'w [String]) -> Option<&'w str> {
    let found = match program {
        "find" => args.iter().find(|a| FIND_WRITE_ACTIONS.contains(&a.as_str())),
        "sort" => args.iter().find(|a| sort_writes(a)),
        "awk" => args.iter().find(|a| {
            matches!(a.as_str(), "-i" | "-f")
                || long_option(a, "include")
                || long_option(a, "file")
                || AWK_SIDE_EFFECT.is_match(a)
        }),
        "uniq" => uniq_output(args),
        _ => None,
    };
    found.map(String::as_str)
}

/// `--name`, `--name=value` or an unambiguous prefix of either
fn long_option(arg: &str, name: &str) -> bool {
    let Some(option) = arg.strip_prefix("--") else {
        return false;
    };
    let option = option.split('=').next().unwrap_or("");
    !option.is_empty() && name.starts_with(option)
}

/// `-o FILE`, `-uoFILE`, `--output=FILE`
fn sort_writes(arg: &str) -> bool {
    if long_option(arg, "output") {
        return true;
    }
    let Some(cluster) = arg.strip_prefix('-') else {
        return false;
    };
    if cluster.starts_with('-') {
        return false;
    }
    for c in cluster.chars() {
        match c {
            'o' => return true,
            // The rest of the word is this option's value
            'k' | 't' | 'S' | 'T' => return false,
            _ => {}
        }
    }
    false
}

/// uniq writes its second operand
fn uniq_output(args: &[String]) -> Option<&String> {
    let mut operands = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-f" | "-s" | "-w" => {
                iter.next();
            }
            "--" => {
                operands.extend(iter.by_ref());
                break;
            }
            a if a.starts_with('-') && a.len() > 1 => {}
            _ => operands.push(arg),
        }
    }
    operands.get(1).copied()
}

/// Variable value that would smuggle a refused argument into a later command
fn hides_write_args(value: &str) -> bool {
    value
        .split_whitespace()
        .any(|w| FIND_WRITE_ACTIONS.contains(&w) || sort_writes(w))
        || AWK_SIDE_EFFECT.is_match(value)
}

/// Simple commands split out of a command line
#[derive(Debug, Default)]
struct Lexed {
    commands: Vec<Vec<String>>,
    /// Anything beyond a single plain command was seen
    shell: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

fn lex(command: &str) -> Result<Lexed> {
    let refuse = |what: &str| Error::CommandNotAllowed {
        command: what.to_string(),
    };

    let chars: Vec<char> = command.chars().collect();
    let mut lexed = Lexed::default();
    let mut words: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut i = 0;

    macro_rules! end_word {
        () => {
            if in_word {
                words.push(std::mem::take(&mut word));
                in_word = false;
            }
        };
    }
    macro_rules! end_command {
        () => {
            end_word!();
            if !words.is_empty() {
                lexed.commands.push(std::mem::take(&mut words));
            }
        };
    }

    while i < chars.len() {
        let c = chars[i];
        match quote {
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                } else {
                    word.push(c);
                }
                i += 1;
                continue;
            }
            Quote::Double => {
                match c {
                    '"' => quote = Quote::None,
                    '`' => return Err(refuse("`")),
                    '$' if chars.get(i + 1) == Some(&'(') => return Err(refuse("$(")),
                    '\\' if i + 1 < chars.len() => {
                        word.push(chars[i + 1]);
                        i += 1;
                    }
                    _ => word.push(c),
                }
                i += 1;
                continue;
            }
            Quote::None => {}
        }

        match c {
            '\'' => {
                quote = Quote::Single;
                in_word = true;
            }
            '"' => {
                quote = Quote::Double;
                in_word = true;
            }
            '\\' => {
                if let Some(next) = chars.get(i + 1) {
                    word.push(*next);
                    in_word = true;
                    i += 1;
                }
            }
            '|' | ';' | '&' | '(' | ')' | '`' | '\n' => {
                end_command!();
                lexed.shell = true;
            }
            '$' if chars.get(i + 1) == Some(&'(') => {
                end_command!();
                lexed.shell = true;
                i += 1;
            }
            '>' => {
                // A pending all-digit word is the file descriptor
                if in_word && word.chars().all(|d| d.is_ascii_digit()) {
                    word.clear();
                    in_word = false;
                }
                end_word!();
                i += 1;
                if chars.get(i) == Some(&'>') {
                    i += 1;
                }
                let (target, next) = redirect_target(&chars, i);
                if !SAFE_REDIRECT_TARGET.is_match(&target) {
                    return Err(refuse(&format!(">{}", target)));
                }
                lexed.shell = true;
                i = next;
                continue;
            }
            '<' => {
                end_word!();
                if chars.get(i + 1) == Some(&'(') {
                    // Process substitution: the inner command is checked like any other
                    end_command!();
                    lexed.shell = true;
                    i += 2;
                    continue;
                }
                let (_, next) = redirect_target(&chars, i + 1);
                lexed.shell = true;
                i = next;
                continue;
            }
            c if c.is_whitespace() => end_word!(),
            c => {
                if matches!(c, '*' | '?' | '[' | '~' | '$' | '{' | '}') {
                    lexed.shell = true;
                }
                word.push(c);
                in_word = true;
            }
        }
        i += 1;
    }

    if quote != Quote::None {
        return Err(refuse("unterminated quote"));
    }
    end_command!();

    if lexed.commands.len() > 1 {
        lexed.shell = true;
    }
    if lexed
        .commands
        .iter()
        .flatten()
        .any(|w| LEADING_KEYWORDS.contains(&w.as_str()) || w == "for")
    {
        lexed.shell = true;
    }
    Ok(lexed)
}

/// Unquoted redirect target starting at `start`, and the index after it
fn redirect_target(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    while i < chars.len() && chars[i].is_whitespace() && chars[i] != '\n' {
        i += 1;
    }
    let mut target = String::new();
    while i < chars.len() && !chars[i].is_whitespace() && !"|;&()<>".contains(chars[i]) {
        target.push(chars[i]);
        i += 1;
    }
    // `>&2`: the `&` belongs to the target
    if target.is_empty() && chars.get(i) == Some(&'&') {
        target.push('&');
        i += 1;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '-') {
            target.push(chars[i]);
            i += 1;
        }
    }
    (target, i)
}

/// Re-root absolute paths of a built-in command under the host root
fn reroot(command: &str, host: &HostRoot) -> String {
    if host.is_system() {
        return command.to_string();
    }
    command
        .split(' ')
        .map(|token| {
            if token.starts_with('/') {
                host.resolve(token).display().to_string()
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs allow-listed commands and expects no output
pub struct CommandEvaluator;

impl Evaluator for CommandEvaluator {
    fn family(&self) -> Family {
        Family::Command
    }

    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome {
        let Check::Command { command, builtin } = check else {
            return mismatch(self.family(), check);
        };

        let line = match CommandLine::parse(command) {
            Ok(line) => line,
            Err(e) => {
                debug!("{}: refusing command '{}': {}", ctx.rule_id, command, e);
                return Outcome::error(
                    e.to_string(),
                    ErrorKind::CommandNotAllowed,
                    Evidence::validation("allow-list", command),
                );
            }
        };
        let host = ctx.snapshot.host();
        let line = match (builtin, line) {
            (true, CommandLine::Shell(script)) => CommandLine::Shell(reroot(&script, host)),
            (true, CommandLine::Direct { program, args }) => CommandLine::Direct {
                program,
                args: args.iter().map(|arg| reroot(arg, host)).collect(),
            },
            (_, line) => line,
        };

        let source = match &line {
            CommandLine::Direct { program, .. } => program.clone(),
            CommandLine::Shell(_) => String::from("shell"),
        };
        let runner = CommandRunner::new(ctx.config.timeouts.command());

        let output = match line.run(&runner) {
            Ok(output) => output,
            Err(Error::CommandTimeout { seconds, .. }) => {
                return Outcome::error(
                    format!("Command timeout ({}s)", seconds),
                    ErrorKind::Timeout,
                    Evidence::command(source, "timeout"),
                );
            }
            Err(Error::CommandNotFound { command }) => {
                return Outcome::fail(
                    format!("Command not found: {}", command),
                    Evidence::command(source, "command not found"),
                );
            }
            Err(e) => return Outcome::from_error(&e, source),
        };

        // sh reports an unknown program with status 127
        if matches!(line, CommandLine::Shell(_)) && output.code == Some(127) {
            return Outcome::fail(
                format!("Command not found in: {}", command),
                Evidence::command(source, "command not found"),
            );
        }

        let stdout = output.stdout_trimmed();
        if stdout.is_empty() {
            Outcome::pass("No output (as expected)", Evidence::command(source, "empty output"))
        } else {
            let found = truncate_snippet(stdout, OUTPUT_CHARS);
            Outcome::fail(format!("Found: {}", found), Evidence::command(source, &found))
        }
    }
}
