//! sudoers Defaults parser

use crate::host::{host_parent, join_host, HostRoot};
use hostaudit_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Main sudoers file
pub const SUDOERS: &str = "/etc/sudoers";

/// One global `Defaults` setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SudoDefault {
    pub key: String,
    /// Unquoted value; `enabled` for bare flags
    pub value: String,
    pub negated: bool,
    pub source: String,
}

impl SudoDefault {
    /// Value as queried: negated flags read as `disabled`
    pub fn effective_value(&self) -> &str {
        if self.negated {
            "disabled"
        } else {
            &self.value
        }
    }
}

/// Defaults collected in file-then-line order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SudoDefaults {
    pub entries: Vec<SudoDefault>,
    pub files: Vec<String>,
}

impl SudoDefaults {
    /// Last setting for `key`
    pub fn lookup(&self, key: &str) -> Option<&SudoDefault> {
        self.entries.iter().rev().find(|e| e.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parser for sudoers and its include directories
#[derive(Debug, Clone)]
pub struct SudoersParser<'a> {
    host: &'a HostRoot,
    max_depth: usize,
}

impl<'a> SudoersParser<'a> {
    pub fn new(host: &'a HostRoot) -> Self {
        Self { host, max_depth: 16 }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn parse(&self, path: &str) -> Result<SudoDefaults> {
        let mut defaults = SudoDefaults::default();
        self.parse_file(path, 0, &mut defaults)?;
        debug!(
            "Parsed {} sudoers Defaults from {} file(s)",
            defaults.len(),
            defaults.files.len()
        );
        Ok(defaults)
    }

    fn parse_file(&self, path: &str, depth: usize, out: &mut SudoDefaults) -> Result<()> {
        if depth > self.max_depth {
            return Err(Error::IncludeDepthExceeded {
                path: path.to_string(),
                limit: self.max_depth,
            });
        }

        let content = self.host.read_secure(path)?;
        out.files.push(path.to_string());

        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(dir) = directive_arg(line, "includedir") {
                self.include_dir(path, dir, depth, out)?;
                continue;
            }
            if let Some(file) = directive_arg(line, "include") {
                let target = join_host(&host_parent(path), file);
                self.parse_file(&target, depth + 1, out)?;
                continue;
            }
            if line.starts_with('#') {
                continue;
            }

            let line = strip_comment(line);
            let (first, rest) = match line.split_once(char::is_whitespace) {
                Some((first, rest)) => (first, rest),
                None => (line, ""),
            };

            // Scoped forms (Defaults:user, Defaults@host, ...) are not global policy
            if first != "Defaults" {
                continue;
            }

            for token in split_settings(rest) {
                out.entries.push(parse_setting(&token, path));
            }
        }

        Ok(())
    }

    fn include_dir(&self, from: &str, dir: &str, depth: usize, out: &mut SudoDefaults) -> Result<()> {
        let dir = join_host(&host_parent(from), dir);
        let names = match self.host.list_dir(&dir) {
            Ok(names) => names,
            Err(Error::FileNotFound { .. }) => {
                warn!("sudoers includedir {} does not exist", dir);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        for name in names {
            if name.starts_with('.') || !name.ends_with(".conf") {
                continue;
            }
            let path = join_host(&dir, &name);
            match self.host.lstat(&path) {
                Ok(meta) if meta.is_file() => self.parse_file(&path, depth + 1, out)?,
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(Error::SymlinkRejected { path });
                }
                _ => continue,
            }
        }
        Ok(())
    }
}

/// Argument of `#include`/`@include` style directives
fn directive_arg<'l>(line: &'l str, name: &str) -> Option<&'l str> {
    let body = line.strip_prefix('#').or_else(|| line.strip_prefix('@'))?;
    let rest = body.strip_prefix(name)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let arg = rest.trim().trim_matches('"');
    (!arg.is_empty()).then_some(arg)
}

/// Drop a trailing comment that is outside quotes
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '#' if !quoted => return line[..i].trim_end(),
            _ => {}
        }
    }
    line
}

/// Split settings on whitespace and commas outside quotes
fn split_settings(rest: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in rest.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if (c.is_whitespace() || c == ',') && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    // Rejoin `key = value` spelled with spaces around the operator
    let mut merged: Vec<String> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if (token == "=" || token == "+=" || token == "-=") && !merged.is_empty() && i + 1 < tokens.len() {
            if let Some(last) = merged.last_mut() {
                last.push_str(token);
                last.push_str(&tokens[i + 1]);
            }
            i += 2;
            continue;
        }
        merged.push(token.clone());
        i += 1;
    }
    merged
}

fn parse_setting(token: &str, source: &str) -> SudoDefault {
    let (negated, body) = match token.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, token),
    };

    let (key, value) = match body.split_once('=') {
        Some((key, value)) => {
            let key = key.trim_end_matches(['+', '-']);
            (key.to_string(), value.trim_matches('"').to_string())
        }
        None => (body.to_string(), String::from("enabled")),
    };

    SudoDefault {
        key,
        value,
        negated,
        source: source.to_string(),
    }
}
