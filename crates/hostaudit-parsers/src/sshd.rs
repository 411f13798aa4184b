//! SSH daemon configuration parser

use crate::host::{host_parent, join_host, HostRoot};
use hostaudit_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Main sshd configuration file
pub const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";

/// OpenSSH compiled-in defaults for keywords audits commonly check
const DEFAULTS: &[(&str, &str)] = &[
    ("allowtcpforwarding", "yes"),
    ("clientalivecountmax", "3"),
    ("clientaliveinterval", "0"),
    ("disableforwarding", "no"),
    ("gssapiauthentication", "no"),
    ("hostbasedauthentication", "no"),
    ("ignorerhosts", "yes"),
    ("logingracetime", "120"),
    ("loglevel", "INFO"),
    ("maxauthtries", "6"),
    ("maxsessions", "10"),
    ("maxstartups", "10:30:100"),
    ("permitemptypasswords", "no"),
    ("permitrootlogin", "yes"),
    ("permituserenvironment", "no"),
    ("usepam", "yes"),
    ("x11forwarding", "yes"),
];

const WEAK_CIPHERS: &[&str] = &[
    "3des-cbc",
    "aes128-cbc",
    "aes192-cbc",
    "aes256-cbc",
    "arcfour",
    "arcfour128",
    "arcfour256",
    "blowfish-cbc",
    "cast128-cbc",
    "rijndael-cbc@lysator.liu.se",
];

const WEAK_KEX: &[&str] = &[
    "diffie-hellman-group1-sha1",
    "diffie-hellman-group14-sha1",
    "diffie-hellman-group-exchange-sha1",
];

const WEAK_MACS: &[&str] = &[
    "hmac-md5",
    "hmac-md5-96",
    "hmac-ripemd160",
    "hmac-sha1",
    "hmac-sha1-96",
    "umac-64@openssh.com",
    "umac-128@openssh.com",
    "hmac-md5-etm@openssh.com",
    "hmac-md5-96-etm@openssh.com",
    "hmac-ripemd160-etm@openssh.com",
    "hmac-sha1-etm@openssh.com",
    "hmac-sha1-96-etm@openssh.com",
    "umac-64-etm@openssh.com",
];

/// A directive value and where it was set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshdValue {
    pub value: String,
    pub source: String,
    pub line: usize,
}

/// Parsed sshd configuration, keywords lowercased
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshdConfig {
    values: BTreeMap<String, SshdValue>,
    /// Files read, in order
    pub files: Vec<String>,
    /// Location of the Match line that ended parsing
    pub truncated_at: Option<String>,
}

/// Where an effective value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrigin {
    Configured,
    Default,
}

impl SshdConfig {
    /// Explicitly configured value
    pub fn get(&self, keyword: &str) -> Option<&SshdValue> {
        self.values.get(&keyword.to_ascii_lowercase())
    }

    /// Configured value, falling back to the OpenSSH default
    pub fn effective(&self, keyword: &str) -> Option<(String, ValueOrigin)> {
        if let Some(v) = self.get(keyword) {
            return Some((v.value.clone(), ValueOrigin::Configured));
        }
        default_value(keyword).map(|v| (v.to_string(), ValueOrigin::Default))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// OpenSSH default for a keyword
pub fn default_value(keyword: &str) -> Option<&'static str> {
    let keyword = keyword.to_ascii_lowercase();
    DEFAULTS
        .iter()
        .find(|(k, _)| *k == keyword)
        .map(|(_, v)| *v)
}

/// Canonicalize a value for comparison
///
/// Boolean-like tokens collapse to `yes`/`no`; comma lists are trimmed,
/// sorted and re-joined; everything is lowercased.
pub fn normalize_value(value: &str) -> String {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "yes" | "true" | "1" => return String::from("yes"),
        "no" | "false" | "0" => return String::from("no"),
        _ => {}
    }
    if value.contains(',') {
        let mut items: Vec<&str> = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        items.sort_unstable();
        return items.join(",");
    }
    value
}

/// Deny-list for keywords that support `strong` grading
pub fn weak_algorithms(keyword: &str) -> Option<&'static [&'static str]> {
    match keyword.to_ascii_lowercase().as_str() {
        "ciphers" => Some(WEAK_CIPHERS),
        "kexalgorithms" => Some(WEAK_KEX),
        "macs" => Some(WEAK_MACS),
        _ => None,
    }
}

/// Weak algorithms enabled by a list value
///
/// Items prefixed with `-` remove algorithms and are ignored; `+`/`^`
/// prefixes are stripped before matching.
pub fn weak_entries(keyword: &str, value: &str) -> Vec<String> {
    let Some(deny) = weak_algorithms(keyword) else {
        return Vec::new();
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty() && !item.starts_with('-'))
        .map(|item| item.trim_start_matches(['+', '^']).to_ascii_lowercase())
        .filter(|item| deny.contains(&item.as_str()))
        .collect()
}

/// Parser for sshd_config with Include support
///
/// Keeps the first value obtained for each keyword, the way sshd does, so a
/// repeated directive never overrides an earlier one. Readers expecting a
/// last-write-wins map will see different results for duplicated keywords.
/// A `Match` line, even inside an included file, ends parsing for good.
#[derive(Debug, Clone)]
pub struct SshdParser<'a> {
    host: &'a HostRoot,
    max_depth: usize,
}

struct ParseState {
    config: SshdConfig,
    stopped: bool,
}

impl<'a> SshdParser<'a> {
    pub fn new(host: &'a HostRoot) -> Self {
        Self { host, max_depth: 16 }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Parse the main configuration file and everything it includes
    pub fn parse(&self, path: &str) -> Result<SshdConfig> {
        let mut state = ParseState {
            config: SshdConfig::default(),
            stopped: false,
        };
        self.parse_file(path, 0, &mut state)?;
        debug!(
            "Parsed {} sshd directives from {} file(s)",
            state.config.len(),
            state.config.files.len()
        );
        Ok(state.config)
    }

    fn parse_file(&self, path: &str, depth: usize, state: &mut ParseState) -> Result<()> {
        if depth > self.max_depth {
            return Err(Error::IncludeDepthExceeded {
                path: path.to_string(),
                limit: self.max_depth,
            });
        }

        let content = self.host.read_secure(path)?;
        state.config.files.push(path.to_string());

        for (idx, raw_line) in content.lines().enumerate() {
            if state.stopped {
                break;
            }

            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = match line.find('#') {
                Some(pos) => line[..pos].trim(),
                None => line,
            };

            let Some((keyword, value)) = split_directive(line) else {
                continue;
            };
            let keyword = keyword.to_ascii_lowercase();

            if keyword == "match" {
                state.stopped = true;
                state.config.truncated_at = Some(format!("{}:{}", path, idx + 1));
                break;
            }

            if value.is_empty() {
                continue;
            }

            if keyword == "include" {
                self.include(path, &value, depth, state)?;
                continue;
            }

            // First obtained value wins
            state
                .config
                .values
                .entry(keyword)
                .or_insert_with(|| SshdValue {
                    value,
                    source: path.to_string(),
                    line: idx + 1,
                });
        }

        Ok(())
    }

    fn include(&self, from: &str, patterns: &str, depth: usize, state: &mut ParseState) -> Result<()> {
        let base = host_parent(from);
        for pattern in patterns.split_whitespace() {
            let host_pattern = join_host(&base, pattern);
            let local_pattern = self.host.resolve(&host_pattern);

            let matches = glob::glob(&local_pattern.to_string_lossy()).map_err(|e| {
                Error::InvalidPattern {
                    pattern: host_pattern.clone(),
                    message: e.to_string(),
                }
            })?;

            let mut files: Vec<String> = matches
                .filter_map(|m| m.ok())
                .map(|p| self.host.host_path(&p))
                .collect();
            files.sort();

            if files.is_empty() {
                warn!("sshd Include {} matched no files", host_pattern);
            }

            for file in files {
                if state.stopped {
                    return Ok(());
                }
                self.parse_file(&file, depth + 1, state)?;
            }
        }
        Ok(())
    }
}

/// Split `Keyword value` or `Keyword=value`; the value keeps internal spacing collapsed
fn split_directive(line: &str) -> Option<(&str, String)> {
    let pos = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let keyword = &line[..pos];
    let rest = line[pos..].trim_start_matches(|c: char| c.is_whitespace() || c == '=');
    let value = rest.split_whitespace().collect::<Vec<_>>().join(" ");
    if keyword.is_empty() {
        return None;
    }
    Some((keyword, value))
}
