//! PAM service stack parser

use crate::host::{join_host, HostRoot};
use hostaudit_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default PAM service directory
pub const PAM_DIR: &str = "/etc/pam.d";

/// One effective line of a PAM stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PamEntry {
    /// Stack type: auth, account, password, session
    pub pam_type: String,
    /// Control flag, bracket form kept verbatim
    pub control: String,
    /// Module base name (`pam_unix.so`)
    pub module: String,
    /// Module arguments; flags map to an empty value
    pub args: BTreeMap<String, String>,
    /// Original line after comment stripping
    pub raw: String,
    /// File the line came from
    pub source: String,
}

impl PamEntry {
    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(|v| v.as_str())
    }

    /// Compare module names ignoring directory and `.so` suffix
    pub fn is_module(&self, module: &str) -> bool {
        module_stem(&self.module) == module_stem(module)
    }
}

fn module_stem(module: &str) -> &str {
    let base = module.rsplit('/').next().unwrap_or(module);
    base.strip_suffix(".so").unwrap_or(base)
}

/// Parser for PAM service files with include/substack inlining
#[derive(Debug, Clone)]
pub struct PamParser<'a> {
    host: &'a HostRoot,
    pam_dir: String,
    max_depth: usize,
}

impl<'a> PamParser<'a> {
    pub fn new(host: &'a HostRoot) -> Self {
        Self {
            host,
            pam_dir: PAM_DIR.to_string(),
            max_depth: 16,
        }
    }

    pub fn with_pam_dir(mut self, dir: impl Into<String>) -> Self {
        self.pam_dir = dir.into();
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Resolve a service name or path to a host path
    pub fn service_path(&self, name: &str) -> String {
        join_host(&self.pam_dir, name)
    }

    /// Parse a PAM service file, inlining included stacks
    pub fn parse(&self, path: &str) -> Result<Vec<PamEntry>> {
        let path = self.service_path(path);
        let mut entries = Vec::new();
        self.parse_into(&path, None, 0, &mut entries)?;
        debug!("Parsed {} PAM entries from {}", entries.len(), path);
        Ok(entries)
    }

    fn parse_into(
        &self,
        path: &str,
        only_type: Option<&str>,
        depth: usize,
        out: &mut Vec<PamEntry>,
    ) -> Result<()> {
        if depth > self.max_depth {
            return Err(Error::IncludeDepthExceeded {
                path: path.to_string(),
                limit: self.max_depth,
            });
        }

        let content = self.host.read_secure(path)?;

        for (idx, raw_line) in content.lines().enumerate() {
            let line = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            }
            .trim();

            if line.is_empty() {
                continue;
            }

            let fields = tokenize(line);

            if fields[0] == "@include" {
                let target = fields.get(1).ok_or_else(|| {
                    Error::parse(path, idx + 1, "@include without a file name")
                })?;
                let target = self.service_path(target);
                self.parse_into(&target, only_type, depth + 1, out)?;
                continue;
            }

            if fields.len() < 3 {
                warn!(
                    "{}:{}: skipping line without type, control and module: '{}'",
                    path,
                    idx + 1,
                    line
                );
                continue;
            }

            let pam_type = fields[0].trim_start_matches('-').to_ascii_lowercase();

            if let Some(wanted) = only_type {
                if pam_type != wanted {
                    continue;
                }
            }

            if matches!(fields[1].as_str(), "substack" | "include") {
                // Only entries of the calling line's type are contributed
                let target = self.service_path(&fields[2]);
                self.parse_into(&target, Some(&pam_type), depth + 1, out)?;
                continue;
            }

            let module = fields[2]
                .rsplit('/')
                .next()
                .unwrap_or(&fields[2])
                .to_string();

            let mut args = BTreeMap::new();
            for token in &fields[3..] {
                match token.split_once('=') {
                    Some((key, value)) => {
                        args.insert(key.to_string(), unquote(value).to_string());
                    }
                    None => {
                        args.insert(token.to_string(), String::new());
                    }
                }
            }

            out.push(PamEntry {
                pam_type,
                control: fields[1].clone(),
                module,
                args,
                raw: line.to_string(),
                source: path.to_string(),
            });
        }

        Ok(())
    }
}

/// Split a PAM line on whitespace, keeping `[...]` groups whole
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut bracket = false;

    for c in line.chars() {
        match c {
            '[' if current.is_empty() => {
                bracket = true;
                current.push(c);
            }
            ']' if bracket => {
                bracket = false;
                current.push(c);
            }
            c if c.is_whitespace() && !bracket => {
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
    tokens
}

fn unquote(value: &str) -> &str {
    value.trim_matches(|c| c == '"' || c == '\'')
}

/// Value of `param` on the last entry matching type and module
///
/// An empty `pam_type` matches every stack type. Later entries override
/// earlier ones, mirroring stack evaluation order.
pub fn find_parameter<'e>(
    entries: &'e [PamEntry],
    pam_type: &str,
    module: &str,
    param: &str,
) -> Option<(&'e PamEntry, &'e str)> {
    entries
        .iter()
        .filter(|e| pam_type.is_empty() || e.pam_type.eq_ignore_ascii_case(pam_type))
        .filter(|e| e.is_module(module))
        .filter_map(|e| e.arg(param).map(|v| (e, v)))
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn host_with(files: &[(&str, &str)]) -> (TempDir, HostRoot) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("etc/pam.d")).unwrap();
        for (name, content) in files {
            fs::write(dir.path().join("etc/pam.d").join(name), content).unwrap();
        }
        let host = HostRoot::new(dir.path());
        (dir, host)
    }

    #[test]
    fn test_basic_entry() {
        let (_dir, host) = host_with(&[(
            "common-password",
            "# comment\npassword requisite /lib/security/pam_pwquality.so retry=3 minlen=\"14\" enforce_for_root # trailing\n",
        )]);
        let entries = PamParser::new(&host).parse("common-password").unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.pam_type, "password");
        assert_eq!(entry.control, "requisite");
        assert_eq!(entry.module, "pam_pwquality.so");
        assert_eq!(entry.arg("minlen"), Some("14"));
        assert_eq!(entry.arg("enforce_for_root"), Some(""));
        assert_eq!(entry.source, "/etc/pam.d/common-password");
        assert!(!entry.raw.contains("trailing"));
    }

    #[test]
    fn test_bracket_control() {
        let (_dir, host) = host_with(&[(
            "common-auth",
            "auth [success=1 default=ignore] pam_unix.so nullok\nauth requisite pam_deny.so\n",
        )]);
        let entries = PamParser::new(&host).parse("common-auth").unwrap();
        assert_eq!(entries[0].control, "[success=1 default=ignore]");
        assert_eq!(entries[0].module, "pam_unix.so");
        assert_eq!(entries[1].module, "pam_deny.so");
    }

    #[test]
    fn test_include_is_inlined_in_order() {
        let (_dir, host) = host_with(&[
            ("common-auth", "auth required pam_faillock.so preauth\nauth required pam_unix.so\n"),
            (
                "login",
                "auth optional pam_faildelay.so delay=3000000\n@include common-auth\nauth optional pam_group.so\n",
            ),
        ]);
        let entries = PamParser::new(&host).parse("login").unwrap();
        let modules: Vec<&str> = entries.iter().map(|e| e.module.as_str()).collect();
        assert_eq!(
            modules,
            vec![
                "pam_faildelay.so",
                "pam_faillock.so",
                "pam_unix.so",
                "pam_group.so"
            ]
        );
        assert_eq!(entries[1].source, "/etc/pam.d/common-auth");
    }

    #[test]
    fn test_substack_filters_by_type() {
        let (_dir, host) = host_with(&[
            (
                "system-auth",
                "auth required pam_env.so\naccount required pam_unix.so\npassword sufficient pam_unix.so sha512\nsession required pam_limits.so\n",
            ),
            ("sshd", "auth substack system-auth\nsession include system-auth\n"),
        ]);
        let entries = PamParser::new(&host).parse("sshd").unwrap();
        let pairs: Vec<(&str, &str)> = entries
            .iter()
            .map(|e| (e.pam_type.as_str(), e.module.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("auth", "pam_env.so"), ("session", "pam_limits.so")]
        );
    }

    #[test]
    fn test_symlink_rejected() {
        let (dir, host) = host_with(&[("real", "auth required pam_unix.so\n")]);
        symlink(
            dir.path().join("etc/pam.d/real"),
            dir.path().join("etc/pam.d/sshd"),
        )
        .unwrap();
        let err = PamParser::new(&host).parse("sshd").unwrap_err();
        assert!(matches!(err, Error::SymlinkRejected { .. }));
    }

    #[test]
    fn test_include_loop_is_bounded() {
        let (_dir, host) = host_with(&[("loop", "@include loop\n")]);
        let err = PamParser::new(&host).with_max_depth(4).parse("loop").unwrap_err();
        assert!(matches!(err, Error::IncludeDepthExceeded { limit: 4, .. }));
    }

    #[test]
    fn test_last_matching_entry_wins() {
        let (_dir, host) = host_with(&[(
            "common-password",
            "password requisite pam_pwquality.so minlen=8\npassword required pam_unix.so remember=5\npassword requisite pam_pwquality.so minlen=14\n",
        )]);
        let entries = PamParser::new(&host).parse("common-password").unwrap();

        let (_, value) = find_parameter(&entries, "password", "pam_pwquality", "minlen").unwrap();
        assert_eq!(value, "14");
        let (_, value) = find_parameter(&entries, "", "pam_unix.so", "remember").unwrap();
        assert_eq!(value, "5");
        assert!(find_parameter(&entries, "auth", "pam_pwquality.so", "minlen").is_none());
        assert!(find_parameter(&entries, "", "pam_unix.so", "minlen").is_none());
    }

    #[test]
    fn test_short_line_is_skipped() {
        let (_dir, host) = host_with(&[(
            "common-auth",
            "auth required\nauth [success=1 default=ignore] pam_unix.so nullok\npam_faillock.so\n",
        )]);
        let entries = PamParser::new(&host).parse("common-auth").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].module, "pam_unix.so");
        assert_eq!(entries[0].arg("nullok"), Some(""));
    }
}
