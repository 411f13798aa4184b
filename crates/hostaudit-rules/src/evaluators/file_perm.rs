//! File mode and ownership evaluation
//!
//! A target is a single path, a directory (every regular file below it is
//! checked) or a glob. Symlinks are never followed: a symlinked single
//! target fails, symlinks found while walking or globbing are skipped.

use super::{mismatch, EvalContext, Evaluator};
use crate::check::{Check, Family, ModeComparison};
use hostaudit_core::{Error, Evidence, EvidenceMethod, Outcome};
use hostaudit_parsers::{host_parent, Accounts, HostRoot};
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use tracing::debug;
use walkdir::WalkDir;

/// Targets that are legitimately absent on many hosts
const OPTIONAL_TARGETS: &[&str] = &["/etc/issue", "/etc/issue.net", "/etc/motd"];

/// Failing files listed in an aggregate result
const MAX_LISTED: usize = 3;

pub struct FilePermissionsEvaluator;

/// What a target must look like
struct Expectation<'a> {
    mode: Option<u32>,
    owner: Option<&'a str>,
    group: Option<&'a str>,
    comparison: ModeComparison,
}

impl Expectation<'_> {
    fn accepts(&self, found: &Found) -> bool {
        let mode_ok = match (self.mode, self.comparison) {
            (None, _) => true,
            (Some(expected), ModeComparison::AtMost) => found.mode <= expected,
            (Some(expected), ModeComparison::Exact) => found.mode == expected,
        };
        mode_ok
            && self.owner.map(|o| o == found.owner).unwrap_or(true)
            && self.group.map(|g| g == found.group).unwrap_or(true)
    }
}

/// Observed mode and ownership of one file
struct Found {
    mode: u32,
    owner: String,
    group: String,
}

impl Found {
    fn from_metadata(meta: &Metadata, accounts: &Accounts) -> Self {
        Self {
            mode: meta.mode() & 0o7777,
            owner: accounts.username(meta.uid()),
            group: accounts.groupname(meta.gid()),
        }
    }

    fn describe(&self) -> String {
        format!("{:04o} {}:{}", self.mode, self.owner, self.group)
    }
}

impl Evaluator for FilePermissionsEvaluator {
    fn family(&self) -> Family {
        Family::FilePermissions
    }

    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome {
        let Check::FilePermissions {
            path,
            mode,
            owner,
            group,
            comparison,
            optional,
        } = check
        else {
            return mismatch(self.family(), check);
        };

        let expectation = Expectation {
            mode: *mode,
            owner: owner.as_deref(),
            group: group.as_deref(),
            comparison: *comparison,
        };
        let host = ctx.snapshot.host();
        let accounts = &ctx.snapshot.accounts;
        let optional = *optional || is_optional_target(path);

        if is_glob(path) {
            return check_glob(host, accounts, path, &expectation);
        }

        let meta = match host.lstat(path) {
            Ok(meta) => meta,
            Err(Error::FileNotFound { .. }) if optional => {
                return Outcome::not_applicable(
                    format!("{} does not exist", path),
                    Evidence::file(path.clone(), "not found"),
                );
            }
            Err(e) => return Outcome::from_error(&e, path.clone()),
        };

        if meta.file_type().is_symlink() {
            return Outcome::fail(
                "Symlink not allowed",
                Evidence::file(path.clone(), "symlink"),
            )
            .with_description(format!("Symlink rejected: {}", path));
        }

        if meta.is_dir() {
            return check_directory(host, accounts, path, &expectation);
        }

        let found = Found::from_metadata(&meta, accounts);
        let actual = format!(
            "Permissions: {:04o}, Owner: {}, Group: {}",
            found.mode, found.owner, found.group
        );
        let evidence = Evidence::file(path.clone(), found.describe());
        if expectation.accepts(&found) {
            Outcome::pass(actual, evidence)
        } else {
            Outcome::fail(actual, evidence)
                .with_description(format!("File {} has incorrect permissions", path))
        }
    }
}

fn is_glob(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

fn is_optional_target(path: &str) -> bool {
    path.contains("cron") || OPTIONAL_TARGETS.contains(&path)
}

/// Tally of files checked under one target
#[derive(Default)]
struct Tally {
    checked: usize,
    failures: Vec<String>,
}

impl Tally {
    fn record(&mut self, host_path: String, found: &Found, expectation: &Expectation<'_>) {
        self.checked += 1;
        if !expectation.accepts(found) {
            self.failures
                .push(format!("{}: {}", host_path, found.describe()));
        }
    }

    fn into_outcome(self, method: EvidenceMethod, target: &str) -> Outcome {
        if self.checked == 0 {
            return Outcome::not_applicable(
                format!("No regular files to check under {}", target),
                Evidence::new(method, target, "checked 0 files"),
            );
        }
        if self.failures.is_empty() {
            return Outcome::pass(
                format!("All {} files have correct permissions", self.checked),
                Evidence::new(method, target, format!("checked {} files", self.checked)),
            );
        }

        let listed = self
            .failures
            .iter()
            .take(MAX_LISTED)
            .cloned()
            .collect::<Vec<_>>()
            .join("; ");
        Outcome::fail(
            format!(
                "{} files with incorrect permissions: {}",
                self.failures.len(),
                listed
            ),
            Evidence::new(method, target, &listed),
        )
        .with_description(format!("{} has files with incorrect permissions", target))
    }
}

fn check_directory(
    host: &HostRoot,
    accounts: &Accounts,
    path: &str,
    expectation: &Expectation<'_>,
) -> Outcome {
    let mut tally = Tally::default();

    for entry in WalkDir::new(host.resolve(path)).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", path, e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let found = Found::from_metadata(&meta, accounts);
        tally.record(host.host_path(entry.path()), &found, expectation);
    }

    tally.into_outcome(EvidenceMethod::Directory, path)
}

fn check_glob(
    host: &HostRoot,
    accounts: &Accounts,
    pattern: &str,
    expectation: &Expectation<'_>,
) -> Outcome {
    let local_pattern = host.resolve(pattern);
    let matches = match glob::glob(&local_pattern.to_string_lossy()) {
        Ok(paths) => paths.filter_map(|p| p.ok()).collect::<Vec<_>>(),
        Err(e) => {
            return Outcome::from_error(
                &Error::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                },
                pattern,
            )
        }
    };

    if matches.is_empty() {
        let parent = host_parent(pattern);
        if !host.is_dir(&parent) {
            return Outcome::not_applicable(
                format!("Directory {} does not exist", parent),
                Evidence::new(EvidenceMethod::Glob, pattern, "directory not found"),
            );
        }
        return Outcome::fail(
            format!("No files matching pattern {} found", pattern),
            Evidence::new(EvidenceMethod::Glob, pattern, "no matches"),
        );
    }

    let mut tally = Tally::default();
    for local in matches {
        let Ok(meta) = std::fs::symlink_metadata(&local) else {
            continue;
        };
        if !meta.file_type().is_file() {
            continue;
        }
        let found = Found::from_metadata(&meta, accounts);
        tally.record(host.host_path(&local), &found, expectation);
    }

    tally.into_outcome(EvidenceMethod::Glob, pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::testing::Fixture;
    use hostaudit_core::Verdict;
    use pretty_assertions::assert_eq;

    fn perm_check(path: &str, mode: u32, comparison: ModeComparison) -> Check {
        Check::FilePermissions {
            path: path.to_string(),
            mode: Some(mode),
            owner: None,
            group: None,
            comparison,
            optional: false,
        }
    }

    fn run(fixture: &Fixture, check: &Check) -> Outcome {
        let snapshot = fixture.snapshot();
        let config = fixture.config();
        let ctx = EvalContext::new(&snapshot, &config, "7.1.1");
        FilePermissionsEvaluator.evaluate(check, &ctx)
    }

    #[test]
    fn test_restrictive_or_better() {
        let fixture = Fixture::new();
        fixture
            .write_mode("/etc/shadow-like", "x", 0o600)
            .write_mode("/etc/group-like", "x", 0o644);

        let tighter = run(&fixture, &perm_check("/etc/shadow-like", 0o644, ModeComparison::AtMost));
        assert_eq!(tighter.verdict, Verdict::Pass);
        assert!(tighter.actual.starts_with("Permissions: 0600"));

        let looser = run(&fixture, &perm_check("/etc/group-like", 0o600, ModeComparison::AtMost));
        assert_eq!(looser.verdict, Verdict::Fail);

        let exact = run(&fixture, &perm_check("/etc/shadow-like", 0o644, ModeComparison::Exact));
        assert_eq!(exact.verdict, Verdict::Fail);
    }

    #[test]
    fn test_owner_resolved_by_name() {
        let fixture = Fixture::new();
        let uid = std::fs::metadata(fixture.dir.path()).unwrap().uid();
        fixture
            .write("/etc/passwd", &format!("auditor:x:{}:{}::/:/bin/sh\n", uid, uid))
            .write_mode("/etc/hosts.allow", "ALL: LOCAL\n", 0o644);

        let check = Check::FilePermissions {
            path: "/etc/hosts.allow".into(),
            mode: None,
            owner: Some("auditor".into()),
            group: None,
            comparison: ModeComparison::AtMost,
            optional: false,
        };
        assert_eq!(run(&fixture, &check).verdict, Verdict::Pass);

        let check = Check::FilePermissions {
            path: "/etc/hosts.allow".into(),
            mode: None,
            owner: Some("nobody".into()),
            group: None,
            comparison: ModeComparison::AtMost,
            optional: false,
        };
        assert_eq!(run(&fixture, &check).verdict, Verdict::Fail);
    }

    #[test]
    fn test_symlink_target_fails() {
        let fixture = Fixture::new();
        fixture
            .write_mode("/etc/real", "x", 0o600)
            .link("/etc/real", "/etc/motd.d-link");

        let outcome = run(&fixture, &perm_check("/etc/motd.d-link", 0o644, ModeComparison::AtMost));
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert_eq!(outcome.evidence.method, EvidenceMethod::File);
        assert_eq!(outcome.evidence.snippet, "symlink");
    }

    #[test]
    fn test_missing_targets() {
        let fixture = Fixture::new();
        let missing = run(&fixture, &perm_check("/etc/passwd-", 0o644, ModeComparison::AtMost));
        assert_eq!(missing.verdict, Verdict::Error);

        let cron = run(&fixture, &perm_check("/etc/cron.weekly", 0o700, ModeComparison::AtMost));
        assert_eq!(cron.verdict, Verdict::NotApplicable);

        let issue = run(&fixture, &perm_check("/etc/issue", 0o644, ModeComparison::AtMost));
        assert_eq!(issue.verdict, Verdict::NotApplicable);
    }

    #[test]
    fn test_directory_walk_skips_symlinks() {
        let fixture = Fixture::new();
        fixture
            .write_mode("/var/log/syslog", "x", 0o640)
            .write_mode("/var/log/apt/history.log", "x", 0o600)
            .write_mode("/tmp/elsewhere", "x", 0o666)
            .link("/tmp/elsewhere", "/var/log/link.log");

        let outcome = run(&fixture, &perm_check("/var/log", 0o640, ModeComparison::AtMost));
        assert_eq!(outcome.verdict, Verdict::Pass);
        assert_eq!(outcome.actual, "All 2 files have correct permissions");
        assert_eq!(outcome.evidence.method, EvidenceMethod::Directory);

        fixture.write_mode("/var/log/auth.log", "x", 0o644);
        let outcome = run(&fixture, &perm_check("/var/log", 0o640, ModeComparison::AtMost));
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert!(outcome.actual.contains("/var/log/auth.log: 0644"));
    }

    #[test]
    fn test_glob_targets() {
        let fixture = Fixture::new();
        fixture
            .write_mode("/etc/ssh/ssh_host_ed25519_key", "k", 0o600)
            .write_mode("/etc/ssh/ssh_host_rsa_key", "k", 0o640);

        let outcome = run(
            &fixture,
            &perm_check("/etc/ssh/ssh_host_*_key", 0o600, ModeComparison::AtMost),
        );
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert_eq!(outcome.evidence.method, EvidenceMethod::Glob);
        assert!(outcome.actual.starts_with("1 files"));

        let none = run(
            &fixture,
            &perm_check("/etc/ssh/*.pub", 0o644, ModeComparison::AtMost),
        );
        assert_eq!(none.verdict, Verdict::Fail);

        let no_dir = run(
            &fixture,
            &perm_check("/etc/nothing/*.conf", 0o644, ModeComparison::AtMost),
        );
        assert_eq!(no_dir.verdict, Verdict::NotApplicable);
    }

    #[test]
    fn test_nothing_to_check_is_not_applicable() {
        let fixture = Fixture::new();
        fixture
            .mkdir("/etc/cron.d")
            .write_mode("/etc/real.conf", "x", 0o600)
            .link("/etc/real.conf", "/etc/ssl/private/only-link.pem");

        let empty = run(&fixture, &perm_check("/etc/cron.d", 0o700, ModeComparison::AtMost));
        assert_eq!(empty.verdict, Verdict::NotApplicable);
        assert_eq!(empty.actual, "No regular files to check under /etc/cron.d");
        assert_eq!(empty.evidence.method, EvidenceMethod::Directory);

        let links_only = run(
            &fixture,
            &perm_check("/etc/ssl/private/*.pem", 0o600, ModeComparison::AtMost),
        );
        assert_eq!(links_only.verdict, Verdict::NotApplicable);
        assert_eq!(links_only.evidence.method, EvidenceMethod::Glob);
    }
}
