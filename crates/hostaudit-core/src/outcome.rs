//! Evaluation outcomes, evidence and canonical rule results

use crate::error::Error;
use crate::status::{Status, Verdict};
use serde::{Deserialize, Serialize};

/// Longest evidence excerpt kept, in characters
pub const MAX_SNIPPET_CHARS: usize = 100;

/// How a piece of evidence was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceMethod {
    /// Direct read of a single file
    File,
    /// Live kernel tree under /proc
    Proc,
    /// Structured parse of a config format
    Parsed,
    /// Subprocess output
    Command,
    /// Recursive directory walk
    Directory,
    /// Glob expansion
    Glob,
    /// Rule or command validation before evaluation
    Validation,
    /// Derived host state (mount tables, module sets)
    System,
    /// Evaluation error
    Error,
}

impl EvidenceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceMethod::File => "file",
            EvidenceMethod::Proc => "proc",
            EvidenceMethod::Parsed => "parsed",
            EvidenceMethod::Command => "command",
            EvidenceMethod::Directory => "directory",
            EvidenceMethod::Glob => "glob",
            EvidenceMethod::Validation => "validation",
            EvidenceMethod::System => "system",
            EvidenceMethod::Error => "error",
        }
    }
}

impl std::fmt::Display for EvidenceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Labeled reason attached to an ERROR (or error-derived FAIL) outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Subprocess exceeded its timeout
    Timeout,
    /// Rule specification is missing a field or has a bad value
    Validation,
    /// Path was a symlink and was refused
    Symlink,
    /// File could not be read
    Io,
    /// File exceeded a size limit
    Limit,
    /// Config format or pattern could not be parsed
    Parse,
    /// Command is outside the allow-list
    CommandNotAllowed,
    /// Subprocess could not run or failed
    Command,
    /// Anything else
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Validation => "validation",
            ErrorKind::Symlink => "symlink",
            ErrorKind::Io => "io",
            ErrorKind::Limit => "limit",
            ErrorKind::Parse => "parse",
            ErrorKind::CommandNotAllowed => "command_not_allowed",
            ErrorKind::Command => "command",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Short, audit-safe excerpt justifying an outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub method: EvidenceMethod,
    /// Path or tool name the evidence came from
    pub source: String,
    /// Truncated excerpt, never a whole file
    pub snippet: String,
}

impl Evidence {
    pub fn new(
        method: EvidenceMethod,
        source: impl Into<String>,
        snippet: impl AsRef<str>,
    ) -> Self {
        Self {
            method,
            source: source.into(),
            snippet: truncate_snippet(snippet.as_ref(), MAX_SNIPPET_CHARS),
        }
    }

    pub fn file(source: impl Into<String>, snippet: impl AsRef<str>) -> Self {
        Self::new(EvidenceMethod::File, source, snippet)
    }

    pub fn parsed(source: impl Into<String>, snippet: impl AsRef<str>) -> Self {
        Self::new(EvidenceMethod::Parsed, source, snippet)
    }

    pub fn command(source: impl Into<String>, snippet: impl AsRef<str>) -> Self {
        Self::new(EvidenceMethod::Command, source, snippet)
    }

    pub fn validation(source: impl Into<String>, snippet: impl AsRef<str>) -> Self {
        Self::new(EvidenceMethod::Validation, source, snippet)
    }

    /// Re-truncate to a tighter limit
    pub fn limit(mut self, max_chars: usize) -> Self {
        self.snippet = truncate_snippet(&self.snippet, max_chars);
        self
    }
}

/// Collapse line breaks and cut to `max_chars` on a char boundary
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .trim()
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();

    if flat.chars().count() <= max_chars {
        return flat;
    }

    let keep = max_chars.saturating_sub(3);
    let mut cut: String = flat.chars().take(keep).collect();
    cut.push_str("...");
    cut
}

/// Evaluator output for one rule, before status reduction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub verdict: Verdict,
    /// Human-readable actual value
    pub actual: String,
    pub evidence: Evidence,
    pub description: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl Outcome {
    fn new(verdict: Verdict, actual: impl Into<String>, evidence: Evidence) -> Self {
        Self {
            verdict,
            actual: actual.into(),
            evidence,
            description: None,
            error_kind: None,
        }
    }

    pub fn pass(actual: impl Into<String>, evidence: Evidence) -> Self {
        Self::new(Verdict::Pass, actual, evidence)
    }

    pub fn fail(actual: impl Into<String>, evidence: Evidence) -> Self {
        Self::new(Verdict::Fail, actual, evidence)
    }

    pub fn not_applicable(reason: impl Into<String>, evidence: Evidence) -> Self {
        Self::new(Verdict::NotApplicable, reason, evidence)
    }

    pub fn manual(reason: impl Into<String>) -> Self {
        Self::new(
            Verdict::Manual,
            reason,
            Evidence::new(EvidenceMethod::System, "manual", "manual verification required"),
        )
    }

    pub fn error(actual: impl Into<String>, kind: ErrorKind, evidence: Evidence) -> Self {
        let mut outcome = Self::new(Verdict::Error, actual, evidence);
        outcome.error_kind = Some(kind);
        outcome
    }

    /// ERROR outcome for a failure raised while reading `source`
    pub fn from_error(err: &Error, source: impl Into<String>) -> Self {
        let method = match err {
            Error::SymlinkRejected { .. } | Error::FileTooLarge { .. } => EvidenceMethod::File,
            Error::MissingField { .. }
            | Error::InvalidFieldValue { .. }
            | Error::CommandNotAllowed { .. } => EvidenceMethod::Validation,
            Error::CommandTimeout { .. }
            | Error::CommandNotFound { .. }
            | Error::CommandFailed { .. } => EvidenceMethod::Command,
            _ => EvidenceMethod::Error,
        };
        Self::error(
            err.to_string(),
            err.kind(),
            Evidence::new(method, source, err.code()),
        )
    }

    /// ERROR outcome for a rule missing a required field
    pub fn validation(rule_id: &str, field: &str) -> Self {
        Self::error(
            format!("Invalid rule: missing {}", field),
            ErrorKind::Validation,
            Evidence::validation(rule_id, format!("field={}", field)),
        )
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_error_kind(mut self, kind: ErrorKind) -> Self {
        self.error_kind = Some(kind);
        self
    }

    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// Canonical result of one rule, consumed by reporting layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    pub id: String,
    pub title: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub status: Status,
    pub actual: String,
    pub evidence: Evidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cis_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl RuleResult {
    pub fn is_pass(&self) -> bool {
        self.status == Status::Pass
    }

    pub fn is_timeout(&self) -> bool {
        self.error_kind == Some(ErrorKind::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snippet_truncation() {
        let long = "x".repeat(250);
        let ev = Evidence::file("/etc/shadow", &long);
        assert_eq!(ev.snippet.chars().count(), MAX_SNIPPET_CHARS);
        assert!(ev.snippet.ends_with("..."));

        let short = Evidence::file("/etc/passwd", "root:x:0:0\n");
        assert_eq!(short.snippet, "root:x:0:0");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let text = "é".repeat(120);
        let cut = truncate_snippet(&text, 10);
        assert_eq!(cut.chars().count(), 10);
        assert!(cut.starts_with("ééé"));
    }

    #[test]
    fn test_symlink_error_outcome_uses_file_method() {
        let err = Error::SymlinkRejected {
            path: "/etc/sudoers".into(),
        };
        let outcome = Outcome::from_error(&err, "/etc/sudoers");
        assert_eq!(outcome.verdict, Verdict::Error);
        assert_eq!(outcome.evidence.method, EvidenceMethod::File);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Symlink));
    }

    #[test]
    fn test_command_failure_outcome() {
        let err = Error::CommandFailed {
            command: "rpm -q telnet".into(),
            message: "exit 1: error: rpmdb open failed".into(),
        };
        assert_eq!(
            Outcome::from_error(&err, "rpm telnet"),
            Outcome {
                verdict: Verdict::Error,
                actual: "Command failed: rpm -q telnet - exit 1: error: rpmdb open failed".into(),
                evidence: Evidence {
                    method: EvidenceMethod::Command,
                    source: "rpm telnet".into(),
                    snippet: "COMMAND_FAILED".into(),
                },
                description: None,
                error_kind: Some(ErrorKind::Command),
            }
        );
    }

    #[test]
    fn test_validation_outcome_names_field() {
        let outcome = Outcome::validation("1.1.1", "module_name");
        assert_eq!(outcome.verdict, Verdict::Error);
        assert!(outcome.actual.contains("module_name"));
        assert_eq!(outcome.evidence.method, EvidenceMethod::Validation);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Validation));
    }
}
