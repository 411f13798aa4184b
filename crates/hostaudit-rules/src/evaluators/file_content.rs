use super::{mismatch, EvalContext, Evaluator};
use crate::check::{Check, Family};
use hostaudit_core::{truncate_snippet, Error, Evidence, EvidenceMethod, Outcome};
use regex::RegexBuilder;

/// Mail transfer agent configs; their absence means no MTA is installed
const MTA_MARKERS: &[&str] = &["postfix", "sendmail", "exim", "qmail"];

const LINE_CHARS: usize = 80;

/// Line-oriented regex search across one or more files
pub struct FileContentEvaluator;

impl Evaluator for FileContentEvaluator {
    fn family(&self) -> Family {
        Family::FileContent
    }

    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome {
        let Check::FileContent {
            paths,
            pattern,
            present,
        } = check
        else {
            return mismatch(self.family(), check);
        };

        let regex = match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => re,
            Err(e) => {
                let err = Error::InvalidPattern {
                    pattern: pattern.clone(),
                    message: e.to_string(),
                };
                return Outcome::from_error(&err, ctx.rule_id).with_description("Regex compilation failed");
            }
        };

        let host = ctx.snapshot.host();
        let limit = ctx.config.limits.max_file_bytes;
        let mut read = Vec::new();
        let mut missing = Vec::new();
        let mut problems = Vec::new();
        let mut matches = Vec::new();

        for path in paths {
            let content = match host.read_secure_limited(path, limit) {
                Ok(content) => content,
                Err(Error::FileNotFound { .. }) => {
                    missing.push(path.as_str());
                    continue;
                }
                Err(Error::SymlinkRejected { .. }) => {
                    problems.push(
                        Outcome::fail(
                            format!("Symlink not allowed: {}", path),
                            Evidence::file(path.clone(), "symlink"),
                        )
                        .with_description(format!("Symlink rejected: {}", path)),
                    );
                    continue;
                }
                Err(e) => {
                    problems.push(Outcome::from_error(&e, path.clone()));
                    continue;
                }
            };

            read.push(path.as_str());
            if let Some(line) = content.lines().find(|line| regex.is_match(line)) {
                matches.push(format!("{}: {}", path, truncate_snippet(line, LINE_CHARS)));
            }
        }

        if read.is_empty() && problems.is_empty() {
            if let Some(mta) = missing
                .iter()
                .find(|p| MTA_MARKERS.iter().any(|m| p.contains(*m)))
            {
                return Outcome::not_applicable(
                    format!("MTA not installed (file {} does not exist)", mta),
                    Evidence::file(*mta, "service not installed"),
                );
            }
        }

        let sources = if read.is_empty() {
            paths.join(", ")
        } else {
            read.join(", ")
        };

        if *present {
            if !matches.is_empty() {
                return Outcome::pass(
                    format!("Pattern found in {} file(s): {}", matches.len(), matches.join("; ")),
                    Evidence::parsed(sources, matches.join("; ")),
                );
            }
            if let Some(problem) = problems.into_iter().next() {
                return problem;
            }
            let outcome = Outcome::fail(
                "Pattern not found in any file",
                Evidence::parsed(sources, "pattern not found"),
            );
            return if missing.is_empty() {
                outcome
            } else {
                outcome.with_description(format!("Missing: {}", missing.join(", ")))
            };
        }

        if !matches.is_empty() {
            return Outcome::fail(
                format!("Pattern found in {} file(s): {}", matches.len(), matches.join("; ")),
                Evidence::parsed(sources, matches.join("; ")),
            )
            .with_description("Pattern unexpectedly present");
        }
        // Absence cannot be asserted on a file that was not read
        if let Some(problem) = problems.into_iter().next() {
            return problem;
        }
        Outcome::pass(
            "Pattern not found in any file (as expected)",
            Evidence::new(EvidenceMethod::Parsed, sources, "pattern not found"),
        )
    }
}
