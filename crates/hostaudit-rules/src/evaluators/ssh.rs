use super::{mismatch, EvalContext, Evaluator};
use crate::check::{Check, Family};
use hostaudit_core::{Evidence, EvidenceMethod, Outcome};
use hostaudit_parsers::sshd::{normalize_value, weak_entries, SSHD_CONFIG};
use hostaudit_parsers::{SshdConfig, ValueOrigin};

/// Levels accepted when at least `INFO` logging is required
const LOG_LEVELS_AT_LEAST_INFO: &[&str] = &["info", "verbose"];

/// sshd_config directives, with OpenSSH defaults for unset keywords
pub struct SshEvaluator;

impl Evaluator for SshEvaluator {
    fn family(&self) -> Family {
        Family::Ssh
    }

    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome {
        let Check::Ssh {
            parameter,
            expected,
        } = check
        else {
            return mismatch(self.family(), check);
        };
        match &ctx.snapshot.ssh {
            Ok(config) => evaluate_directive(config, parameter, expected),
            Err(source) => source.to_outcome(),
        }
    }
}

fn evaluate_directive(config: &SshdConfig, parameter: &str, expected: &str) -> Outcome {
    let Some((actual, origin)) = config.effective(parameter) else {
        return Outcome::fail(
            "not set",
            Evidence::parsed(SSHD_CONFIG, "parameter not set"),
        )
        .with_description(format!("SSH parameter {} not configured", parameter));
    };

    let source = match (origin, config.get(parameter)) {
        (ValueOrigin::Configured, Some(v)) => format!("{}:{}", v.source, v.line),
        _ => String::from("openssh default"),
    };
    let evidence = Evidence::new(
        EvidenceMethod::Parsed,
        source,
        format!("{} {}", parameter, actual),
    );
    let expected_lower = expected.trim().to_ascii_lowercase();

    if expected_lower == "strong" {
        let weak = weak_entries(parameter, &actual);
        if actual.trim().is_empty() || !weak.is_empty() {
            return Outcome::fail(actual, evidence)
                .with_description(format!("Weak algorithms in {}: {}", parameter, weak.join(",")));
        }
        return Outcome::pass(actual, evidence);
    }

    if parameter.eq_ignore_ascii_case("loglevel")
        && LOG_LEVELS_AT_LEAST_INFO.contains(&expected_lower.as_str())
        && LOG_LEVELS_AT_LEAST_INFO.contains(&actual.trim().to_ascii_lowercase().as_str())
    {
        return Outcome::pass(actual, evidence);
    }

    if normalize_value(&actual) == normalize_value(expected) {
        Outcome::pass(actual, evidence)
    } else {
        let description = format!("Expected {}, got {}", expected, actual);
        Outcome::fail(actual, evidence).with_description(description)
    }
}
