use super::{mismatch, EvalContext, Evaluator};
use crate::check::{Check, Family};
use hostaudit_core::{Evidence, Outcome};
use hostaudit_parsers::pam::find_parameter;

/// Module arguments in a PAM service stack
pub struct PamEvaluator;

impl Evaluator for PamEvaluator {
    fn family(&self) -> Family {
        Family::Pam
    }

    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome {
        let Check::Pam {
            file,
            pam_type,
            module,
            parameter,
            expected,
        } = check
        else {
            return mismatch(self.family(), check);
        };

        let path = ctx.snapshot.pam_path(file);
        let entries = match ctx.snapshot.pam_entries(file) {
            Ok(entries) => entries,
            Err(source) => return source.to_outcome(),
        };

        let Some((entry, value)) = find_parameter(&entries, pam_type, module, parameter) else {
            return Outcome::fail(
                "parameter not found",
                Evidence::parsed(path, format!("{} {}", module, parameter)),
            )
            .with_description(format!(
                "{} not set for {} in {}",
                parameter, module, file
            ));
        };

        let evidence = Evidence::parsed(entry.source.clone(), &entry.raw);
        let actual = if value.is_empty() {
            parameter.clone()
        } else {
            format!("{}={}", parameter, value)
        };

        if value.trim() == expected.trim() {
            Outcome::pass(actual, evidence)
        } else {
            Outcome::fail(actual, evidence)
                .with_description(format!("Expected {}={}", parameter, expected))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::testing::Fixture;
    use hostaudit_core::{ErrorKind, EvidenceMethod, Verdict};
    use pretty_assertions::assert_eq;

    fn pam(file: &str, pam_type: &str, module: &str, parameter: &str, expected: &str) -> Check {
        Check::Pam {
            file: file.into(),
            pam_type: pam_type.into(),
            module: module.into(),
            parameter: parameter.into(),
            expected: expected.into(),
        }
    }

    #[test]
    fn test_last_matching_entry_wins() {
        let fixture = Fixture::new();
        fixture
            .write(
                "/etc/pam.d/common-password",
                "password requisite pam_pwquality.so retry=3 minlen=8\n@include common-pwextra\n",
            )
            .write(
                "/etc/pam.d/common-pwextra",
                "password requisite pam_pwquality.so minlen=14\n",
            )
            .write(
                "/etc/pam.d/login",
                "auth requisite pam_faillock.so preauth deny=5\n",
            );
        let snapshot = fixture.snapshot();
        let config = fixture.config();
        let ctx = EvalContext::new(&snapshot, &config, "5.3.3.2.2");

        let outcome = PamEvaluator.evaluate(
            &pam("common-password", "password", "pam_pwquality", "minlen", "14"),
            &ctx,
        );
        assert_eq!(outcome.verdict, Verdict::Pass);
        assert_eq!(outcome.actual, "minlen=14");
        assert_eq!(outcome.evidence.source, "/etc/pam.d/common-pwextra");

        let missing = PamEvaluator.evaluate(
            &pam("common-password", "password", "pam_pwquality", "dictcheck", "1"),
            &ctx,
        );
        assert_eq!(missing.verdict, Verdict::Fail);
        assert_eq!(missing.actual, "parameter not found");

        // Not pre-parsed, read on demand
        let login = PamEvaluator.evaluate(
            &pam("/etc/pam.d/login", "", "pam_faillock.so", "deny", "4"),
            &ctx,
        );
        assert_eq!(login.verdict, Verdict::Fail);
        assert_eq!(login.actual, "deny=5");
    }

    #[test]
    fn test_symlinked_stack_is_error() {
        let fixture = Fixture::new();
        fixture
            .write("/opt/pam/common-auth", "auth required pam_unix.so\n")
            .link("/opt/pam/common-auth", "/etc/pam.d/common-auth");
        let snapshot = fixture.snapshot();
        let config = fixture.config();
        let ctx = EvalContext::new(&snapshot, &config, "5.3.1");

        let outcome = PamEvaluator.evaluate(
            &pam("common-auth", "auth", "pam_unix", "nullok", ""),
            &ctx,
        );
        assert_eq!(outcome.verdict, Verdict::Error);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Symlink));
        assert_eq!(outcome.evidence.method, EvidenceMethod::File);
    }
}
