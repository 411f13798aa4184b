use super::{mismatch, EvalContext, Evaluator};
use crate::check::{Check, Family};
use hostaudit_core::{Evidence, Outcome};
use hostaudit_parsers::sudoers::SUDOERS;

/// Global `Defaults` settings across sudoers and its include directories
pub struct SudoEvaluator;

impl Evaluator for SudoEvaluator {
    fn family(&self) -> Family {
        Family::Sudo
    }

    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome {
        let Check::Sudo {
            parameter,
            expected,
        } = check
        else {
            return mismatch(self.family(), check);
        };
        let defaults = match &ctx.snapshot.sudo {
            Ok(defaults) => defaults,
            Err(source) => return source.to_outcome(),
        };

        let Some(setting) = defaults.lookup(parameter) else {
            return Outcome::fail("not set", Evidence::parsed(SUDOERS, "parameter not set"))
                .with_description(format!("Defaults {} is not configured", parameter));
        };

        let value = setting.effective_value();
        let snippet = if setting.negated {
            format!("Defaults !{}", setting.key)
        } else if value == "enabled" {
            format!("Defaults {}", setting.key)
        } else {
            format!("Defaults {}={}", setting.key, setting.value)
        };
        let evidence = Evidence::parsed(setting.source.clone(), snippet);

        if value.eq_ignore_ascii_case(expected.trim()) {
            Outcome::pass(value, evidence)
        } else {
            Outcome::fail(value, evidence)
                .with_description(format!("Expected {}={}", parameter, expected))
        }
    }
}
