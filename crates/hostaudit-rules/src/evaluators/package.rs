use super::{mismatch, EvalContext, Evaluator};
use crate::check::{Check, Family};
use hostaudit_core::{Evidence, Outcome};
use hostaudit_snapshot::{PackageState, PlatformFamily};
use tracing::debug;

/// Package presence through the platform's package database
pub struct PackageEvaluator;

impl Evaluator for PackageEvaluator {
    fn family(&self) -> Family {
        Family::Package
    }

    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome {
        let Check::Package { name, installed } = check else {
            return mismatch(self.family(), check);
        };
        let tool = match ctx.snapshot.meta.platform {
            PlatformFamily::Debian => "dpkg-query",
            PlatformFamily::RedHat => "rpm",
        };

        let state = match ctx.snapshot.package_state(name) {
            Ok(state) => state,
            Err(e) => {
                debug!("{}: package query failed: {}", ctx.rule_id, e);
                return Outcome::from_error(&e, format!("{} {}", tool, name));
            }
        };

        let is_installed = state == PackageState::Installed;
        let evidence = Evidence::command(format!("{} {}", tool, name), state.as_str());
        let actual = format!("{} is {}", name, state.as_str());
        if is_installed == *installed {
            Outcome::pass(actual, evidence)
        } else {
            let wanted = if *installed { "installed" } else { "removed" };
            Outcome::fail(actual, evidence)
                .with_description(format!("Package {} should be {}", name, wanted))
        }
    }
}
