use super::{mismatch, EvalContext, Evaluator};
use crate::check::{Check, Family, ServiceExpectation};
use hostaudit_core::{Evidence, Outcome};
use hostaudit_snapshot::ServiceEnablement;
use tracing::debug;

/// systemd unit state through the platform adapter
pub struct ServiceEvaluator;

impl Evaluator for ServiceEvaluator {
    fn family(&self) -> Family {
        Family::Service
    }

    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome {
        let Check::Service { name, expected } = check else {
            return mismatch(self.family(), check);
        };
        let snapshot = ctx.snapshot;

        let (query, state, satisfied) = match expected {
            ServiceExpectation::Active | ServiceExpectation::Inactive => {
                let activity = match snapshot.service_activity(name) {
                    Ok(a) => a,
                    Err(e) => {
                        debug!("{}: service query failed: {}", ctx.rule_id, e);
                        return Outcome::from_error(&e, format!("systemctl is-active {}", name));
                    }
                };
                let satisfied = match expected {
                    ServiceExpectation::Active => activity.is_active(),
                    _ => !activity.is_active(),
                };
                ("is-active", activity.as_str().to_string(), satisfied)
            }
            _ => {
                let enablement = match snapshot.service_enablement(name) {
                    Ok(s) => s,
                    Err(e) => {
                        debug!("{}: service query failed: {}", ctx.rule_id, e);
                        return Outcome::from_error(&e, format!("systemctl is-enabled {}", name));
                    }
                };
                let satisfied = match expected {
                    ServiceExpectation::Enabled => enablement.is_enabled(),
                    ServiceExpectation::Masked => enablement == ServiceEnablement::Masked,
                    _ => enablement.is_disabled(),
                };
                ("is-enabled", enablement.as_str().to_string(), satisfied)
            }
        };

        let evidence = Evidence::command(
            format!("systemctl {} {}", query, name),
            state.as_str(),
        );
        let actual = format!("{} is {}", name, state);
        if satisfied {
            Outcome::pass(actual, evidence)
        } else {
            Outcome::fail(actual, evidence).with_description(format!(
                "Service {} should be {}",
                name,
                expected.as_str()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluators::testing::Fixture;
    use hostaudit_core::{ErrorKind, Verdict};
    use pretty_assertions::assert_eq;

    fn run(fixture: &Fixture, name: &str, expected: ServiceExpectation) -> Outcome {
        let snapshot = fixture.snapshot();
        let config = fixture.config();
        let ctx = EvalContext::new(&snapshot, &config, "2.1.1");
        ServiceEvaluator.evaluate(
            &Check::Service {
                name: name.to_string(),
                expected,
            },
            &ctx,
        )
    }

    #[test]
    fn test_disabled_expectation() {
        let mut fixture = Fixture::new();
        fixture.platform = fixture
            .platform
            .clone()
            .service("autofs.service", ServiceEnablement::Enabled)
            .service("avahi-daemon.service", ServiceEnablement::Masked);

        let outcome = run(&fixture, "autofs", ServiceExpectation::Disabled);
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert_eq!(outcome.actual, "autofs is enabled");
        assert_eq!(outcome.evidence.source, "systemctl is-enabled autofs");

        assert_eq!(
            run(&fixture, "avahi-daemon", ServiceExpectation::Disabled).verdict,
            Verdict::Pass
        );
        // Unknown units cannot start
        assert_eq!(
            run(&fixture, "rpcbind", ServiceExpectation::Disabled).verdict,
            Verdict::Pass
        );
        assert_eq!(
            run(&fixture, "rpcbind", ServiceExpectation::Masked).verdict,
            Verdict::Fail
        );
    }

    #[test]
    fn test_enabled_expectation_accepts_static() {
        let mut fixture = Fixture::new();
        fixture.platform = fixture
            .platform
            .clone()
            .service("auditd.service", ServiceEnablement::Static);
        assert_eq!(
            run(&fixture, "auditd", ServiceExpectation::Enabled).verdict,
            Verdict::Pass
        );
    }

    #[test]
    fn test_activity() {
        let mut fixture = Fixture::new();
        fixture.platform = fixture.platform.clone().running("chrony.service");
        assert_eq!(
            run(&fixture, "chrony", ServiceExpectation::Active).verdict,
            Verdict::Pass
        );
        assert_eq!(
            run(&fixture, "chrony", ServiceExpectation::Inactive).verdict,
            Verdict::Fail
        );
    }

    #[test]
    fn test_timeout_is_labeled_error() {
        let mut fixture = Fixture::new();
        fixture.platform = fixture.platform.clone().hanging("sshd.service");
        let outcome = run(&fixture, "sshd", ServiceExpectation::Enabled);
        assert_eq!(outcome.verdict, Verdict::Error);
        assert_eq!(outcome.error_kind, Some(ErrorKind::Timeout));
    }
}
