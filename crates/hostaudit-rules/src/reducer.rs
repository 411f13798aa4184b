//! Collapse evaluator verdicts into the five canonical statuses

use hostaudit_common::AuditConfig;
use hostaudit_core::{Status, Verdict};

/// Canonical status for a verdict of a rule of `kind`
///
/// The policy comes from `[reduction.overrides]` for the kind, falling back
/// to `reduction.default_policy`.
pub fn reduce(config: &AuditConfig, kind: &str, verdict: &Verdict) -> Status {
    config.policy_for(kind).reduce(verdict)
}

/// Canonical status for a legacy status string such as `SKIPPED` or `N/A`
pub fn reduce_legacy(config: &AuditConfig, kind: &str, status: &str) -> Status {
    let verdict = match status.parse::<Verdict>() {
        Ok(verdict) => verdict,
        Err(never) => match never {},
    };
    reduce(config, kind, &verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostaudit_core::ReductionPolicy;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_preserve_is_default() {
        let config = AuditConfig::default();
        assert_eq!(reduce(&config, "MountOption", &Verdict::NotApplicable), Status::NotApplicable);
        assert_eq!(reduce_legacy(&config, "Service", "SKIPPED"), Status::NotApplicable);
        assert_eq!(reduce_legacy(&config, "Service", "WEIRD"), Status::Error);
        assert_eq!(reduce_legacy(&config, "Service", "n/a"), Status::NotApplicable);
    }

    #[test]
    fn test_kind_override() {
        let config = AuditConfig::builder()
            .kind_policy("MountOption", ReductionPolicy::MilestoneStrict)
            .build();
        assert_eq!(reduce(&config, "MountOption", &Verdict::NotApplicable), Status::Fail);
        assert_eq!(reduce(&config, "MountOption", &Verdict::Error), Status::Error);
        assert_eq!(reduce(&config, "MountPoint", &Verdict::NotApplicable), Status::NotApplicable);
    }

    #[test]
    fn test_every_verdict_lands_on_canonical_status() {
        let verdicts = [
            Verdict::Pass,
            Verdict::Fail,
            Verdict::Manual,
            Verdict::NotApplicable,
            Verdict::Error,
            Verdict::Skipped,
            Verdict::Unknown("MAYBE".into()),
        ];
        for policy in [ReductionPolicy::Preserve, ReductionPolicy::MilestoneStrict] {
            let config = AuditConfig::builder().reduction_policy(policy).build();
            for verdict in &verdicts {
                assert!(Status::ALL.contains(&reduce(&config, "Any", verdict)));
            }
        }
    }
}
