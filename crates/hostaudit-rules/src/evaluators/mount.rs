//! Mount option and separate-partition evaluation

use super::{mismatch, EvalContext, Evaluator};
use crate::check::{Check, Family};
use hostaudit_core::{Evidence, EvidenceMethod, Outcome};
use hostaudit_parsers::mounts::{FSTAB, PROC_MOUNTS};
use hostaudit_snapshot::MountState;

/// Option must be active now and declared in fstab
pub struct MountOptionEvaluator;

impl Evaluator for MountOptionEvaluator {
    fn family(&self) -> Family {
        Family::MountOption
    }

    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome {
        let Check::MountOption { point, option } = check else {
            return mismatch(self.family(), check);
        };
        evaluate_option(&ctx.snapshot.mounts, point, option)
    }
}

fn evaluate_option(mounts: &MountState, point: &str, option: &str) -> Outcome {
    let Some(live) = mounts.runtime.get(point) else {
        return Outcome::not_applicable(
            format!("{} is not mounted", point),
            Evidence::new(EvidenceMethod::System, PROC_MOUNTS, format!("{} not mounted", point)),
        );
    };

    let live_snippet = format!("{} {} {}", live.device, point, live.options_display());
    if !live.has_option(option) {
        return Outcome::fail(
            format!("{} not set on {}", option, point),
            Evidence::new(EvidenceMethod::System, PROC_MOUNTS, live_snippet),
        )
        .with_description(format!("Mount option {} missing on {}", option, point));
    }

    match mounts.fstab.get(point) {
        Some(declared) if declared.has_option(option) => Outcome::pass(
            format!("{} set on {} (persistent)", option, point),
            Evidence::file(
                FSTAB,
                format!("{} {} {}", declared.device, point, declared.options_display()),
            ),
        ),
        Some(declared) => Outcome::fail(
            format!("{} set on {} (not persistent)", option, point),
            Evidence::file(
                FSTAB,
                format!("{} {} {}", declared.device, point, declared.options_display()),
            ),
        )
        .with_description(format!("Mount option {} on {} is not in {}", option, point, FSTAB)),
        None => Outcome::fail(
            format!("{} set on {} (not persistent)", option, point),
            Evidence::new(EvidenceMethod::System, PROC_MOUNTS, live_snippet),
        )
        .with_description(format!("{} has no {} entry", point, FSTAB)),
    }
}

/// Mount point must live on its own filesystem
pub struct MountPointEvaluator;

impl Evaluator for MountPointEvaluator {
    fn family(&self) -> Family {
        Family::MountPoint
    }

    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome {
        let Check::MountPoint { point } = check else {
            return mismatch(self.family(), check);
        };
        evaluate_partition(&ctx.snapshot.mounts, point)
    }
}

fn evaluate_partition(mounts: &MountState, point: &str) -> Outcome {
    let Some(info) = mounts.runtime.get(point) else {
        return Outcome::fail(
            "not a separate partition",
            Evidence::new(EvidenceMethod::System, PROC_MOUNTS, format!("{} not mounted", point)),
        )
        .with_description(format!("{} is not mounted", point));
    };

    let snippet = format!("{} {} {}", info.device, point, info.fs_type);
    let shares_root = point != "/"
        && mounts
            .runtime
            .get("/")
            .map(|root| root.device == info.device)
            .unwrap_or(false);

    if shares_root {
        return Outcome::fail(
            "not a separate partition",
            Evidence::new(EvidenceMethod::System, PROC_MOUNTS, snippet),
        )
        .with_description(format!("{} is on the root device {}", point, info.device));
    }

    Outcome::pass(
        format!("{} mounted from {} ({})", point, info.device, info.fs_type),
        Evidence::new(EvidenceMethod::System, PROC_MOUNTS, snippet),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostaudit_core::Verdict;
    use hostaudit_parsers::mounts::{parse_fstab, parse_proc_mounts};
    use pretty_assertions::assert_eq;

    fn mounts(proc: &str, fstab: &str) -> MountState {
        MountState {
            runtime: parse_proc_mounts(proc),
            fstab: parse_fstab(fstab),
        }
    }

    const PROC: &str = "/dev/sda2 / ext4 rw,relatime 0 0\n\
        tmpfs /tmp tmpfs rw,nosuid,nodev 0 0\n\
        /dev/sda3 /var ext4 rw,nodev 0 0\n\
        /dev/sda2 /home ext4 rw 0 0\n";

    #[test]
    fn test_option_persistent_pass() {
        let state = mounts(PROC, "tmpfs /tmp tmpfs defaults,nosuid,nodev 0 0\n");
        let outcome = evaluate_option(&state, "/tmp", "nodev");
        assert_eq!(outcome.verdict, Verdict::Pass);
        assert_eq!(outcome.evidence.source, FSTAB);
    }

    #[test]
    fn test_option_live_only_fails() {
        let state = mounts(PROC, "tmpfs /tmp tmpfs defaults 0 0\n");
        let outcome = evaluate_option(&state, "/tmp", "nodev");
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert!(outcome.actual.ends_with("(not persistent)"));

        let no_entry = mounts(PROC, "");
        assert_eq!(
            evaluate_option(&no_entry, "/var", "nodev").verdict,
            Verdict::Fail
        );
    }

    #[test]
    fn test_option_missing_live_fails() {
        let state = mounts(PROC, "tmpfs /tmp tmpfs defaults,noexec 0 0\n");
        let outcome = evaluate_option(&state, "/tmp", "noexec");
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert_eq!(outcome.actual, "noexec not set on /tmp");
    }

    #[test]
    fn test_unmounted_not_applicable() {
        let state = mounts("/dev/sda2 / ext4 rw 0 0\n", "");
        let outcome = evaluate_option(&state, "/tmp", "nodev");
        assert_eq!(outcome.verdict, Verdict::NotApplicable);
    }

    #[test]
    fn test_separate_partition() {
        let state = mounts(PROC, "");
        assert_eq!(evaluate_partition(&state, "/var").verdict, Verdict::Pass);
        assert_eq!(evaluate_partition(&state, "/tmp").verdict, Verdict::Pass);
        assert_eq!(evaluate_partition(&state, "/home").verdict, Verdict::Fail);
        assert_eq!(
            evaluate_partition(&state, "/var/log").actual,
            "not a separate partition"
        );
    }
}
