//! Kernel parameter evaluation: live value plus persisted declaration

use super::{mismatch, EvalContext, Evaluator};
use crate::check::{Check, Family};
use hostaudit_core::{ErrorKind, Evidence, EvidenceMethod, Outcome};
use hostaudit_parsers::sysctl::{normalize_key, normalize_value, PROC_SYS};
use hostaudit_snapshot::SysctlState;
use std::collections::BTreeMap;

const IPV6_SWITCH: &str = "net.ipv6.conf.all.disable_ipv6";

pub struct SysctlEvaluator;

impl Evaluator for SysctlEvaluator {
    fn family(&self) -> Family {
        Family::Sysctl
    }

    fn evaluate(&self, check: &Check, ctx: &EvalContext<'_>) -> Outcome {
        let Check::Sysctl {
            parameter,
            expected,
        } = check
        else {
            return mismatch(self.family(), check);
        };
        evaluate_parameter(
            &ctx.snapshot.sysctl,
            &ctx.config.sysctl.safe_defaults,
            parameter,
            expected,
        )
    }
}

/// Classify one parameter
///
/// PASS requires the live value to match and either a persisted declaration
/// of the same value, a listed safe default, or no sysctl config at all.
pub fn evaluate_parameter(
    state: &SysctlState,
    safe_defaults: &BTreeMap<String, String>,
    parameter: &str,
    expected: &str,
) -> Outcome {
    let param = normalize_key(parameter);
    let expected = normalize_value(expected);
    let proc_path = format!("{}/{}", PROC_SYS, param.replace('.', "/"));

    if !state.is_applicable(&param) {
        return Outcome::not_applicable(
            "IPv6 disabled globally",
            Evidence::new(EvidenceMethod::Proc, proc_path, format!("{}=1", IPV6_SWITCH)),
        );
    }

    let Some(live) = state.runtime_value(&param).map(normalize_value) else {
        return Outcome::error(
            format!("parameter {} not found in /proc/sys", param),
            ErrorKind::Io,
            Evidence::new(EvidenceMethod::Proc, proc_path, "not found"),
        );
    };

    if live != expected {
        return Outcome::fail(
            format!("{} = {} (expected: {})", param, live, expected),
            Evidence::new(EvidenceMethod::Proc, proc_path, format!("{}={}", param, live)),
        )
        .with_description(format!("Parameter {} has incorrect value", param));
    }

    if let Some(persisted) = state.persisted(&param) {
        if normalize_value(&persisted.value) == expected {
            return Outcome::pass(
                format!("{} = {} (persistent)", param, live),
                Evidence::file(persisted.source.clone(), format!("{}={}", param, persisted.value)),
            );
        }
    }

    let safe = safe_defaults
        .get(&param)
        .map(|v| normalize_value(v) == expected)
        .unwrap_or(false);
    if safe {
        return Outcome::pass(
            format!("{} = {} (kernel default, secure)", param, live),
            Evidence::new(EvidenceMethod::Proc, proc_path, format!("{}={}", param, live)),
        );
    }

    if !state.has_persistent_config() {
        return Outcome::pass(
            format!("{} = {} (kernel default)", param, live),
            Evidence::new(EvidenceMethod::Proc, proc_path, format!("{}={}", param, live)),
        );
    }

    let snippet = match state.persisted(&param) {
        Some(p) => format!("{}={} in {}", param, p.value, p.source),
        None => String::from("(runtime only)"),
    };
    Outcome::fail(
        format!("{} = {} (not persistent)", param, live),
        Evidence::new(EvidenceMethod::Proc, proc_path, snippet),
    )
    .with_description(format!("Parameter {} not persistent across reboots", param))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostaudit_core::Verdict;
    use hostaudit_parsers::PersistedValue;
    use pretty_assertions::assert_eq;

    fn state(runtime: &[(&str, &str)], persisted: &[(&str, &str)]) -> SysctlState {
        let runtime: BTreeMap<String, String> = runtime
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let ipv6_enabled = runtime.get(IPV6_SWITCH).map(String::as_str) != Some("1");
        SysctlState {
            runtime,
            persistent: persisted
                .iter()
                .map(|(k, v)| {
                    (
                        k.to_string(),
                        PersistedValue {
                            value: v.to_string(),
                            source: "/etc/sysctl.d/60-cis.conf".to_string(),
                        },
                    )
                })
                .collect(),
            ipv6_enabled,
        }
    }

    fn safe() -> BTreeMap<String, String> {
        BTreeMap::from([("net.ipv4.tcp_syncookies".to_string(), "1".to_string())])
    }

    #[test]
    fn test_persistent_pass() {
        let state = state(&[("net.ipv4.ip_forward", "0")], &[("net.ipv4.ip_forward", "0")]);
        let outcome = evaluate_parameter(&state, &safe(), "net.ipv4.ip_forward", "0");
        assert_eq!(outcome.verdict, Verdict::Pass);
        assert!(outcome.actual.contains("persistent"));
        assert_eq!(outcome.evidence.method, EvidenceMethod::File);
        assert_eq!(outcome.evidence.snippet, "net.ipv4.ip_forward=0");
    }

    #[test]
    fn test_runtime_only_fails() {
        let state = state(
            &[("net.ipv4.ip_forward", "0")],
            &[("kernel.randomize_va_space", "2")],
        );
        let outcome = evaluate_parameter(&state, &safe(), "net.ipv4.ip_forward", "0");
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert_eq!(outcome.actual, "net.ipv4.ip_forward = 0 (not persistent)");
        assert_eq!(outcome.evidence.snippet, "(runtime only)");
    }

    #[test]
    fn test_persisted_with_other_value_fails() {
        let state = state(&[("net.ipv4.ip_forward", "0")], &[("net.ipv4.ip_forward", "1")]);
        let outcome = evaluate_parameter(&state, &safe(), "net.ipv4.ip_forward", "0");
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert!(outcome.actual.ends_with("(not persistent)"));
    }

    #[test]
    fn test_safe_default_and_no_config() {
        let with_config = state(
            &[("net.ipv4.tcp_syncookies", "1")],
            &[("kernel.randomize_va_space", "2")],
        );
        let outcome = evaluate_parameter(&with_config, &safe(), "net.ipv4.tcp_syncookies", "1");
        assert_eq!(outcome.verdict, Verdict::Pass);
        assert!(outcome.actual.ends_with("(kernel default, secure)"));

        let no_config = state(&[("net.ipv4.ip_forward", "0")], &[]);
        let outcome = evaluate_parameter(&no_config, &safe(), "net.ipv4.ip_forward", "0");
        assert_eq!(outcome.verdict, Verdict::Pass);
        assert!(outcome.actual.ends_with("(kernel default)"));
    }

    #[test]
    fn test_mismatch_fails_regardless_of_persistence() {
        let state = state(&[("net.ipv4.ip_forward", "1")], &[("net.ipv4.ip_forward", "0")]);
        let outcome = evaluate_parameter(&state, &safe(), "net.ipv4.ip_forward", "0");
        assert_eq!(outcome.verdict, Verdict::Fail);
        assert_eq!(outcome.actual, "net.ipv4.ip_forward = 1 (expected: 0)");
        assert_eq!(outcome.evidence.method, EvidenceMethod::Proc);
    }

    #[test]
    fn test_ipv6_disabled_not_applicable() {
        let state = state(
            &[(IPV6_SWITCH, "1"), ("net.ipv6.conf.all.accept_ra", "1")],
            &[],
        );
        let outcome = evaluate_parameter(&state, &safe(), "net.ipv6.conf.all.accept_ra", "0");
        assert_eq!(outcome.verdict, Verdict::NotApplicable);
        assert_eq!(outcome.actual, "IPv6 disabled globally");
    }

    #[test]
    fn test_missing_parameter_is_error() {
        let state = state(&[], &[]);
        let outcome = evaluate_parameter(&state, &safe(), "net.ipv4.nope", "0");
        assert_eq!(outcome.verdict, Verdict::Error);
        assert!(outcome.actual.contains("not found in /proc/sys"));
    }

    #[test]
    fn test_whitespace_and_slash_forms() {
        let state = state(
            &[("net.ipv4.ip_local_port_range", "32768\t60999")],
            &[("net.ipv4.ip_local_port_range", "32768 60999")],
        );
        let outcome = evaluate_parameter(
            &state,
            &safe(),
            "net/ipv4/ip_local_port_range",
            "32768  60999",
        );
        assert_eq!(outcome.verdict, Verdict::Pass);
    }
}
