//! Evaluation statuses and the policies that reduce them

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Canonical outcome of a rule, closed to exactly five values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Host satisfies the rule
    Pass,
    /// Host violates the rule
    Fail,
    /// Rule needs human review
    Manual,
    /// Rule does not apply to this host
    NotApplicable,
    /// Rule could not be evaluated
    Error,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Pass,
        Status::Fail,
        Status::Manual,
        Status::NotApplicable,
        Status::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Manual => "MANUAL",
            Status::NotApplicable => "NOT_APPLICABLE",
            Status::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status as produced by an evaluator, before reduction
///
/// Wider than [`Status`]: it also carries the legacy `SKIPPED` state and any
/// unrecognized label read from an older rule source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Verdict {
    Pass,
    Fail,
    Manual,
    NotApplicable,
    Error,
    Skipped,
    Unknown(String),
}

impl Verdict {
    pub fn is_canonical(&self) -> bool {
        !matches!(self, Verdict::Skipped | Verdict::Unknown(_))
    }
}

impl FromStr for Verdict {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let verdict = match s.trim().to_ascii_uppercase().as_str() {
            "PASS" => Verdict::Pass,
            "FAIL" => Verdict::Fail,
            "MANUAL" => Verdict::Manual,
            "NOT_APPLICABLE" | "N/A" | "NA" => Verdict::NotApplicable,
            "ERROR" => Verdict::Error,
            "SKIPPED" | "SKIP" => Verdict::Skipped,
            _ => Verdict::Unknown(s.to_string()),
        };
        Ok(verdict)
    }
}

impl From<Status> for Verdict {
    fn from(status: Status) -> Self {
        match status {
            Status::Pass => Verdict::Pass,
            Status::Fail => Verdict::Fail,
            Status::Manual => Verdict::Manual,
            Status::NotApplicable => Verdict::NotApplicable,
            Status::Error => Verdict::Error,
        }
    }
}

/// How non-canonical verdicts collapse into a [`Status`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionPolicy {
    /// Canonical verdicts pass through, `Skipped` becomes NOT_APPLICABLE and
    /// anything unrecognized becomes ERROR.
    #[default]
    Preserve,
    /// For rules already filtered into a milestone: inclusion implies
    /// applicability, so NOT_APPLICABLE, `Skipped` and unrecognized verdicts
    /// all become FAIL.
    MilestoneStrict,
}

impl ReductionPolicy {
    pub fn reduce(&self, verdict: &Verdict) -> Status {
        match (self, verdict) {
            (_, Verdict::Pass) => Status::Pass,
            (_, Verdict::Fail) => Status::Fail,
            (_, Verdict::Manual) => Status::Manual,
            (_, Verdict::Error) => Status::Error,
            (ReductionPolicy::Preserve, Verdict::NotApplicable) => Status::NotApplicable,
            (ReductionPolicy::Preserve, Verdict::Skipped) => Status::NotApplicable,
            (ReductionPolicy::Preserve, Verdict::Unknown(_)) => Status::Error,
            (ReductionPolicy::MilestoneStrict, _) => Status::Fail,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReductionPolicy::Preserve => "preserve",
            ReductionPolicy::MilestoneStrict => "milestone_strict",
        }
    }
}

impl FromStr for ReductionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preserve" => Ok(ReductionPolicy::Preserve),
            "milestone_strict" | "strict" => Ok(ReductionPolicy::MilestoneStrict),
            other => Err(format!("unknown reduction policy '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_legacy_labels_parse() {
        assert_eq!("SKIPPED".parse::<Verdict>().unwrap(), Verdict::Skipped);
        assert_eq!(
            "not_applicable".parse::<Verdict>().unwrap(),
            Verdict::NotApplicable
        );
        assert_eq!(
            "WARN".parse::<Verdict>().unwrap(),
            Verdict::Unknown("WARN".into())
        );
    }

    #[test]
    fn test_preserve_policy() {
        let policy = ReductionPolicy::Preserve;
        assert_eq!(policy.reduce(&Verdict::Skipped), Status::NotApplicable);
        assert_eq!(policy.reduce(&Verdict::NotApplicable), Status::NotApplicable);
        assert_eq!(policy.reduce(&Verdict::Unknown("WARN".into())), Status::Error);
        assert_eq!(policy.reduce(&Verdict::Manual), Status::Manual);
    }

    #[test]
    fn test_strict_policy_folds_into_fail() {
        let policy = ReductionPolicy::MilestoneStrict;
        assert_eq!(policy.reduce(&Verdict::Skipped), Status::Fail);
        assert_eq!(policy.reduce(&Verdict::NotApplicable), Status::Fail);
        assert_eq!(policy.reduce(&Verdict::Unknown("?".into())), Status::Fail);
        assert_eq!(policy.reduce(&Verdict::Error), Status::Error);
        assert_eq!(policy.reduce(&Verdict::Pass), Status::Pass);
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&Status::NotApplicable).unwrap();
        assert_eq!(json, "\"NOT_APPLICABLE\"");
    }
}
