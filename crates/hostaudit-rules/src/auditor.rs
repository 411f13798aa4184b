//! Rule auditor - runs a rule list against one snapshot

use crate::check::{normalize, RuleMeta};
use crate::evaluators::EvalContext;
use crate::reducer::reduce;
use crate::registry::EvaluatorRegistry;
use crate::schema::RawRule;
use hostaudit_common::AuditConfig;
use hostaudit_core::{Error, Outcome, RuleResult, Status};
use hostaudit_snapshot::Snapshot;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const MANUAL_REASON: &str = "Manual verification required";

/// Result of a full audit run
#[derive(Debug, Clone, Serialize)]
pub struct AuditResult {
    /// Rule results in input order
    pub results: Vec<RuleResult>,
    pub summary: AuditSummary,
}

impl AuditResult {
    /// Results that did not pass and are not informational
    pub fn failures(&self) -> impl Iterator<Item = &RuleResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, Status::Fail | Status::Error))
    }

    pub fn by_status(&self, status: Status) -> Vec<&RuleResult> {
        self.results.iter().filter(|r| r.status == status).collect()
    }

    pub fn get(&self, id: &str) -> Option<&RuleResult> {
        self.results.iter().find(|r| r.id == id)
    }
}

/// Summary of audit results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    /// Rules evaluated
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub manual: usize,
    pub not_applicable: usize,
    pub errors: usize,
    /// Rules above the configured profile level, not evaluated
    pub skipped_by_profile: usize,
    /// Evaluated rules per kind
    pub by_kind: BTreeMap<String, usize>,
}

impl AuditSummary {
    fn record(&mut self, result: &RuleResult) {
        self.total += 1;
        match result.status {
            Status::Pass => self.passed += 1,
            Status::Fail => self.failed += 1,
            Status::Manual => self.manual += 1,
            Status::NotApplicable => self.not_applicable += 1,
            Status::Error => self.errors += 1,
        }
        *self.by_kind.entry(result.kind.clone()).or_insert(0) += 1;
    }

    /// Percentage of decided rules (PASS or FAIL) that passed
    pub fn pass_rate(&self) -> f64 {
        let decided = self.passed + self.failed;
        if decided == 0 {
            0.0
        } else {
            (self.passed as f64 / decided as f64) * 100.0
        }
    }
}

/// Evaluates rules against an immutable snapshot
pub struct RuleAuditor<'a> {
    snapshot: &'a Snapshot,
    config: &'a AuditConfig,
    registry: EvaluatorRegistry,
}

impl<'a> RuleAuditor<'a> {
    /// Auditor with every built-in rule kind
    pub fn new(snapshot: &'a Snapshot, config: &'a AuditConfig) -> Self {
        Self {
            snapshot,
            config,
            registry: EvaluatorRegistry::with_defaults(),
        }
    }

    /// Replace the evaluator registry
    pub fn with_registry(mut self, registry: EvaluatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &EvaluatorRegistry {
        &self.registry
    }

    /// Run every rule in order
    pub fn run(&self, rules: &[RawRule]) -> AuditResult {
        info!(
            "Starting audit of {} rules on {} ({} {})",
            rules.len(),
            self.snapshot.meta.hostname,
            self.snapshot.meta.os_name,
            self.snapshot.meta.os_version
        );

        let mut summary = AuditSummary::default();
        let mut results = Vec::with_capacity(rules.len());

        for rule in rules {
            if let (Some(max), Some(level)) =
                (self.config.audit.max_profile_level, rule.profile_level())
            {
                if level > max {
                    debug!("Skipping rule {} (level {} > {})", rule.id, level, max);
                    summary.skipped_by_profile += 1;
                    continue;
                }
            }

            let result = self.evaluate(rule);
            summary.record(&result);
            results.push(result);
        }

        info!(
            "Audit complete: {} passed, {} failed, {} manual, {} not applicable, {} errors",
            summary.passed, summary.failed, summary.manual, summary.not_applicable, summary.errors
        );

        AuditResult { results, summary }
    }

    /// Evaluate a single rule into its canonical result
    pub fn evaluate(&self, rule: &RawRule) -> RuleResult {
        let meta = RuleMeta::from_raw(rule);
        let outcome = self.outcome_for(rule);
        let status = reduce(self.config, &meta.kind, &outcome.verdict);
        debug!("{} [{}] -> {}", meta.id, meta.kind, status);

        RuleResult {
            id: meta.id,
            title: meta.title,
            kind: meta.kind,
            section: meta.section,
            status,
            actual: outcome.actual,
            evidence: outcome.evidence.limit(self.config.limits.snippet_chars),
            description: outcome.description.or(meta.description),
            error_kind: outcome.error_kind,
            cis_reference: meta.cis_reference,
            remediation: meta.remediation,
        }
    }

    fn outcome_for(&self, rule: &RawRule) -> Outcome {
        if rule.id.trim().is_empty() {
            return Outcome::validation("(unnamed rule)", "id");
        }
        if !rule.is_automated() {
            return Outcome::manual(MANUAL_REASON);
        }

        let Some(evaluator) = self.registry.get(&rule.kind) else {
            warn!("No evaluator for rule {} of kind '{}'", rule.id, rule.kind);
            return Outcome::manual(MANUAL_REASON)
                .with_description(format!("No automated check for kind '{}'", rule.kind));
        };

        let check = match normalize(rule, evaluator.family()) {
            Ok(check) => check,
            Err(Error::MissingField { field, .. }) => {
                debug!("Rule {} is missing {}", rule.id, field);
                return Outcome::validation(&rule.id, &field);
            }
            Err(e) => return Outcome::from_error(&e, rule.id.clone()),
        };

        let ctx = EvalContext::new(self.snapshot, self.config, &rule.id);
        evaluator.evaluate(&check, &ctx)
    }
}
