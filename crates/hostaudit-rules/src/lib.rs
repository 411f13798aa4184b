//! hostaudit Rules - Rule evaluation for CIS-style host audits
//!
//! This crate provides:
//! - `RawRule`: rule records in both the legacy flat and the typed shape
//! - `Check`: the normalized, validated form of a rule
//! - `Evaluator` implementations, one per check family
//! - `EvaluatorRegistry`: rule kind strings mapped to evaluators
//! - `RuleAuditor`: runs a rule list against a snapshot and reduces every
//!   outcome to one of five canonical statuses
//!
//! # Example
//!
//! ```no_run
//! use hostaudit_common::AuditConfig;
//! use hostaudit_rules::{RawRule, RuleAuditor};
//! use hostaudit_snapshot::SnapshotBuilder;
//!
//! let config = AuditConfig::default().merge_env();
//! let snapshot = SnapshotBuilder::new(&config).build();
//! let rule = RawRule::from_json(
//!     r#"{"id": "1.5.1", "type": "SysctlParameter",
//!         "parameter_name": "kernel.randomize_va_space", "expected_value": "2"}"#,
//! )
//! .unwrap();
//!
//! let audit = RuleAuditor::new(&snapshot, &config).run(&[rule]);
//! for result in &audit.results {
//!     println!("{} {} {}", result.id, result.status, result.actual);
//! }
//! ```

pub mod auditor;
pub mod check;
pub mod evaluators;
pub mod reducer;
pub mod registry;
pub mod schema;

pub use auditor::{AuditResult, AuditSummary, RuleAuditor};
pub use check::{normalize, Check, Family, ModeComparison, RuleMeta, ServiceExpectation};
pub use evaluators::{EvalContext, Evaluator};
pub use reducer::{reduce, reduce_legacy};
pub use registry::EvaluatorRegistry;
pub use schema::{CheckBlock, RawRule, RuleFields};
