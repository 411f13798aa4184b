//! hostaudit Core - Foundation types and error handling
//!
//! This crate provides the types shared by every hostaudit crate:
//! - `Error`: the crate-wide error enum and `Result` alias
//! - `Status` and `Verdict`: canonical and evaluator-level statuses
//! - `Outcome`, `Evidence`: what an evaluator returns for one rule
//! - `RuleResult`: the canonical result handed to reporting layers

pub mod error;
pub mod outcome;
pub mod status;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use outcome::{
    truncate_snippet, ErrorKind, Evidence, EvidenceMethod, Outcome, RuleResult, MAX_SNIPPET_CHARS,
};
pub use status::{ReductionPolicy, Status, Verdict};
