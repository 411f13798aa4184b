use super::{mismatch, EvalContext, Evaluator};
use crate::check::{Check, Family};
use hostaudit_core::Outcome;

/// Rules that need a human to verify
pub struct ManualEvaluator;

impl Evaluator for ManualEvaluator {
    fn family(&self) -> Family {
        Family::Manual
    }

    fn evaluate(&self, check: &Check, _ctx: &EvalContext<'_>) -> Outcome {
        match check {
            Check::Manual { reason } => Outcome::manual(reason.clone()),
            other => mismatch(self.family(), other),
        }
    }
}
