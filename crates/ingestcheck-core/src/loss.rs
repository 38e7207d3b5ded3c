//! Aggregate loss fraction against the configured tolerance.

use serde::{Deserialize, Serialize};

use crate::error::{VerifyError, VerifyResult};
use crate::poller::CompletenessOutcome;

/// Loss verdict for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossVerdict {
    pub total_missing: u64,
    pub total_expected: u64,
    /// `total_missing / total_expected`, 0 when nothing was expected.
    pub lost_fraction: f64,
    pub allowed_fraction: f64,
    /// `lost_fraction <= allowed_fraction`.
    pub passed: bool,
}

impl LossVerdict {
    /// `Err(LossExceeded)` when the tolerance was breached.
    pub fn into_result(self) -> VerifyResult<Self> {
        if self.passed {
            Ok(self)
        } else {
            Err(VerifyError::LossExceeded {
                observed: self.lost_fraction,
                allowed: self.allowed_fraction,
            })
        }
    }
}

/// Combines per-producer missing counts into a single verdict.
pub struct LossAggregator;

impl LossAggregator {
    /// Evaluate the loss of `missing_counts` against `total_expected`.
    ///
    /// Equality with the tolerance passes.
    pub fn evaluate<I>(missing_counts: I, total_expected: u64, allowed_fraction: f64) -> LossVerdict
    where
        I: IntoIterator<Item = u64>,
    {
        let total_missing: u64 = missing_counts.into_iter().sum();
        let lost_fraction = if total_expected == 0 {
            0.0
        } else {
            total_missing as f64 / total_expected as f64
        };
        let passed = lost_fraction <= allowed_fraction;

        LossVerdict {
            total_missing,
            total_expected,
            lost_fraction,
            allowed_fraction,
            passed,
        }
    }

    /// Evaluate the final state of a completeness wait.
    pub fn evaluate_outcome(outcome: &CompletenessOutcome, allowed_fraction: f64) -> LossVerdict {
        Self::evaluate(
            outcome.shortfalls.iter().map(|s| s.missing),
            outcome.total_expected,
            allowed_fraction,
        )
    }
}
