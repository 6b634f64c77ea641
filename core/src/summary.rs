//! Batch run summaries and the count reconciliation invariant.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::OutcomeKind;

/// Defect raised when a finished batch fails its internal accounting.
///
/// A count mismatch is an engine bug, not a job failure, and callers must
/// surface it distinctly from ordinary batch failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SummaryError {
    /// Per-kind counts do not add up to the number of submitted jobs.
    #[error(
        "outcome counts do not reconcile: {success} success + {warning} warning + {error} error != {total} submitted"
    )]
    CountMismatch {
        total: usize,
        success: usize,
        warning: usize,
        error: usize,
    },
}

/// Aggregate totals for one finished batch.
///
/// Built incrementally by the report aggregator; [`reconcile`] enforces
/// `success + warning + error == total` before the summary is handed to the
/// caller.
///
/// [`reconcile`]: RunSummary::reconcile
///
/// # Examples
///
/// ```
/// use rasterload_core::{OutcomeKind, RunSummary};
///
/// let mut summary = RunSummary::new(2);
/// summary.count(OutcomeKind::Success);
/// summary.count(OutcomeKind::Error);
/// assert!(summary.reconcile().is_ok());
/// assert_eq!(summary.error, 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Jobs submitted to the executor.
    pub total: usize,
    /// Jobs classified `Success`.
    pub success: usize,
    /// Jobs classified `Warning`.
    pub warning: usize,
    /// Jobs classified `Error`.
    pub error: usize,
    /// Input lines skipped by the command source.
    pub invalid_lines: usize,
    /// Wall-clock duration of the batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<f64>,
}

impl RunSummary {
    /// Creates a summary for a batch of `total` submitted jobs.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Increments the counter for one recorded outcome kind.
    pub fn count(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Success => self.success += 1,
            OutcomeKind::Warning => self.warning += 1,
            OutcomeKind::Error => self.error += 1,
        }
    }

    /// Number of outcomes recorded so far.
    pub fn recorded(&self) -> usize {
        self.success + self.warning + self.error
    }

    /// Records the batch wall-clock duration.
    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_secs = Some(elapsed.as_secs_f64());
    }

    /// Checks the accounting invariant `success + warning + error == total`.
    pub fn reconcile(&self) -> Result<(), SummaryError> {
        if self.recorded() == self.total {
            Ok(())
        } else {
            Err(SummaryError::CountMismatch {
                total: self.total,
                success: self.success,
                warning: self.warning,
                error: self.error,
            })
        }
    }

    /// Returns `true` when at least one job was classified `Error`.
    pub fn has_failures(&self) -> bool {
        self.error > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_accepts_matching_counts() {
        let mut summary = RunSummary::new(3);
        summary.count(OutcomeKind::Success);
        summary.count(OutcomeKind::Warning);
        summary.count(OutcomeKind::Error);
        assert!(summary.reconcile().is_ok());
    }

    #[test]
    fn test_reconcile_rejects_missing_outcome() {
        let mut summary = RunSummary::new(2);
        summary.count(OutcomeKind::Success);
        let err = summary.reconcile().unwrap_err();
        assert!(matches!(err, SummaryError::CountMismatch { total: 2, .. }));
    }

    #[test]
    fn test_summary_serde_omits_missing_elapsed() {
        let summary = RunSummary::new(1);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(!json.contains("elapsed_secs"));

        let mut timed = RunSummary::new(1);
        timed.set_elapsed(Duration::from_millis(1500));
        let json = serde_json::to_string(&timed).unwrap();
        assert!(json.contains("elapsed_secs"));
    }

    #[test]
    fn test_has_failures() {
        let mut summary = RunSummary::new(1);
        summary.count(OutcomeKind::Warning);
        assert!(!summary.has_failures());
        summary.count(OutcomeKind::Error);
        assert!(summary.has_failures());
    }
}
