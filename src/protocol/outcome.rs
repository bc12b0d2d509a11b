//! Outcomes of a single test case

use super::oracle::Observation;
use crate::ConformanceError;
use thiserror::Error;

/// Why a test case failed
#[derive(Error, Debug)]
pub enum CaseFailure {
    /// A runtime call failed; the case stopped where it was
    #[error("fatal runtime error: {0}")]
    Fatal(#[from] ConformanceError),

    /// A precondition the case requires does not hold
    #[error("requirement not met: {0}")]
    Requirement(String),

    /// The oracle rejected an observation
    #[error("ordering violated in iteration {iteration}: observed {observation}")]
    Assertion {
        iteration: u32,
        observation: Observation,
    },
}

/// Result of running one test case
#[derive(Debug)]
pub enum CaseOutcome {
    Passed { iterations: u32 },
    Skipped { reason: String },
    Failed(CaseFailure),
}

impl CaseOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, CaseOutcome::Passed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CaseOutcome::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CaseOutcome::Failed(_))
    }

    /// Short status word for reports
    pub fn label(&self) -> &'static str {
        match self {
            CaseOutcome::Passed { .. } => "PASSED",
            CaseOutcome::Skipped { .. } => "SKIPPED",
            CaseOutcome::Failed(_) => "FAILED",
        }
    }

    pub fn failure(&self) -> Option<&CaseFailure> {
        match self {
            CaseOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<std::result::Result<CaseOutcome, CaseFailure>> for CaseOutcome {
    fn from(result: std::result::Result<CaseOutcome, CaseFailure>) -> Self {
        result.unwrap_or_else(CaseOutcome::Failed)
    }
}
