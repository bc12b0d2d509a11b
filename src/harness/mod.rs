//! Test case registry and runner
//!
//! Each fence scenario is registered as a named case. The harness filters
//! cases by name, runs them in registration order against one platform, and
//! folds the outcomes into a [`RunSummary`] whose exit code the binary returns.

use crate::config::ConformanceConfig;
use crate::protocol::{CaseOutcome, FenceProtocolDriver, Scenario};
use crate::runtime::Platform;
use crate::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A named, runnable test case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestCase {
    pub name: &'static str,
    pub description: &'static str,
    pub scenario: Scenario,
}

impl TestCase {
    fn for_scenario(scenario: Scenario) -> Self {
        Self {
            name: scenario.case_name(),
            description: scenario.description(),
            scenario,
        }
    }

    /// Substring match on the case name; `None` selects everything
    pub fn matches(&self, filter: Option<&str>) -> bool {
        filter.map_or(true, |f| self.name.contains(f))
    }
}

/// All registered cases, in run order
pub fn registry() -> Vec<TestCase> {
    Scenario::ALL.iter().copied().map(TestCase::for_scenario).collect()
}

/// Cases whose names contain `filter`
pub fn select(filter: Option<&str>) -> Vec<TestCase> {
    registry().into_iter().filter(|case| case.matches(filter)).collect()
}

/// Outcome of one case plus its wall time
#[derive(Debug)]
pub struct CaseReport {
    pub name: &'static str,
    pub outcome: CaseOutcome,
    pub elapsed: Duration,
}

impl CaseReport {
    /// One-line, human readable status
    pub fn summary_line(&self) -> String {
        let detail = match &self.outcome {
            CaseOutcome::Passed { iterations } => format!("{} iterations", iterations),
            CaseOutcome::Skipped { reason } => reason.clone(),
            CaseOutcome::Failed(failure) => failure.to_string(),
        };
        format!(
            "[{:>7}] {} ({:.2?}): {}",
            self.outcome.label(),
            self.name,
            self.elapsed,
            detail
        )
    }
}

/// Aggregate of a harness run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<CaseReport>,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_passed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_failed()).count()
    }

    /// `true` when nothing failed; skips count as success
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Process exit status: 0 on success, 1 if any case failed
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Runs registered cases against a single emulated platform
pub struct Harness {
    driver: FenceProtocolDriver,
}

impl Harness {
    /// Validate `config` and build the platform it describes
    pub fn new(config: ConformanceConfig) -> Result<Self> {
        config.validate()?;
        let platform = Arc::new(Platform::new(&config.topology)?);
        Ok(Self::with_driver(FenceProtocolDriver::new(platform, config)))
    }

    pub fn with_driver(driver: FenceProtocolDriver) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &FenceProtocolDriver {
        &self.driver
    }

    /// Run every case matching `filter`
    pub fn run(&self, filter: Option<&str>) -> RunSummary {
        let cases = select(filter);
        if cases.is_empty() {
            log::warn!("No test case matches filter {:?}", filter);
        }

        let mut summary = RunSummary::default();
        for case in cases {
            let start = Instant::now();
            let outcome = self.driver.run(case.scenario);
            let report = CaseReport {
                name: case.name,
                outcome,
                elapsed: start.elapsed(),
            };
            log::debug!("{}", report.summary_line());
            summary.reports.push(report);
        }

        log::info!(
            "{} passed, {} skipped, {} failed",
            summary.passed(),
            summary.skipped(),
            summary.failed()
        );
        summary
    }
}
