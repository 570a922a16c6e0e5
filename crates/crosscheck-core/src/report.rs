//! Run report: per-execution outcomes aggregated into a final verdict.
//!
//! A run is successful iff every (step, engine, method) outcome is a pass.
//! Skipped outcomes (recorded when a lane aborts after an earlier failure)
//! keep the report complete without hiding how far each engine got.

use crate::http::TransportError;
use crate::matcher::MismatchError;
use crate::request::BuildError;
use crate::scenario::Method;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Why one (step, engine, method) execution failed.
#[derive(Debug, Error)]
pub enum StepFailure {
    /// The request could not be assembled.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// No usable response after all retries.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response did not satisfy the step's expectation.
    #[error(transparent)]
    Mismatch(#[from] MismatchError),
}

/// Verdict for one execution.
#[derive(Debug)]
pub enum Outcome {
    /// The response satisfied the step's expectation.
    Passed,
    /// The execution failed; the cause carries diagnostics.
    Failed(StepFailure),
    /// Not executed because the lane aborted earlier.
    Skipped { reason: String },
}

/// One recorded (step index, engine, method) execution.
#[derive(Debug)]
pub struct StepOutcome {
    /// Zero-based step index within the scenario.
    pub step: usize,
    /// The step's free-text description, if any.
    pub description: Option<String>,
    /// Engine identifier the step ran against.
    pub engine: String,
    /// Verb used for this execution.
    pub method: Method,
    /// Declared endpoint, for diagnostics.
    pub endpoint: String,
    /// Attempts made (0 for skipped executions).
    pub attempts: u32,
    /// Wall-clock duration including retries and settle delay.
    pub duration: Duration,
    /// The verdict.
    pub outcome: Outcome,
}

impl StepOutcome {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, Outcome::Passed)
    }

    pub fn failed(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }

    pub fn skipped(&self) -> bool {
        matches!(self.outcome, Outcome::Skipped { .. })
    }

    /// Short display label: `step 3 GET _cat/indices [quickwit]`.
    pub fn label(&self) -> String {
        format!(
            "step {} {} {} [{}]",
            self.step, self.method, self.endpoint, self.engine
        )
    }
}

/// Aggregated outcomes for one scenario run.
#[derive(Debug)]
pub struct RunReport {
    /// Scenario display name.
    pub scenario: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Total wall-clock duration.
    pub duration: Duration,
    /// Every recorded execution, grouped by engine in configuration order.
    pub outcomes: Vec<StepOutcome>,
}

impl RunReport {
    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.failed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.skipped()).count()
    }

    pub fn total_count(&self) -> usize {
        self.outcomes.len()
    }

    /// True iff every recorded outcome is a pass.
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed())
    }

    /// Failed outcomes only.
    pub fn failures(&self) -> Vec<&StepOutcome> {
        self.outcomes.iter().filter(|o| o.failed()).collect()
    }

    /// Outcomes grouped by engine, configuration order preserved.
    pub fn by_engine(&self) -> Vec<(String, Vec<&StepOutcome>)> {
        let mut groups: Vec<(String, Vec<&StepOutcome>)> = Vec::new();
        for outcome in &self.outcomes {
            match groups.iter_mut().find(|(engine, _)| *engine == outcome.engine) {
                Some((_, list)) => list.push(outcome),
                None => groups.push((outcome.engine.clone(), vec![outcome])),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(step: usize, engine: &str, outcome: Outcome) -> StepOutcome {
        StepOutcome {
            step,
            description: None,
            engine: engine.to_string(),
            method: Method::Get,
            endpoint: "_cat/indices".to_string(),
            attempts: 1,
            duration: Duration::from_millis(5),
            outcome,
        }
    }

    fn report(outcomes: Vec<StepOutcome>) -> RunReport {
        RunReport {
            scenario: "test.yaml".to_string(),
            started_at: Utc::now(),
            duration: Duration::from_secs(1),
            outcomes,
        }
    }

    #[test]
    fn test_counts_and_verdict() {
        let report = report(vec![
            outcome(0, "quickwit", Outcome::Passed),
            outcome(
                1,
                "quickwit",
                Outcome::Failed(StepFailure::Transport(TransportError::Connection(
                    "refused".to_string(),
                ))),
            ),
            outcome(
                2,
                "quickwit",
                Outcome::Skipped {
                    reason: "lane aborted after step 1".to_string(),
                },
            ),
        ]);

        assert_eq!(report.passed_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.total_count(), 3);
        assert!(!report.all_passed());
        assert_eq!(report.failures().len(), 1);
    }

    #[test]
    fn test_all_passed() {
        let report = report(vec![
            outcome(0, "quickwit", Outcome::Passed),
            outcome(0, "elasticsearch", Outcome::Passed),
        ]);
        assert!(report.all_passed());
    }

    #[test]
    fn test_skip_fails_the_run() {
        // A skipped execution means not every outcome is a pass.
        let report = report(vec![outcome(
            0,
            "quickwit",
            Outcome::Skipped {
                reason: "lane aborted".to_string(),
            },
        )]);
        assert!(!report.all_passed());
        assert_eq!(report.failed_count(), 0);
    }

    #[test]
    fn test_by_engine_grouping() {
        let report = report(vec![
            outcome(0, "quickwit", Outcome::Passed),
            outcome(0, "elasticsearch", Outcome::Passed),
            outcome(1, "quickwit", Outcome::Passed),
        ]);

        let groups = report.by_engine();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "quickwit");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "elasticsearch");
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn test_outcome_label() {
        let o = outcome(3, "quickwit", Outcome::Passed);
        assert_eq!(o.label(), "step 3 GET _cat/indices [quickwit]");
    }
}
