//! Gate decision engine.
//!
//! Turns the run's [`AssertionOutcome`]s into a [`GateVerdict`] and moves the
//! run from `running` to `passed` or `failed`. Only blocking outcomes decide;
//! advisory outcomes ride along in the verdict for reporting.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{AssertionOutcome, PipelineRun, Result, RunStatus, Severity};

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Pass/fail decision of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateDecision {
    Pass,
    Fail,
}

/// The verdict record for one run.
///
/// Holds every outcome, blocking and advisory, whichever way the gate went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub decision: GateDecision,
    /// All outcomes in assertion order.
    pub outcomes: Vec<AssertionOutcome>,
    /// Why the gate failed; one line per unsatisfied blocking outcome.
    pub reasons: Vec<String>,
    /// Unsatisfied advisory outcomes.
    pub warnings: Vec<String>,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.decision == GateDecision::Pass
    }

    pub fn blocking_failures(&self) -> impl Iterator<Item = &AssertionOutcome> {
        self.outcomes.iter().filter(|o| o.is_blocking_failure())
    }

    pub fn advisory_warnings(&self) -> impl Iterator<Item = &AssertionOutcome> {
        self.outcomes.iter().filter(|o| o.is_advisory_warning())
    }

    /// Summary line for logs and the run's failure reason.
    pub fn message(&self) -> String {
        match self.decision {
            GateDecision::Pass if self.warnings.is_empty() => {
                "all blocking assertions satisfied".to_string()
            }
            GateDecision::Pass => format!(
                "all blocking assertions satisfied ({} advisory warning(s))",
                self.warnings.len()
            ),
            GateDecision::Fail => format!(
                "gate failed with {} blocking violation(s): {}",
                self.reasons.len(),
                self.reasons.join("; ")
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Decide the gate from a set of outcomes.
///
/// Fails iff at least one blocking outcome is unsatisfied. An empty outcome
/// set passes.
pub fn decide(outcomes: Vec<AssertionOutcome>) -> GateVerdict {
    let mut reasons = Vec::new();
    let mut warnings = Vec::new();

    for outcome in &outcomes {
        if outcome.satisfied {
            continue;
        }
        match outcome.severity {
            Severity::Blocking => reasons.push(outcome.describe()),
            Severity::Advisory => warnings.push(outcome.describe()),
        }
    }

    let decision = if reasons.is_empty() {
        GateDecision::Pass
    } else {
        GateDecision::Fail
    };

    GateVerdict {
        decision,
        outcomes,
        reasons,
        warnings,
    }
}

/// Applies a verdict to a run.
pub struct GateDecisionEngine;

impl GateDecisionEngine {
    /// Decide the gate for a running run and move it to `passed` or `failed`.
    ///
    /// Returns `InvalidTransition` if the run is not `running`; the run is
    /// left untouched in that case.
    pub fn conclude(run: &mut PipelineRun, outcomes: Vec<AssertionOutcome>) -> Result<GateVerdict> {
        let verdict = decide(outcomes);
        match verdict.decision {
            GateDecision::Pass => run.transition(RunStatus::Passed)?,
            GateDecision::Fail => run.fail(verdict.message())?,
        }

        for warning in &verdict.warnings {
            warn!(run_id = %run.run_id(), warning = %warning, "advisory assertion failed");
        }
        info!(
            run_id = %run.run_id(),
            passed = verdict.passed(),
            blocking_failures = verdict.reasons.len(),
            advisory_warnings = verdict.warnings.len(),
            "gate decided"
        );

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, GateError};

    fn outcome(
        category: Category,
        severity: Severity,
        actual: Option<f64>,
        threshold: f64,
    ) -> AssertionOutcome {
        AssertionOutcome {
            category,
            severity,
            threshold,
            actual,
            satisfied: actual.map(|a| a >= threshold).unwrap_or(false),
            missing_metric: actual.is_none(),
        }
    }

    #[test]
    fn empty_outcomes_pass() {
        let v = decide(Vec::new());
        assert!(v.passed());
        assert!(v.reasons.is_empty());
    }

    #[test]
    fn blocking_failure_fails() {
        let v = decide(vec![outcome(Category::Performance, Severity::Blocking, Some(0.8), 0.9)]);
        assert_eq!(v.decision, GateDecision::Fail);
        assert_eq!(v.reasons.len(), 1);
        assert_eq!(v.blocking_failures().count(), 1);
        assert!(v.message().contains("performance"));
    }

    #[test]
    fn advisory_failure_never_fails() {
        let v = decide(vec![
            outcome(Category::Performance, Severity::Blocking, Some(0.95), 0.9),
            outcome(Category::Accessibility, Severity::Advisory, Some(0.7), 0.9),
        ]);
        assert!(v.passed());
        assert_eq!(v.warnings.len(), 1);
        assert_eq!(v.advisory_warnings().count(), 1);
        assert_eq!(v.outcomes.len(), 2);
    }

    #[test]
    fn flipping_advisory_scores_never_changes_decision() {
        let blocking_sets = [
            vec![outcome(Category::Performance, Severity::Blocking, Some(0.95), 0.9)],
            vec![outcome(Category::Performance, Severity::Blocking, Some(0.5), 0.9)],
            vec![outcome(Category::Seo, Severity::Blocking, None, 0.9)],
        ];
        for blocking in blocking_sets {
            let baseline = decide(blocking.clone()).decision;
            for advisory_score in [None, Some(0.0), Some(0.5), Some(1.0)] {
                let mut all = blocking.clone();
                all.push(outcome(Category::Accessibility, Severity::Advisory, advisory_score, 0.9));
                all.push(outcome(Category::BestPractices, Severity::Advisory, advisory_score, 0.1));
                assert_eq!(decide(all).decision, baseline);
            }
        }
    }

    #[test]
    fn conclude_moves_running_run() {
        let mut run = PipelineRun::new("abc");
        run.start().expect("start");
        let v = GateDecisionEngine::conclude(
            &mut run,
            vec![outcome(Category::Performance, Severity::Blocking, Some(0.8), 0.9)],
        )
        .expect("conclude");
        assert!(!v.passed());
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.failure_reason().unwrap_or_default().contains("performance"));
    }

    #[test]
    fn conclude_on_terminal_run_is_invalid_transition() {
        let mut run = PipelineRun::new("abc");
        run.start().expect("start");
        GateDecisionEngine::conclude(&mut run, Vec::new()).expect("first");
        let err = GateDecisionEngine::conclude(&mut run, Vec::new()).unwrap_err();
        assert!(matches!(err, GateError::InvalidTransition { .. }));
        assert_eq!(run.status(), RunStatus::Passed);
    }

    #[test]
    fn conclude_on_pending_run_is_invalid_transition() {
        let mut run = PipelineRun::new("abc");
        let err = GateDecisionEngine::conclude(&mut run, Vec::new()).unwrap_err();
        assert!(matches!(err, GateError::InvalidTransition { .. }));
        assert_eq!(run.status(), RunStatus::Pending);
    }
}
