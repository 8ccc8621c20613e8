//! Pipeline runs and the run status state machine.

use chrono::{DateTime, Utc};
use perfgate_state::RunId;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{GateError, Result};

/// Status of a pipeline run.
///
/// `pending → running → {passed | failed | errored}`. A pending run may also
/// go straight to `errored` when it is aborted before starting. The three
/// right-hand states are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Errored,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Errored => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Passed | RunStatus::Failed | RunStatus::Errored
        )
    }

    /// Whether `self → next` is a legal edge.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Running)
                | (RunStatus::Pending, RunStatus::Errored)
                | (RunStatus::Running, RunStatus::Passed)
                | (RunStatus::Running, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Errored)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of the pipeline for a single source revision.
///
/// Fields are read-only outside this module; every status change goes through
/// [`PipelineRun::transition`], so a terminal run can no longer be mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineRun {
    run_id: RunId,
    revision: String,
    status: RunStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
}

impl PipelineRun {
    /// Create a pending run with a fresh id.
    pub fn new(revision: impl Into<String>) -> Self {
        Self::with_id(RunId::new(), revision)
    }

    /// Create a pending run with a caller-chosen id.
    pub fn with_id(run_id: RunId, revision: impl Into<String>) -> Self {
        Self {
            run_id,
            revision: revision.into(),
            status: RunStatus::Pending,
            started_at: None,
            finished_at: None,
            failure_reason: None,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Why the run ended `failed` or `errored`.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status change, stamping start/finish times.
    pub fn transition(&mut self, next: RunStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(GateError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        if next == RunStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    /// `pending → running`.
    pub fn start(&mut self) -> Result<()> {
        self.transition(RunStatus::Running)
    }

    /// `running → failed` with the gate's reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(RunStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// `→ errored` after an upstream stage failure.
    pub fn error(&mut self, cause: &GateError) -> Result<()> {
        self.transition(RunStatus::Errored)?;
        self.failure_reason = Some(cause.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_is_pending() {
        let run = PipelineRun::new("abc123");
        assert_eq!(run.status(), RunStatus::Pending);
        assert_eq!(run.revision(), "abc123");
        assert!(run.started_at().is_none());
        assert!(run.finished_at().is_none());
    }

    #[test]
    fn test_happy_path_stamps_times() {
        let mut run = PipelineRun::new("abc123");
        run.start().expect("start");
        assert!(run.started_at().is_some());
        run.transition(RunStatus::Passed).expect("pass");
        assert!(run.finished_at().is_some());
        assert!(run.is_terminal());
        assert!(run.failure_reason().is_none());
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        for terminal in [RunStatus::Passed, RunStatus::Failed, RunStatus::Errored] {
            let mut run = PipelineRun::new("abc");
            run.start().expect("start");
            run.transition(terminal).expect("terminal");
            for next in [
                RunStatus::Pending,
                RunStatus::Running,
                RunStatus::Passed,
                RunStatus::Failed,
                RunStatus::Errored,
            ] {
                let err = run.transition(next).unwrap_err();
                assert!(matches!(err, GateError::InvalidTransition { .. }));
            }
            assert_eq!(run.status(), terminal);
        }
    }

    #[test]
    fn test_pending_cannot_skip_to_gate_result() {
        let mut run = PipelineRun::new("abc");
        assert!(run.transition(RunStatus::Passed).is_err());
        assert!(run.transition(RunStatus::Failed).is_err());
        assert_eq!(run.status(), RunStatus::Pending);
    }

    #[test]
    fn test_error_records_cause() {
        let mut run = PipelineRun::new("abc");
        run.start().expect("start");
        run.error(&GateError::Build("exit 1".to_string()))
            .expect("error");
        assert_eq!(run.status(), RunStatus::Errored);
        assert!(run.failure_reason().unwrap_or_default().contains("exit 1"));
    }

    #[test]
    fn test_pending_can_error_when_aborted() {
        let mut run = PipelineRun::new("abc");
        run.error(&GateError::Aborted).expect("error from pending");
        assert_eq!(run.status(), RunStatus::Errored);
        assert!(run.started_at().is_none());
    }

    #[test]
    fn test_status_serde_lowercase() {
        let json = serde_json::to_string(&RunStatus::Errored).expect("serialize");
        assert_eq!(json, "\"errored\"");
    }
}
