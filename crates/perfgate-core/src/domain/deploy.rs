//! What happened after the gate.

use serde::{Deserialize, Serialize};

use super::run::RunStatus;

/// Result of the deploy stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeployOutcome {
    /// The run never reached a passing gate.
    NotAttempted,
    /// The gate passed but deploy was not started (e.g. the run was aborted).
    Skipped { reason: String },
    /// The publisher accepted the artifact.
    Succeeded { deployment_id: String },
    /// The publisher was invoked and failed.
    Failed { error: String },
}

impl DeployOutcome {
    pub fn deployment_id(&self) -> Option<&str> {
        match self {
            DeployOutcome::Succeeded { deployment_id } => Some(deployment_id),
            _ => None,
        }
    }

    /// Whether the publisher was actually called.
    pub fn was_invoked(&self) -> bool {
        matches!(
            self,
            DeployOutcome::Succeeded { .. } | DeployOutcome::Failed { .. }
        )
    }
}

/// Overall result of a run, combining gate status and deploy outcome.
///
/// Keeps "the gate rejected this revision" apart from "the gate approved it
/// but publishing failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    Deployed,
    GateRejected,
    DeployFailed,
    Aborted,
    Errored,
}

impl PipelineOutcome {
    /// Derive the outcome; `None` while the run is not terminal.
    pub fn classify(status: RunStatus, deploy: &DeployOutcome) -> Option<Self> {
        match status {
            RunStatus::Pending | RunStatus::Running => None,
            RunStatus::Failed => Some(PipelineOutcome::GateRejected),
            RunStatus::Errored => Some(PipelineOutcome::Errored),
            RunStatus::Passed => Some(match deploy {
                DeployOutcome::Succeeded { .. } => PipelineOutcome::Deployed,
                DeployOutcome::Failed { .. } => PipelineOutcome::DeployFailed,
                DeployOutcome::Skipped { .. } | DeployOutcome::NotAttempted => {
                    PipelineOutcome::Aborted
                }
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineOutcome::Deployed => "deployed",
            PipelineOutcome::GateRejected => "gate_rejected",
            PipelineOutcome::DeployFailed => "deploy_failed",
            PipelineOutcome::Aborted => "aborted",
            PipelineOutcome::Errored => "errored",
        }
    }
}
