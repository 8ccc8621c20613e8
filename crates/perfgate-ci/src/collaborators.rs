//! External collaborators the pipeline drives.
//!
//! The pipeline owns ordering, timeouts and cancellation; collaborators only
//! do the work. Implementations must be shareable across concurrent runs.

use async_trait::async_trait;
use perfgate_core::{Category, MetricSample};
use perfgate_state::ArtifactRef;
use serde::{Deserialize, Serialize};

/// Failure reported by a collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{stage} command is empty")]
    EmptyCommand { stage: String },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with code {code}: {stderr}")]
    NonZeroExit {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("unexpected output: {0}")]
    InvalidOutput(String),

    /// The collaborator could not be reached or refused the request.
    #[error("{0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the publisher returns for an accepted deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResult {
    pub deployment_id: String,
}

/// Produces a deployable artifact for a revision.
#[async_trait]
pub trait Builder: Send + Sync {
    async fn build(&self, revision: &str) -> Result<ArtifactRef, CollaboratorError>;
}

/// Scores one category of a built artifact.
///
/// Called N times per category per run. `pass` is 1-based and must be echoed
/// back in the returned sample.
#[async_trait]
pub trait MeasurementEngine: Send + Sync {
    async fn measure(
        &self,
        artifact: &ArtifactRef,
        category: &Category,
        pass: u32,
    ) -> Result<MetricSample, CollaboratorError>;
}

/// Publishes an artifact to a hosting target.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        artifact: &ArtifactRef,
        target: &str,
    ) -> Result<DeployResult, CollaboratorError>;
}
