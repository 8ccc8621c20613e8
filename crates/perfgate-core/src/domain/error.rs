//! Error taxonomy for the gating pipeline.

use perfgate_state::StorageError;

use super::category::Category;
use super::run::RunStatus;

/// perfgate domain errors.
///
/// Stage failures (`Build`, `Measurement`, `MissingSamples`, `StageTimeout`,
/// `Aborted`) move a run to `errored`. `Publish` is recorded as a deploy
/// failure and leaves the gate result untouched. `InvalidTransition` is an
/// ordering defect and always propagates to the caller.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("build failed: {0}")]
    Build(String),

    #[error("measurement of {category} (pass {pass}) failed: {reason}")]
    Measurement {
        category: Category,
        pass: u32,
        reason: String,
    },

    #[error("missing samples for {category}: expected {expected}, recorded {recorded}")]
    MissingSamples {
        category: Category,
        expected: u32,
        recorded: u32,
    },

    #[error("invalid score {score} for {category}: must be within [0, 1]")]
    InvalidScore { category: Category, score: f64 },

    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error("invalid run transition: {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("{stage} stage timed out after {limit_ms}ms")]
    StageTimeout { stage: String, limit_ms: u64 },

    #[error("run aborted")]
    Aborted,

    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    /// Whether a caller may retry the revision with a fresh run.
    ///
    /// Quality failures never reach here; they are verdicts, not errors.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GateError::StageTimeout { .. } | GateError::Measurement { .. }
        )
    }
}

/// Result type for perfgate domain operations.
pub type Result<T> = std::result::Result<T, GateError>;
