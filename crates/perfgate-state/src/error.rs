//! Error types for perfgate-state

use thiserror::Error;

/// Errors raised by the handoff store and the run ledger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No artifact was ever stored for this run.
    #[error("artifact not found for run {run_id}")]
    NotFound { run_id: String },

    /// The artifact existed but its retention window has closed.
    #[error("artifact for run {run_id} expired")]
    Expired { run_id: String },

    /// The artifact was already handed to a consumer.
    #[error("artifact for run {run_id} was already consumed")]
    AlreadyConsumed { run_id: String },

    /// A second store for the same run.
    #[error("artifact already stored for run {run_id}")]
    AlreadyStored { run_id: String },

    /// Ledger has no record of this run.
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// Ledger already holds a run with this id.
    #[error("run already exists: {run_id}")]
    RunExists { run_id: String },

    /// Ledger operation not allowed in the run's current status.
    #[error("run {run_id} is {status}, expected {expected}")]
    InvalidRunState {
        run_id: String,
        status: String,
        expected: String,
    },

    /// Events must arrive with strictly increasing sequence numbers.
    #[error("event seq {seq} for run {run_id} is not after {last}")]
    OutOfOrderEvent { run_id: String, seq: u64, last: u64 },

    /// A digest string that is not 64 hex characters.
    #[error("invalid digest: {digest}")]
    InvalidDigest { digest: String },
}
