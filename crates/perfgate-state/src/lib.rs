//! perfgate-state: storage layer for the gating pipeline
//!
//! Holds everything a run persists while it is alive:
//!
//! - `ArtifactHandoff`: build output references keyed by run, handed to the
//!   deploy stage exactly once and expired after a grace period
//! - `RunLedger`: append-only stage event log plus the final run summary
//!
//! In-memory implementations live in [`memory`]; the reference pipeline keeps
//! artifacts only for the lifetime of one orchestrator process.

mod error;
pub mod memory;
pub mod storage_traits;

pub use error::StorageError;
pub use memory::{MemoryArtifactHandoff, MemoryRunLedger};
pub use storage_traits::{
    ArtifactHandoff, ArtifactRef, ContentDigest, RunEvent, RunId, RunLedger, RunMetadata,
    RunRecord, RunStatus, RunSummary, StorageResult,
};
