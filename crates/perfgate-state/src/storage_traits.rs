//! Storage trait definitions for perfgate
//!
//! These traits define the storage abstractions a pipeline run depends on:
//! - `ArtifactHandoff`: build output references keyed by run id
//! - `RunLedger`: stage event log and final summary per run
//!
//! All traits are async and backend-agnostic. In-memory implementations are
//! provided in the `memory` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes`, `Hasher` or validated via
/// `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Wrap a finished hasher.
    pub fn from_hasher(hasher: Sha256) -> Self {
        use sha2::Digest;
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random RunId
    pub fn new() -> Self {
        RunId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ArtifactHandoff - build output transfer between stages
// ---------------------------------------------------------------------------

/// Opaque handle to a build output: what it is (digest) and where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// SHA-256 of the artifact content.
    pub digest: ContentDigest,
    /// Storage location understood by the publisher (path, URI, ...).
    pub location: String,
}

impl ArtifactRef {
    pub fn new(digest: ContentDigest, location: impl Into<String>) -> Self {
        Self {
            digest,
            location: location.into(),
        }
    }
}

/// Per-run artifact handoff.
///
/// Guarantees:
/// - At most one artifact per run; a second `store` fails with `AlreadyStored`.
/// - `retrieve` hands the ref out once; later calls fail with `AlreadyConsumed`.
/// - Once a run is sealed, the ref stays retrievable for the grace period and
///   then fails with `Expired`. A run id that never stored anything fails
///   with `NotFound`.
/// - Storage is bounded: an expired id is forgotten one grace period after
///   the purge that dropped it, after which lookups report `NotFound`.
/// - Runs never see each other's artifacts.
///
/// The store knows nothing about gating. Callers decide when `retrieve` is
/// allowed.
#[async_trait]
pub trait ArtifactHandoff: Send + Sync {
    /// Store the artifact for `run_id` and return the ref the consumer will get.
    async fn store(&self, run_id: &RunId, artifact: ArtifactRef) -> StorageResult<ArtifactRef>;

    /// Hand out the artifact stored for `run_id`.
    async fn retrieve(&self, run_id: &RunId) -> StorageResult<ArtifactRef>;

    /// Mark the run terminal; starts the grace clock. No-op for unknown runs.
    async fn seal(&self, run_id: &RunId) -> StorageResult<()>;

    /// Drop artifacts whose grace period has passed and forget ids expired
    /// for longer than that. Returns how many artifacts were dropped.
    async fn purge_expired(&self) -> StorageResult<usize>;
}

// ---------------------------------------------------------------------------
// RunLedger - stage event log
// ---------------------------------------------------------------------------

/// Metadata attached to a run at creation time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetadata {
    /// Source revision being gated
    pub revision: String,
    /// Deploy target the run would publish to
    pub target_name: String,
    /// Arbitrary key-value tags
    pub tags: serde_json::Value,
}

/// A single event in a run's stage log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEvent {
    /// Monotonic sequence number within the run
    pub seq: u64,
    /// Event kind (e.g. "build_completed", "pass_measured", "gate_evaluated")
    pub kind: String,
    /// Event payload
    pub payload: serde_json::Value,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

/// Summary produced when a run finishes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// Total events recorded
    pub total_events: u64,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Final pipeline status ("passed", "failed", "errored")
    pub final_status: String,
    /// Whether the run ended deployed
    pub success: bool,
}

/// Ledger-side status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Full run record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub metadata: RunMetadata,
    pub status: RunStatus,
    pub summary: Option<RunSummary>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Run ledger.
///
/// Guarantees:
/// - Events are ordered by strictly increasing `seq` within a run.
/// - A run transitions: Running → Completed | Failed (terminal).
/// - Finished runs accept no more events.
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Register a run under a caller-chosen id.
    async fn create_run(&self, run_id: &RunId, metadata: RunMetadata) -> StorageResult<()>;

    /// Append an event to an active run.
    async fn append_event(&self, run_id: &RunId, event: RunEvent) -> StorageResult<()>;

    /// Mark a run as completed with a summary.
    async fn complete_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()>;

    /// Mark a run as failed with a summary.
    async fn fail_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()>;

    /// Retrieve a run record by ID.
    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord>;

    /// Retrieve all events for a run, ordered by seq.
    async fn get_events(&self, run_id: &RunId) -> StorageResult<Vec<RunEvent>>;

    /// List runs, optionally filtered by revision.
    async fn list_runs(&self, revision: Option<&str>) -> StorageResult<Vec<RunRecord>>;
}
