//! In-memory implementations of the storage traits.
//!
//! `MemoryArtifactHandoff` is the reference handoff: artifacts live only as
//! long as the orchestrator process. `MemoryRunLedger` keeps the stage log in
//! a `HashMap`. Both are safe to share across concurrent runs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::*;

/// Lock, recovering from poisoning. Each critical section is one map update.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// MemoryArtifactHandoff
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Slot {
    /// Stored, not yet handed out.
    Ready(ArtifactRef),
    /// Handed out; only the id is kept.
    Consumed,
    /// Dropped by a purge after its grace period.
    Expired,
}

#[derive(Debug)]
struct HandoffEntry {
    slot: Slot,
    /// Start of the current retention window. For `Expired` entries this is
    /// the purge that dropped the artifact.
    sealed_at: Option<Instant>,
}

/// In-memory artifact handoff keyed by `RunId`.
///
/// A run's entry goes `Ready → Consumed` on retrieve, then `Expired` once its
/// grace period has passed and a purge ran. Expired ids are remembered for one
/// more grace period so late lookups report `Expired`; the purge after that
/// forgets them.
#[derive(Debug)]
pub struct MemoryArtifactHandoff {
    grace: Duration,
    entries: Mutex<HashMap<RunId, HandoffEntry>>,
}

impl MemoryArtifactHandoff {
    /// Create a store whose sealed artifacts stay retrievable for `grace`.
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Run ids currently tracked, tombstones included.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn window_passed(&self, entry: &HandoffEntry, now: Instant) -> bool {
        entry
            .sealed_at
            .map(|sealed| now.duration_since(sealed) >= self.grace)
            .unwrap_or(false)
    }
}

#[async_trait]
impl ArtifactHandoff for MemoryArtifactHandoff {
    async fn store(&self, run_id: &RunId, artifact: ArtifactRef) -> StorageResult<ArtifactRef> {
        let mut entries = lock(&self.entries);
        if entries.contains_key(run_id) {
            return Err(StorageError::AlreadyStored {
                run_id: run_id.0.clone(),
            });
        }
        entries.insert(
            run_id.clone(),
            HandoffEntry {
                slot: Slot::Ready(artifact.clone()),
                sealed_at: None,
            },
        );
        debug!(run_id = %run_id, digest = %artifact.digest.short(), "artifact stored");
        Ok(artifact)
    }

    async fn retrieve(&self, run_id: &RunId) -> StorageResult<ArtifactRef> {
        let now = Instant::now();
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get_mut(run_id) else {
            return Err(StorageError::NotFound {
                run_id: run_id.0.clone(),
            });
        };
        if matches!(entry.slot, Slot::Expired) || self.window_passed(entry, now) {
            return Err(StorageError::Expired {
                run_id: run_id.0.clone(),
            });
        }
        match std::mem::replace(&mut entry.slot, Slot::Consumed) {
            Slot::Ready(artifact) => Ok(artifact),
            _ => Err(StorageError::AlreadyConsumed {
                run_id: run_id.0.clone(),
            }),
        }
    }

    async fn seal(&self, run_id: &RunId) -> StorageResult<()> {
        let now = Instant::now();
        let mut entries = lock(&self.entries);
        if let Some(entry) = entries.get_mut(run_id) {
            // First seal wins; the grace window never restarts.
            entry.sealed_at.get_or_insert(now);
        }
        Ok(())
    }

    async fn purge_expired(&self) -> StorageResult<usize> {
        let now = Instant::now();
        let mut entries = lock(&self.entries);
        let mut dropped = 0;
        let mut forgotten = 0;
        entries.retain(|_, entry| {
            if !self.window_passed(entry, now) {
                return true;
            }
            if matches!(entry.slot, Slot::Expired) {
                forgotten += 1;
                return false;
            }
            if matches!(entry.slot, Slot::Ready(_)) {
                dropped += 1;
            }
            entry.slot = Slot::Expired;
            entry.sealed_at = Some(now);
            true
        });
        if dropped + forgotten > 0 {
            debug!(dropped, forgotten, "purged expired artifacts");
        }
        Ok(dropped)
    }
}

// ---------------------------------------------------------------------------
// MemoryRunLedger
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RunState {
    record: RunRecord,
    events: Vec<RunEvent>,
}

impl RunState {
    fn ensure_running(&self) -> StorageResult<()> {
        if self.record.status != RunStatus::Running {
            return Err(StorageError::InvalidRunState {
                run_id: self.record.run_id.0.clone(),
                status: format!("{:?}", self.record.status),
                expected: "Running".to_string(),
            });
        }
        Ok(())
    }
}

/// In-memory run ledger backed by a `HashMap<RunId, RunState>`.
#[derive(Debug, Default)]
pub struct MemoryRunLedger {
    runs: Mutex<HashMap<String, RunState>>,
}

impl MemoryRunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn finish(&self, run_id: &RunId, summary: RunSummary, status: RunStatus) -> StorageResult<()> {
        let mut runs = lock(&self.runs);
        let state = runs
            .get_mut(&run_id.0)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?;
        state.ensure_running()?;
        state.record.status = status;
        state.record.summary = Some(summary);
        state.record.completed_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl RunLedger for MemoryRunLedger {
    async fn create_run(&self, run_id: &RunId, metadata: RunMetadata) -> StorageResult<()> {
        let mut runs = lock(&self.runs);
        if runs.contains_key(&run_id.0) {
            return Err(StorageError::RunExists {
                run_id: run_id.0.clone(),
            });
        }
        let record = RunRecord {
            run_id: run_id.clone(),
            metadata,
            status: RunStatus::Running,
            summary: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        runs.insert(
            run_id.0.clone(),
            RunState {
                record,
                events: Vec::new(),
            },
        );
        Ok(())
    }

    async fn append_event(&self, run_id: &RunId, event: RunEvent) -> StorageResult<()> {
        let mut runs = lock(&self.runs);
        let state = runs
            .get_mut(&run_id.0)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?;
        state.ensure_running()?;
        if let Some(last) = state.events.last() {
            if event.seq <= last.seq {
                return Err(StorageError::OutOfOrderEvent {
                    run_id: run_id.0.clone(),
                    seq: event.seq,
                    last: last.seq,
                });
            }
        }
        state.events.push(event);
        Ok(())
    }

    async fn complete_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()> {
        self.finish(run_id, summary, RunStatus::Completed)
    }

    async fn fail_run(&self, run_id: &RunId, summary: RunSummary) -> StorageResult<()> {
        self.finish(run_id, summary, RunStatus::Failed)
    }

    async fn get_run(&self, run_id: &RunId) -> StorageResult<RunRecord> {
        let runs = lock(&self.runs);
        runs.get(&run_id.0)
            .map(|s| s.record.clone())
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })
    }

    async fn get_events(&self, run_id: &RunId) -> StorageResult<Vec<RunEvent>> {
        let runs = lock(&self.runs);
        let state = runs
            .get(&run_id.0)
            .ok_or_else(|| StorageError::RunNotFound {
                run_id: run_id.0.clone(),
            })?;
        Ok(state.events.clone())
    }

    async fn list_runs(&self, revision: Option<&str>) -> StorageResult<Vec<RunRecord>> {
        let runs = lock(&self.runs);
        let mut records: Vec<RunRecord> = runs
            .values()
            .filter(|s| revision.map(|r| s.record.metadata.revision == r).unwrap_or(true))
            .map(|s| s.record.clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}
