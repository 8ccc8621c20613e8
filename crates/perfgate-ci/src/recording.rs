//! Stage-log adapter: writes pipeline stage events into a [`RunLedger`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use perfgate_state::{RunEvent, RunId, RunLedger, RunMetadata, RunSummary, StorageResult};
use serde_json::Value;
use tracing::debug;

/// Records one run's stage events with a strictly increasing `seq`.
///
/// Usage:
/// 1. [`RunRecorder::start`] registers the run under the pipeline's run id.
/// 2. [`RunRecorder::record`] once per stage transition.
/// 3. [`RunRecorder::finish_ok`] or [`RunRecorder::finish_err`] closes it.
pub struct RunRecorder {
    ledger: Arc<dyn RunLedger>,
    run_id: RunId,
    seq: AtomicU64,
}

impl RunRecorder {
    pub async fn start(
        ledger: Arc<dyn RunLedger>,
        run_id: RunId,
        metadata: RunMetadata,
    ) -> StorageResult<Self> {
        ledger.create_run(&run_id, metadata).await?;
        Ok(Self {
            ledger,
            run_id,
            seq: AtomicU64::new(0),
        })
    }

    pub async fn record(&self, kind: &str, payload: Value) -> StorageResult<()> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(run_id = %self.run_id, kind = %kind, seq = seq, "stage event recorded");
        let event = RunEvent {
            seq,
            kind: kind.to_string(),
            payload,
            timestamp: Utc::now(),
        };
        self.ledger.append_event(&self.run_id, event).await
    }

    /// Events recorded so far.
    pub fn total_events(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    pub async fn finish_ok(self, summary: RunSummary) -> StorageResult<()> {
        self.ledger.complete_run(&self.run_id, summary).await
    }

    pub async fn finish_err(self, summary: RunSummary) -> StorageResult<()> {
        self.ledger.fail_run(&self.run_id, summary).await
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfgate_state::memory::MemoryRunLedger;
    use serde_json::json;

    #[tokio::test]
    async fn test_recorder_numbers_events_from_one() {
        let ledger = Arc::new(MemoryRunLedger::new());
        let run_id = RunId::new();
        let recorder = RunRecorder::start(
            ledger.clone(),
            run_id.clone(),
            RunMetadata {
                revision: "abc".to_string(),
                target_name: "production".to_string(),
                tags: json!({}),
            },
        )
        .await
        .expect("start");

        recorder.record("build_completed", json!({})).await.expect("record");
        recorder.record("audit_completed", json!({})).await.expect("record");
        assert_eq!(recorder.total_events(), 2);
        recorder
            .finish_ok(RunSummary {
                total_events: 2,
                duration_ms: 1,
                final_status: "passed".to_string(),
                success: true,
            })
            .await
            .expect("finish");

        let events = ledger.get_events(&run_id).await.expect("events");
        assert_eq!(events.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);
        let record = ledger.get_run(&run_id).await.expect("run");
        assert_eq!(record.status, perfgate_state::RunStatus::Completed);
    }
}
