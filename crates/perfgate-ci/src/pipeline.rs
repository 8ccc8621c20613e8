//! Gate pipeline orchestration.
//!
//! One call to [`GatePipeline::run`] drives a single revision through
//! build → audit → evaluate → gate → deploy, strictly in that order. Build,
//! each measurement pass and deploy are bounded by their stage timeout. The
//! audit dispatches all N passes per category concurrently and waits for
//! every one of them before aggregation starts.
//!
//! Deploy is invoked only for a run whose gate passed. An abort signalled at
//! any point before deploy starts turns into `errored` (or `Skipped` if the
//! gate already passed); a deploy already in flight runs to completion.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use perfgate_core::obs;
use perfgate_core::{
    aggregate_run, evaluate_assertions, AggregatedMetric, AssertionOutcome, Category,
    DeployOutcome, GateDecisionEngine, GateError, GateVerdict, MetricSample, PipelineConfig,
    PipelineOutcome, PipelineRun, ReportSink, Result, RunReport, RunStatus, METRICS,
};
use perfgate_state::{
    ArtifactHandoff, ArtifactRef, MemoryArtifactHandoff, MemoryRunLedger, RunId, RunLedger,
    RunMetadata, RunSummary,
};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn, Instrument};

use crate::collaborators::{Builder, MeasurementEngine, Publisher};
use crate::recording::RunRecorder;
use crate::stage::StageKind;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Sender side of a run's abort flag.
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Create a handle and the signal to pass into [`GatePipeline::run_with_abort`].
    pub fn new() -> (Self, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, AbortSignal { rx })
    }

    /// Ask the run to stop. Idempotent.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiver side of a run's abort flag.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the run is aborted. Pends forever if the handle is
    /// dropped without aborting.
    pub async fn aborted(&mut self) {
        if self.rx.wait_for(|aborted| *aborted).await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// The run in its terminal state.
    pub run: PipelineRun,

    /// Build output, if the build succeeded.
    pub artifact: Option<ArtifactRef>,

    /// Per-category medians; empty unless the audit completed.
    pub metrics: BTreeMap<Category, AggregatedMetric>,

    /// Gate verdict; `None` if the run errored before the gate.
    pub verdict: Option<GateVerdict>,

    pub deploy: DeployOutcome,

    /// Stage error that moved the run to `errored`.
    pub error: Option<String>,

    /// Whether `error` is worth retrying with a fresh run.
    pub transient: bool,

    /// The run was stopped by its abort handle.
    pub aborted: bool,

    /// Where the report sink put the run report.
    pub report_url: Option<String>,

    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn run_id(&self) -> &RunId {
        self.run.run_id()
    }

    pub fn status(&self) -> RunStatus {
        self.run.status()
    }

    pub fn outcomes(&self) -> &[AssertionOutcome] {
        self.verdict
            .as_ref()
            .map(|v| v.outcomes.as_slice())
            .unwrap_or(&[])
    }

    pub fn outcome(&self) -> PipelineOutcome {
        if self.aborted {
            return PipelineOutcome::Aborted;
        }
        PipelineOutcome::classify(self.run.status(), &self.deploy)
            .unwrap_or(PipelineOutcome::Errored)
    }

    pub fn deployed(&self) -> bool {
        self.outcome() == PipelineOutcome::Deployed
    }

    /// Errored on a transient cause; a caller may retry the revision with a
    /// new run. Gate rejections are never retryable.
    pub fn is_retryable(&self) -> bool {
        self.run.status() == RunStatus::Errored && self.transient && !self.aborted
    }

    pub fn report(&self) -> RunReport {
        RunReport::from_run(
            &self.run,
            self.artifact.as_ref(),
            &self.metrics,
            self.verdict.as_ref(),
            &self.deploy,
        )
    }
}

/// How a run ended, short of the data in [`RunProgress`].
struct Settled {
    error: Option<String>,
    transient: bool,
    aborted: bool,
    deploy: DeployOutcome,
}

/// State accumulated while a run moves through its stages.
struct RunProgress {
    artifact: Option<ArtifactRef>,
    metrics: BTreeMap<Category, AggregatedMetric>,
    verdict: Option<GateVerdict>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Performance-gated deployment pipeline.
///
/// Holds shared, immutable configuration and collaborators; each call to
/// [`run`](Self::run) is an independent run with its own id, so a single
/// pipeline can serve concurrent runs.
pub struct GatePipeline {
    config: Arc<PipelineConfig>,
    builder: Arc<dyn Builder>,
    engine: Arc<dyn MeasurementEngine>,
    publisher: Arc<dyn Publisher>,
    handoff: Arc<dyn ArtifactHandoff>,
    ledger: Arc<dyn RunLedger>,
    sink: Option<Arc<dyn ReportSink>>,
}

impl GatePipeline {
    /// Pipeline with in-memory handoff and ledger.
    pub fn new(
        config: Arc<PipelineConfig>,
        builder: Arc<dyn Builder>,
        engine: Arc<dyn MeasurementEngine>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let handoff = Arc::new(MemoryArtifactHandoff::new(config.artifact_grace()));
        Self {
            config,
            builder,
            engine,
            publisher,
            handoff,
            ledger: Arc::new(MemoryRunLedger::new()),
            sink: None,
        }
    }

    pub fn with_handoff(mut self, handoff: Arc<dyn ArtifactHandoff>) -> Self {
        self.handoff = handoff;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn RunLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn RunLedger> {
        &self.ledger
    }

    pub fn handoff(&self) -> &Arc<dyn ArtifactHandoff> {
        &self.handoff
    }

    /// Run one revision to a terminal state.
    pub async fn run(&self, revision: &str) -> Result<PipelineResult> {
        self.run_with_abort(revision, AbortSignal::never()).await
    }

    /// Run one revision, stopping early if `abort` fires.
    ///
    /// Stage failures end up in the returned result as an `errored` run.
    /// `Err` is reserved for defects (illegal state transitions) and ledger
    /// or storage failures; the run is still sealed and closed in the ledger
    /// before the error is returned.
    pub async fn run_with_abort(
        &self,
        revision: &str,
        abort: AbortSignal,
    ) -> Result<PipelineResult> {
        let run = PipelineRun::new(revision);
        let span = obs::run_span(run.run_id().as_str(), revision);
        self.execute(run, abort).instrument(span).await
    }

    async fn execute(&self, mut run: PipelineRun, abort: AbortSignal) -> Result<PipelineResult> {
        let started = Instant::now();
        let run_id = run.run_id().clone();

        let recorder = RunRecorder::start(
            Arc::clone(&self.ledger),
            run_id.clone(),
            RunMetadata {
                revision: run.revision().to_string(),
                target_name: self.config.target_name.clone(),
                tags: json!({
                    "passes": self.config.number_of_passes,
                    "categories": self.config.measured_categories(),
                }),
            },
        )
        .await?;
        METRICS.inc_runs_started();
        obs::emit_run_started(run_id.as_str(), run.revision(), self.config.number_of_passes);

        let mut progress = RunProgress {
            artifact: None,
            metrics: BTreeMap::new(),
            verdict: None,
        };

        let settled = self.settle(&mut run, &recorder, &abort, &mut progress).await;

        // Deploy is done with the artifact: start its grace clock on every
        // exit path and reclaim what earlier runs left behind.
        let released = self.release_artifact(&run_id).await;
        let settled = match settled.and_then(|s| released.map(|()| s)) {
            Ok(settled) => settled,
            Err(err) => return Err(self.abandon(recorder, &run, started, err).await),
        };

        let aborted = settled.aborted || matches!(settled.deploy, DeployOutcome::Skipped { .. });
        let mut result = PipelineResult {
            run,
            artifact: progress.artifact,
            metrics: progress.metrics,
            verdict: progress.verdict,
            deploy: settled.deploy,
            error: settled.error,
            transient: settled.transient,
            aborted,
            report_url: None,
            duration_ms: 0,
        };

        result.report_url = self.publish_report(&result);
        result.duration_ms = elapsed_ms(started);

        let outcome = result.outcome();
        let summary = RunSummary {
            total_events: recorder.total_events(),
            duration_ms: result.duration_ms,
            final_status: result.status().as_str().to_string(),
            success: outcome == PipelineOutcome::Deployed,
        };
        if summary.success {
            recorder.finish_ok(summary).await?;
        } else {
            recorder.finish_err(summary).await?;
        }

        obs::emit_run_finished(
            run_id.as_str(),
            result.status().as_str(),
            outcome.as_str(),
            result.duration_ms,
        );
        Ok(result)
    }

    /// Drive the run to a terminal state and through deploy.
    ///
    /// Stage failures before the gate become an `errored` run. `Err` means
    /// the run cannot be reported normally: an illegal transition, or a
    /// ledger or storage failure after the run was already terminal.
    async fn settle(
        &self,
        run: &mut PipelineRun,
        recorder: &RunRecorder,
        abort: &AbortSignal,
        progress: &mut RunProgress,
    ) -> Result<Settled> {
        let stage_result = if abort.is_aborted() {
            Err(GateError::Aborted)
        } else {
            run.start()?;
            self.gate_stages(run, recorder, abort, progress).await
        };

        let (error, transient, aborted) = match stage_result {
            Ok(()) => (None, false, false),
            Err(err) if run.is_terminal() || matches!(err, GateError::InvalidTransition { .. }) => {
                return Err(err)
            }
            Err(err) => {
                run.error(&err)?;
                let transient = err.is_transient();
                let aborted = matches!(err, GateError::Aborted);
                METRICS.inc_runs_errored();
                obs::emit_run_errored(run.run_id().as_str(), &err, transient);
                recorder
                    .record(
                        "run_errored",
                        json!({ "error": err.to_string(), "transient": transient }),
                    )
                    .await?;
                (Some(err.to_string()), transient, aborted)
            }
        };

        let deploy = if run.status() == RunStatus::Passed {
            self.deploy_stage(run, recorder, abort).await?
        } else {
            DeployOutcome::NotAttempted
        };

        Ok(Settled {
            error,
            transient,
            aborted,
            deploy,
        })
    }

    /// Seal the run's artifact and purge expired handoff entries.
    async fn release_artifact(&self, run_id: &RunId) -> Result<()> {
        self.handoff.seal(run_id).await?;
        let dropped = self.handoff.purge_expired().await?;
        if dropped > 0 {
            debug!(run_id = %run_id, dropped, "expired artifacts purged");
        }
        Ok(())
    }

    /// Close the ledger entry of a run that ends in `Err`, then hand the
    /// error back unchanged.
    async fn abandon(
        &self,
        recorder: RunRecorder,
        run: &PipelineRun,
        started: Instant,
        err: GateError,
    ) -> GateError {
        METRICS.inc_runs_errored();
        obs::emit_run_errored(run.run_id().as_str(), &err, false);
        let summary = RunSummary {
            total_events: recorder.total_events(),
            duration_ms: elapsed_ms(started),
            final_status: run.status().as_str().to_string(),
            success: false,
        };
        if let Err(close_err) = recorder.finish_err(summary).await {
            warn!(
                run_id = %run.run_id(),
                error = %close_err,
                "failed to close abandoned run in ledger"
            );
        }
        err
    }

    /// Build, audit, evaluate and gate. Leaves the run `passed` or `failed`
    /// on success; any `Err` is a stage failure the caller turns into
    /// `errored`.
    async fn gate_stages(
        &self,
        run: &mut PipelineRun,
        recorder: &RunRecorder,
        abort: &AbortSignal,
        progress: &mut RunProgress,
    ) -> Result<()> {
        let run_id = run.run_id().clone();

        // Build
        let stage_start = Instant::now();
        let limit = StageKind::Build.limit(&self.config.timeouts);
        let built = race_abort(
            abort,
            with_timeout(StageKind::Build, limit, async {
                self.builder
                    .build(run.revision())
                    .await
                    .map_err(|e| GateError::Build(e.to_string()))
            }),
        )
        .await?;
        let artifact = self.handoff.store(&run_id, built).await?;
        progress.artifact = Some(artifact.clone());
        recorder
            .record(
                "build_completed",
                json!({
                    "digest": artifact.digest.as_str(),
                    "location": &artifact.location,
                }),
            )
            .await?;
        obs::emit_stage_completed(run_id.as_str(), "build", elapsed_ms(stage_start));

        // Audit
        let stage_start = Instant::now();
        let categories = self.config.measured_categories();
        let samples = race_abort(abort, self.audit(&run_id, &artifact, &categories)).await?;
        for sample in &samples {
            recorder
                .record(
                    "pass_measured",
                    json!({
                        "category": sample.category(),
                        "pass": sample.pass_index(),
                        "score": sample.score(),
                    }),
                )
                .await?;
        }
        recorder
            .record(
                "audit_completed",
                json!({ "samples": samples.len(), "categories": &categories }),
            )
            .await?;
        obs::emit_stage_completed(run_id.as_str(), "audit", elapsed_ms(stage_start));

        // Evaluate
        let metrics = aggregate_run(&categories, self.config.number_of_passes, &samples)?;
        let outcomes = evaluate_assertions(&metrics, &self.config.assertions);
        progress.metrics = metrics;

        // Gate. The last point where an abort still counts.
        if abort.is_aborted() {
            return Err(GateError::Aborted);
        }
        let verdict = GateDecisionEngine::conclude(run, outcomes)?;
        if !verdict.passed() {
            METRICS.inc_gates_failed();
        }
        obs::emit_gate_evaluated(
            run_id.as_str(),
            verdict.passed(),
            verdict.reasons.len(),
            verdict.warnings.len(),
        );
        recorder
            .record(
                "gate_evaluated",
                json!({
                    "passed": verdict.passed(),
                    "reasons": &verdict.reasons,
                    "warnings": &verdict.warnings,
                }),
            )
            .await?;
        progress.verdict = Some(verdict);
        Ok(())
    }

    /// Dispatch N passes per category concurrently and wait for all of them.
    ///
    /// Fails fast: the first failing pass drops the rest.
    async fn audit(
        &self,
        run_id: &RunId,
        artifact: &ArtifactRef,
        categories: &[Category],
    ) -> Result<Vec<MetricSample>> {
        let limit = StageKind::Measure.limit(&self.config.timeouts);
        let passes = self.config.number_of_passes;

        let jobs = categories.iter().flat_map(move |category| {
            (1..=passes).map(move |pass| async move {
                let sample = with_timeout(StageKind::Measure, limit, async {
                    self.engine
                        .measure(artifact, category, pass)
                        .await
                        .map_err(|e| GateError::Measurement {
                            category: category.clone(),
                            pass,
                            reason: e.to_string(),
                        })
                })
                .await?;
                if sample.category() != category || sample.pass_index() != pass {
                    return Err(GateError::InvalidSample(format!(
                        "asked for {category} pass {pass}, got {} pass {}",
                        sample.category(),
                        sample.pass_index()
                    )));
                }
                METRICS.inc_passes_measured();
                obs::emit_pass_measured(run_id.as_str(), category.as_str(), pass, sample.score());
                Ok(sample)
            })
        });

        try_join_all(jobs).await
    }

    /// Hand the artifact to the publisher. Only called for `passed` runs.
    async fn deploy_stage(
        &self,
        run: &PipelineRun,
        recorder: &RunRecorder,
        abort: &AbortSignal,
    ) -> Result<DeployOutcome> {
        let run_id = run.run_id();
        let target = self.config.target_name.as_str();

        if abort.is_aborted() {
            let reason = "run aborted before deploy".to_string();
            recorder
                .record("deploy_skipped", json!({ "reason": &reason }))
                .await?;
            info!(run_id = %run_id, "deploy skipped, run was aborted");
            return Ok(DeployOutcome::Skipped { reason });
        }

        let artifact = match self.handoff.retrieve(run_id).await {
            Ok(artifact) => artifact,
            Err(err) => {
                let error = format!("artifact unavailable: {err}");
                recorder
                    .record("deploy_failed", json!({ "error": &error }))
                    .await?;
                obs::emit_deploy_finished(run_id.as_str(), target, None, Some(&error));
                return Ok(DeployOutcome::Failed { error });
            }
        };

        recorder
            .record(
                "deploy_started",
                json!({ "target": target, "digest": artifact.digest.as_str() }),
            )
            .await?;
        obs::emit_deploy_started(run_id.as_str(), target, artifact.digest.short());

        // Past this point the deploy is not cancellable.
        let stage_start = Instant::now();
        let limit = StageKind::Deploy.limit(&self.config.timeouts);
        let published = with_timeout(StageKind::Deploy, limit, async {
            self.publisher
                .publish(&artifact, target)
                .await
                .map_err(|e| GateError::Publish(e.to_string()))
        })
        .await;

        let outcome = match published {
            Ok(result) => {
                METRICS.inc_deploys_published();
                recorder
                    .record(
                        "deploy_completed",
                        json!({ "deployment_id": &result.deployment_id }),
                    )
                    .await?;
                obs::emit_deploy_finished(
                    run_id.as_str(),
                    target,
                    Some(&result.deployment_id),
                    None,
                );
                DeployOutcome::Succeeded {
                    deployment_id: result.deployment_id,
                }
            }
            Err(err) => {
                let error = err.to_string();
                recorder
                    .record("deploy_failed", json!({ "error": &error }))
                    .await?;
                obs::emit_deploy_finished(run_id.as_str(), target, None, Some(&error));
                DeployOutcome::Failed { error }
            }
        };
        obs::emit_stage_completed(run_id.as_str(), "deploy", elapsed_ms(stage_start));
        Ok(outcome)
    }

    /// Publish the run report; sink failures are logged, never fatal.
    fn publish_report(&self, result: &PipelineResult) -> Option<String> {
        let sink = self.sink.as_ref()?;
        match sink.publish(&result.report()) {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(
                    run_id = %result.run_id(),
                    error = %format!("{err:#}"),
                    "failed to publish run report"
                );
                None
            }
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Bound a stage future by its time limit.
async fn with_timeout<T, F>(stage: StageKind, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(GateError::StageTimeout {
            stage: stage.name().to_string(),
            limit_ms: limit.as_millis() as u64,
        }),
    }
}

/// Race a stage future against the run's abort signal.
async fn race_abort<T, F>(abort: &AbortSignal, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if abort.is_aborted() {
        return Err(GateError::Aborted);
    }
    let mut signal = abort.clone();
    tokio::select! {
        biased;
        _ = signal.aborted() => Err(GateError::Aborted),
        result = fut => result,
    }
}
