//! Structured observability hooks for the pipeline run lifecycle.
//!
//! This module provides:
//! - A run-scoped tracing span via [`run_span`]
//! - Emission functions for lifecycle events: start, stage completion,
//!   audit passes, gate evaluation, deploy, finish
//!
//! Events are emitted at `info!` level with a stable `event` field so log
//! pipelines can key on them. Filtering follows `RUST_LOG`.

use tracing::{info, warn};

/// Run-scoped span carrying the run id and revision.
///
/// Attach with `tracing::Instrument` so it follows the run across awaits:
///
/// ```ignore
/// pipeline.execute(run).instrument(run_span("run-12345", "abc123")).await
/// ```
pub fn run_span(run_id: &str, revision: &str) -> tracing::Span {
    tracing::info_span!("perfgate.run", run_id = %run_id, revision = %revision)
}

/// Emit event: run started for a revision.
pub fn emit_run_started(run_id: &str, revision: &str, passes: u32) {
    info!(event = "run.started", run_id = %run_id, revision = %revision, passes = passes);
}

/// Emit event: a stage finished (build, audit, deploy).
pub fn emit_stage_completed(run_id: &str, stage: &str, duration_ms: u64) {
    info!(
        event = "run.stage_completed",
        run_id = %run_id,
        stage = %stage,
        duration_ms = duration_ms,
    );
}

/// Emit event: one measurement pass produced a score.
pub fn emit_pass_measured(run_id: &str, category: &str, pass: u32, score: f64) {
    info!(
        event = "audit.pass_measured",
        run_id = %run_id,
        category = %category,
        pass = pass,
        score = score,
    );
}

/// Emit event: gate decided.
pub fn emit_gate_evaluated(
    run_id: &str,
    passed: bool,
    blocking_failures: usize,
    advisory_warnings: usize,
) {
    info!(
        event = "gate.evaluated",
        run_id = %run_id,
        passed = passed,
        blocking_failures = blocking_failures,
        advisory_warnings = advisory_warnings,
    );
}

pub fn emit_deploy_started(run_id: &str, target: &str, digest: &str) {
    info!(event = "deploy.started", run_id = %run_id, target = %target, digest = %digest);
}

/// Emit event: deploy finished. Failures log at `warn!`.
pub fn emit_deploy_finished(
    run_id: &str,
    target: &str,
    deployment_id: Option<&str>,
    error: Option<&str>,
) {
    match error {
        None => info!(
            event = "deploy.finished",
            run_id = %run_id,
            target = %target,
            deployment_id = deployment_id.unwrap_or(""),
            success = true,
        ),
        Some(error) => warn!(
            event = "deploy.finished",
            run_id = %run_id,
            target = %target,
            error = %error,
            success = false,
        ),
    }
}

/// Emit event: run finished with final status and outcome.
pub fn emit_run_finished(run_id: &str, status: &str, outcome: &str, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        status = %status,
        outcome = %outcome,
        duration_ms = duration_ms,
    );
}

/// Emit event: a stage error moved the run to `errored` (warning level).
pub fn emit_run_errored(run_id: &str, error: &dyn std::fmt::Display, transient: bool) {
    warn!(event = "run.errored", run_id = %run_id, error = %error, transient = transient);
}
