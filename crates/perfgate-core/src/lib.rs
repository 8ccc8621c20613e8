//! perfgate core library
//!
//! Pure gating logic for a performance-gated deployment pipeline:
//!
//! - [`aggregate`]: median of repeated measurement passes per category
//! - [`evaluate`]: assertion outcomes against configured thresholds
//! - [`gate`]: blocking/advisory verdict and the run state transition
//! - [`config`]: immutable pipeline configuration
//! - [`reporting`]: run report export and sinks
//!
//! Orchestration and the external collaborators live in `perfgate-ci`.

pub mod aggregate;
pub mod config;
pub mod domain;
pub mod evaluate;
pub mod gate;
pub mod metrics;
pub mod obs;
pub mod reporting;
pub mod telemetry;

pub use aggregate::{aggregate_category, aggregate_run, median};
pub use config::{PipelineConfig, StageTimeouts};
pub use domain::{
    AggregatedMetric, AssertionConfig, AssertionOutcome, Category, DeployOutcome, GateError,
    MetricSample, PipelineOutcome, PipelineRun, Result, RunStatus, Severity,
};
pub use evaluate::{evaluate_assertion, evaluate_assertions};
pub use gate::{decide, GateDecision, GateDecisionEngine, GateVerdict};
pub use metrics::METRICS;
pub use obs::run_span;
pub use reporting::{
    read_run_report_json, render_run_report_md, write_run_report_json, FileReportSink,
    ReportSink, RunReport,
};
pub use telemetry::init_tracing;

pub use perfgate_state::{ArtifactRef, ContentDigest, RunId};

/// perfgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
