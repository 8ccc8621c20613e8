//! Domain models for perfgate.
//!
//! Canonical definitions for the core entities:
//! - `Category` / `MetricSample` / `AggregatedMetric`: what gets measured
//! - `AssertionConfig` / `AssertionOutcome`: thresholds and their results
//! - `PipelineRun`: one run and its status state machine
//! - `DeployOutcome` / `PipelineOutcome`: what happened after the gate

pub mod assertion;
pub mod category;
pub mod deploy;
pub mod error;
pub mod run;
pub mod sample;

pub use assertion::{AssertionConfig, AssertionOutcome, Severity};
pub use category::Category;
pub use deploy::{DeployOutcome, PipelineOutcome};
pub use error::{GateError, Result};
pub use run::{PipelineRun, RunStatus};
pub use sample::{AggregatedMetric, MetricSample};
