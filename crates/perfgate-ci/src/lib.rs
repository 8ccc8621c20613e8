//! perfgate CI - pipeline orchestration
//!
//! Drives one run per revision through build, audit, evaluate, gate and
//! deploy:
//! - Collaborator traits for the build tool, measurement engine and publisher
//! - Process-backed collaborators that shell out to configured commands
//! - Stage timeouts, cancellation and per-run ledger recording

pub mod collaborators;
pub mod config;
pub mod pipeline;
pub mod recording;
pub mod runner;
pub mod stage;

// Re-export key types
pub use collaborators::{Builder, CollaboratorError, DeployResult, MeasurementEngine, Publisher};
pub use config::{BuildSpec, CiConfigFile};
pub use pipeline::{AbortHandle, AbortSignal, GatePipeline, PipelineResult};
pub use recording::RunRecorder;
pub use runner::{CommandBuilder, CommandMeasurer, CommandPublisher, CommandRunner, StageOutput};
pub use stage::{CommandSpec, StageKind};
