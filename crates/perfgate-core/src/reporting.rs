//! Run reports: a JSON artifact per run plus a markdown summary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AggregatedMetric, AssertionOutcome, Category, DeployOutcome, PipelineOutcome, PipelineRun,
    RunStatus,
};
use crate::gate::GateVerdict;
use perfgate_state::ArtifactRef;

pub const REPORT_SCHEMA_VERSION: &str = "1.0";

/// Aggregated score of one category as persisted in the report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricReport {
    pub category: Category,
    pub score: f64,
    pub samples: Vec<f64>,
}

/// Canonical run report written by report sinks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub run_id: String,
    pub revision: String,
    pub status: RunStatus,
    pub outcome: Option<PipelineOutcome>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub artifact_digest: Option<String>,
    pub metrics: Vec<MetricReport>,
    pub outcomes: Vec<AssertionOutcome>,
    pub blocking_failures: Vec<String>,
    pub advisory_warnings: Vec<String>,
    pub deploy: DeployOutcome,
    pub deployment_id: Option<String>,
}

impl RunReport {
    /// Snapshot a run. `verdict` is `None` when the run never reached the gate.
    pub fn from_run(
        run: &PipelineRun,
        artifact: Option<&ArtifactRef>,
        metrics: &BTreeMap<Category, AggregatedMetric>,
        verdict: Option<&GateVerdict>,
        deploy: &DeployOutcome,
    ) -> Self {
        let (outcomes, blocking_failures, advisory_warnings) = match verdict {
            Some(v) => (v.outcomes.clone(), v.reasons.clone(), v.warnings.clone()),
            None => (Vec::new(), Vec::new(), Vec::new()),
        };
        Self {
            schema_version: REPORT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            run_id: run.run_id().to_string(),
            revision: run.revision().to_string(),
            status: run.status(),
            outcome: PipelineOutcome::classify(run.status(), deploy),
            started_at: run.started_at(),
            finished_at: run.finished_at(),
            failure_reason: run.failure_reason().map(str::to_string),
            artifact_digest: artifact.map(|a| a.digest.to_string()),
            metrics: metrics
                .values()
                .map(|m| MetricReport {
                    category: m.category.clone(),
                    score: m.score,
                    samples: m.samples.clone(),
                })
                .collect(),
            outcomes,
            blocking_failures,
            advisory_warnings,
            deploy: deploy.clone(),
            deployment_id: deploy.deployment_id().map(str::to_string),
        }
    }
}

/// Write a run report as pretty JSON.
pub fn write_run_report_json(path: &Path, report: &RunReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}

/// Load a report written by [`write_run_report_json`].
pub fn read_run_report_json(path: &Path) -> Result<RunReport> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("parse run report {:?}", path))
}

/// Render the markdown summary for a PR comment or job log.
pub fn render_run_report_md(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# perfgate run `{}`\n\n", report.run_id));
    out.push_str(&format!("- revision: `{}`\n", report.revision));
    out.push_str(&format!("- status: {}\n", report.status));
    if let Some(outcome) = report.outcome {
        out.push_str(&format!("- outcome: {}\n", outcome.as_str()));
    }
    if let Some(digest) = &report.artifact_digest {
        let short: String = digest.chars().take(12).collect();
        out.push_str(&format!("- artifact: `{}`\n", short));
    }
    if let Some(reason) = &report.failure_reason {
        out.push_str(&format!("- reason: {}\n", reason));
    }
    out.push('\n');

    if !report.metrics.is_empty() {
        out.push_str("## Scores\n");
        out.push_str("| category | median | samples |\n|---|---|---|\n");
        for m in &report.metrics {
            let samples: Vec<String> = m.samples.iter().map(|s| format!("{:.2}", s)).collect();
            out.push_str(&format!(
                "| {} | {:.2} | {} |\n",
                m.category,
                m.score,
                samples.join(", ")
            ));
        }
        out.push('\n');
    }

    if !report.blocking_failures.is_empty() {
        out.push_str("## Blocking failures\n");
        for reason in &report.blocking_failures {
            out.push_str(&format!("- {}\n", reason));
        }
        out.push('\n');
    }

    if !report.advisory_warnings.is_empty() {
        out.push_str("## Advisory warnings\n");
        for warning in &report.advisory_warnings {
            out.push_str(&format!("- {}\n", warning));
        }
        out.push('\n');
    }

    out.push_str("## Deploy\n");
    match &report.deploy {
        DeployOutcome::NotAttempted => out.push_str("- not attempted\n"),
        DeployOutcome::Skipped { reason } => out.push_str(&format!("- skipped: {}\n", reason)),
        DeployOutcome::Succeeded { deployment_id } => {
            out.push_str(&format!("- deployed: `{}`\n", deployment_id))
        }
        DeployOutcome::Failed { error } => out.push_str(&format!("- failed: {}\n", error)),
    }
    out
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Destination for finished run reports.
///
/// Returns a URL the report can be found at. Callers log sink errors; a
/// report that cannot be written never changes the run's outcome.
pub trait ReportSink: Send + Sync {
    fn publish(&self, report: &RunReport) -> Result<String>;
}

/// Writes `<run_id>.json` and `<run_id>.md` into a directory.
#[derive(Debug, Clone)]
pub struct FileReportSink {
    dir: PathBuf,
}

impl FileReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ReportSink for FileReportSink {
    fn publish(&self, report: &RunReport) -> Result<String> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create report dir {:?}", self.dir))?;

        let json_path = self.dir.join(format!("{}.json", report.run_id));
        write_run_report_json(&json_path, report)?;

        let md_path = self.dir.join(format!("{}.md", report.run_id));
        std::fs::write(&md_path, render_run_report_md(report))
            .with_context(|| format!("write {:?}", md_path))?;

        let absolute = std::fs::canonicalize(&json_path)
            .with_context(|| format!("resolve {:?}", json_path))?;
        Ok(format!("file://{}", absolute.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AssertionConfig;
    use crate::evaluate::evaluate_assertions;
    use crate::gate::decide;
    use perfgate_state::ContentDigest;
    use serde_json::json;

    fn sample_report() -> RunReport {
        let mut run = PipelineRun::new("abc123");
        run.start().expect("start");
        run.transition(RunStatus::Passed).expect("pass");

        let mut metrics = BTreeMap::new();
        metrics.insert(
            Category::Performance,
            AggregatedMetric {
                category: Category::Performance,
                score: 0.93,
                samples: vec![0.91, 0.93, 0.95],
            },
        );
        let outcomes = evaluate_assertions(
            &metrics,
            &[
                AssertionConfig::blocking(Category::Performance, 0.9),
                AssertionConfig::advisory(Category::Seo, 0.8),
            ],
        );
        let verdict = decide(outcomes);
        let artifact = ArtifactRef::new(ContentDigest::from_bytes(b"bundle"), "dist");
        let deploy = DeployOutcome::Succeeded {
            deployment_id: "dpl_42".to_string(),
        };
        RunReport::from_run(&run, Some(&artifact), &metrics, Some(&verdict), &deploy)
    }

    #[test]
    fn report_schema_has_expected_keys() {
        let report = sample_report();
        let raw = serde_json::to_value(&report).expect("serialize report");
        let obj = raw.as_object().expect("report object");
        for key in [
            "schema_version",
            "run_id",
            "revision",
            "status",
            "metrics",
            "outcomes",
            "blocking_failures",
            "advisory_warnings",
            "deploy",
            "deployment_id",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(raw["schema_version"], json!("1.0"));
        assert_eq!(raw["status"], json!("passed"));
        assert_eq!(raw["outcome"], json!("deployed"));
        assert_eq!(raw["deployment_id"], json!("dpl_42"));
        assert_eq!(raw["outcomes"][1]["missing_metric"], json!(true));
        assert_eq!(report.advisory_warnings.len(), 1);
    }

    #[test]
    fn markdown_lists_scores_and_warnings() {
        let md = render_run_report_md(&sample_report());
        assert!(md.starts_with("# perfgate run `"));
        assert!(md.contains("| performance | 0.93 | 0.91, 0.93, 0.95 |"));
        assert!(md.contains("## Advisory warnings\n- seo was never measured"));
        assert!(!md.contains("## Blocking failures"));
        assert!(md.contains("- deployed: `dpl_42`"));
    }

    #[test]
    fn errored_run_without_verdict_renders() {
        let mut run = PipelineRun::new("abc");
        run.start().expect("start");
        run.error(&crate::domain::GateError::Build("exit 1".to_string()))
            .expect("error");
        let report = RunReport::from_run(
            &run,
            None,
            &BTreeMap::new(),
            None,
            &DeployOutcome::NotAttempted,
        );
        assert_eq!(report.outcome, Some(PipelineOutcome::Errored));
        let md = render_run_report_md(&report);
        assert!(md.contains("- reason: build failed: exit 1"));
        assert!(md.contains("- not attempted"));
    }

    #[test]
    fn file_sink_writes_both_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = FileReportSink::new(dir.path().join("reports"));
        let report = sample_report();

        let url = sink.publish(&report).expect("publish");
        assert!(url.starts_with("file://"));
        assert!(url.ends_with(&format!("{}.json", report.run_id)));

        let json_path = sink.dir().join(format!("{}.json", report.run_id));
        let back = read_run_report_json(&json_path).expect("read back");
        assert_eq!(back, report);
        assert!(sink.dir().join(format!("{}.md", report.run_id)).exists());
    }
}
