//! Immutable pipeline configuration.
//!
//! A [`PipelineConfig`] is parsed once, validated, wrapped in an `Arc` and
//! handed to every run. Nothing in the pipeline mutates it.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AssertionConfig, Category, GateError, Result, Severity};

fn default_passes() -> u32 {
    3
}

fn default_target() -> String {
    "production".to_string()
}

fn default_grace_secs() -> u64 {
    900
}

/// Per-stage time limits, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTimeouts {
    pub build_secs: u64,
    /// Limit for a single measurement pass, not the whole audit stage.
    pub measure_secs: u64,
    pub deploy_secs: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            build_secs: 600,
            measure_secs: 120,
            deploy_secs: 300,
        }
    }
}

impl StageTimeouts {
    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_secs)
    }

    pub fn measure(&self) -> Duration {
        Duration::from_secs(self.measure_secs)
    }

    pub fn deploy(&self) -> Duration {
        Duration::from_secs(self.deploy_secs)
    }
}

/// Configuration of the gating pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Measurement passes per category (N).
    #[serde(default = "default_passes")]
    pub number_of_passes: u32,

    #[serde(default)]
    pub assertions: Vec<AssertionConfig>,

    /// Categories to measure. Empty means "whatever the assertions name".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<Category>,

    /// Deploy target handed to the publisher.
    #[serde(default = "default_target")]
    pub target_name: String,

    /// Directory for run reports. Reports are skipped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_target: Option<String>,

    #[serde(default)]
    pub timeouts: StageTimeouts,

    /// How long a terminal run's artifact stays retrievable.
    #[serde(default = "default_grace_secs")]
    pub artifact_grace_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            number_of_passes: default_passes(),
            assertions: Vec::new(),
            categories: Vec::new(),
            target_name: default_target(),
            report_target: None,
            timeouts: StageTimeouts::default(),
            artifact_grace_secs: default_grace_secs(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the config before any run uses it.
    pub fn validate(&self) -> Result<()> {
        if self.number_of_passes == 0 {
            return Err(GateError::InvalidConfig(
                "numberOfPasses must be at least 1".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for assertion in &self.assertions {
            if !assertion.min_score.is_finite() || !(0.0..=1.0).contains(&assertion.min_score) {
                return Err(GateError::InvalidConfig(format!(
                    "minScore for {} must be within [0, 1], got {}",
                    assertion.category, assertion.min_score
                )));
            }
            if !seen.insert(&assertion.category) {
                return Err(GateError::InvalidConfig(format!(
                    "duplicate assertion for category {}",
                    assertion.category
                )));
            }
        }

        if self.target_name.trim().is_empty() {
            return Err(GateError::InvalidConfig(
                "targetName must not be empty".to_string(),
            ));
        }

        let t = &self.timeouts;
        if t.build_secs == 0 || t.measure_secs == 0 || t.deploy_secs == 0 {
            return Err(GateError::InvalidConfig(
                "stage timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Categories the audit stage measures, deduplicated, in config order.
    pub fn measured_categories(&self) -> Vec<Category> {
        let source: Vec<&Category> = if self.categories.is_empty() {
            self.assertions.iter().map(|a| &a.category).collect()
        } else {
            self.categories.iter().collect()
        };
        let mut seen = BTreeSet::new();
        source
            .into_iter()
            .filter(|c| seen.insert(*c))
            .cloned()
            .collect()
    }

    pub fn artifact_grace(&self) -> Duration {
        Duration::from_secs(self.artifact_grace_secs)
    }

    /// Import a Lighthouse-CI style `lighthouserc` document.
    ///
    /// Reads `ci.collect.numberOfRuns` and the `categories:<name>` entries of
    /// `ci.assert.assertions`. `error` maps to blocking, `warn` to advisory
    /// and `off` drops the assertion. Audit-level keys are ignored.
    pub fn from_lighthouserc(doc: &Value) -> Result<Self> {
        let ci = doc
            .get("ci")
            .ok_or_else(|| GateError::InvalidConfig("missing `ci` section".to_string()))?;

        let mut config = PipelineConfig::default();

        if let Some(runs) = ci.pointer("/collect/numberOfRuns") {
            let runs = runs.as_u64().ok_or_else(|| {
                GateError::InvalidConfig(
                    "ci.collect.numberOfRuns must be a positive integer".to_string(),
                )
            })?;
            config.number_of_passes = u32::try_from(runs).map_err(|_| {
                GateError::InvalidConfig(format!("ci.collect.numberOfRuns too large: {runs}"))
            })?;
        }

        if let Some(assertions) = ci.pointer("/assert/assertions").and_then(Value::as_object) {
            for (key, rule) in assertions {
                let Some(name) = key.strip_prefix("categories:") else {
                    continue;
                };
                if let Some(assertion) = parse_lhci_assertion(name, rule)? {
                    config.assertions.push(assertion);
                }
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse one `["error", {"minScore": 0.9}]` entry. `None` for `off`.
fn parse_lhci_assertion(name: &str, rule: &Value) -> Result<Option<AssertionConfig>> {
    let (level, options) = match rule {
        Value::String(level) => (level.as_str(), None),
        Value::Array(items) => {
            let level = items.first().and_then(Value::as_str).ok_or_else(|| {
                GateError::InvalidConfig(format!("categories:{name}: missing level"))
            })?;
            (level, items.get(1))
        }
        _ => {
            return Err(GateError::InvalidConfig(format!(
                "categories:{name}: expected a level or [level, options]"
            )))
        }
    };

    let severity = match level {
        "error" => Severity::Blocking,
        "warn" => Severity::Advisory,
        "off" => return Ok(None),
        other => {
            return Err(GateError::InvalidConfig(format!(
                "categories:{name}: unknown level `{other}`"
            )))
        }
    };

    let min_score = options
        .and_then(|o| o.get("minScore"))
        .and_then(Value::as_f64)
        .ok_or_else(|| GateError::InvalidConfig(format!("categories:{name}: missing minScore")))?;

    Ok(Some(AssertionConfig {
        category: Category::from(name),
        severity,
        min_score,
    }))
}
