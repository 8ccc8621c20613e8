//! Assertion rules and their evaluated outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::category::Category;

/// How an assertion failure affects the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Failure rejects the run.
    Blocking,
    /// Failure is reported but never rejects the run.
    Advisory,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Blocking => f.write_str("blocking"),
            Severity::Advisory => f.write_str("advisory"),
        }
    }
}

/// A threshold rule for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionConfig {
    pub category: Category,
    pub severity: Severity,
    /// Minimum acceptable aggregated score, inclusive.
    pub min_score: f64,
}

impl AssertionConfig {
    pub fn blocking(category: Category, min_score: f64) -> Self {
        Self {
            category,
            severity: Severity::Blocking,
            min_score,
        }
    }

    pub fn advisory(category: Category, min_score: f64) -> Self {
        Self {
            category,
            severity: Severity::Advisory,
            min_score,
        }
    }
}

/// Result of checking one [`AssertionConfig`] against the run's metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionOutcome {
    pub category: Category,
    pub severity: Severity,
    pub threshold: f64,
    /// Aggregated score; `None` when the category was never measured.
    pub actual: Option<f64>,
    pub satisfied: bool,
    /// Set when no aggregated metric existed for the category.
    pub missing_metric: bool,
}

impl AssertionOutcome {
    /// Unsatisfied blocking outcome.
    pub fn is_blocking_failure(&self) -> bool {
        !self.satisfied && self.severity == Severity::Blocking
    }

    /// Unsatisfied advisory outcome.
    pub fn is_advisory_warning(&self) -> bool {
        !self.satisfied && self.severity == Severity::Advisory
    }

    /// One-line explanation used in verdict reasons and reports.
    pub fn describe(&self) -> String {
        match (self.actual, self.missing_metric) {
            (_, true) | (None, _) => format!(
                "{} was never measured (required >= {:.2}, {})",
                self.category, self.threshold, self.severity
            ),
            (Some(actual), false) if self.satisfied => format!(
                "{} {:.2} >= {:.2} ({})",
                self.category, actual, self.threshold, self.severity
            ),
            (Some(actual), false) => format!(
                "{} {:.2} < required {:.2} ({})",
                self.category, actual, self.threshold, self.severity
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_serde_uses_camel_case() {
        let json = serde_json::json!({
            "category": "performance",
            "severity": "blocking",
            "minScore": 0.9
        });
        let cfg: AssertionConfig = serde_json::from_value(json).expect("deserialize");
        assert_eq!(cfg, AssertionConfig::blocking(Category::Performance, 0.9));
    }

    #[test]
    fn unknown_severity_rejected() {
        let json = serde_json::json!({
            "category": "seo",
            "severity": "fatal",
            "minScore": 0.5
        });
        assert!(serde_json::from_value::<AssertionConfig>(json).is_err());
    }

    #[test]
    fn describe_distinguishes_missing_from_low() {
        let low = AssertionOutcome {
            category: Category::Seo,
            severity: Severity::Blocking,
            threshold: 0.9,
            actual: Some(0.5),
            satisfied: false,
            missing_metric: false,
        };
        let missing = AssertionOutcome {
            actual: None,
            missing_metric: true,
            ..low.clone()
        };
        assert!(low.describe().contains("< required"));
        assert!(missing.describe().contains("never measured"));
        assert!(low.is_blocking_failure());
        assert!(!low.is_advisory_warning());
    }
}
