//! Raw measurement samples and their aggregate.

use serde::{Deserialize, Serialize};

use super::category::Category;
use super::error::{GateError, Result};

/// One score for one category from one audit pass. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    category: Category,
    score: f64,
    pass_index: u32,
}

impl MetricSample {
    /// Build a sample, rejecting scores outside `[0, 1]` and pass index 0.
    pub fn new(category: Category, score: f64, pass_index: u32) -> Result<Self> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(GateError::InvalidScore { category, score });
        }
        if pass_index == 0 {
            return Err(GateError::InvalidSample(format!(
                "pass index for {category} must start at 1"
            )));
        }
        Ok(Self {
            category,
            score,
            pass_index,
        })
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    /// 1-based audit pass that produced this sample.
    pub fn pass_index(&self) -> u32 {
        self.pass_index
    }
}

/// The representative score for a category across a run's passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetric {
    pub category: Category,
    /// Median of `samples`.
    pub score: f64,
    /// Raw sample scores in pass order.
    pub samples: Vec<f64>,
}

impl AggregatedMetric {
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_accepts_bounds() {
        assert!(MetricSample::new(Category::Seo, 0.0, 1).is_ok());
        assert!(MetricSample::new(Category::Seo, 1.0, 3).is_ok());
    }

    #[test]
    fn sample_rejects_out_of_range_scores() {
        for bad in [-0.01, 1.01, f64::NAN, f64::INFINITY] {
            let err = MetricSample::new(Category::Performance, bad, 1).unwrap_err();
            assert!(matches!(err, GateError::InvalidScore { .. }), "{bad}");
        }
    }

    #[test]
    fn sample_rejects_pass_zero() {
        let err = MetricSample::new(Category::Performance, 0.5, 0).unwrap_err();
        assert!(matches!(err, GateError::InvalidSample(_)));
    }
}
