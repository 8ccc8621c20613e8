//! Assertion evaluation.
//!
//! Pure functions: the same metrics and configs always give the same outcomes,
//! one per config entry, in config order.

use std::collections::BTreeMap;

use crate::domain::{AggregatedMetric, AssertionConfig, AssertionOutcome, Category};

/// Evaluate a single assertion against the metric for its category, if any.
pub fn evaluate_assertion(
    metric: Option<&AggregatedMetric>,
    config: &AssertionConfig,
) -> AssertionOutcome {
    match metric {
        Some(m) => AssertionOutcome {
            category: config.category.clone(),
            severity: config.severity,
            threshold: config.min_score,
            actual: Some(m.score),
            satisfied: m.score >= config.min_score,
            missing_metric: false,
        },
        None => AssertionOutcome {
            category: config.category.clone(),
            severity: config.severity,
            threshold: config.min_score,
            actual: None,
            satisfied: false,
            missing_metric: true,
        },
    }
}

/// Evaluate every assertion; a category without a metric yields a
/// `missing_metric` outcome regardless of severity.
pub fn evaluate_assertions(
    metrics: &BTreeMap<Category, AggregatedMetric>,
    assertions: &[AssertionConfig],
) -> Vec<AssertionOutcome> {
    assertions
        .iter()
        .map(|config| evaluate_assertion(metrics.get(&config.category), config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(category: Category, score: f64) -> AggregatedMetric {
        AggregatedMetric {
            category,
            score,
            samples: vec![score],
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let m = metric(Category::Performance, 0.9);
        let out = evaluate_assertion(
            Some(&m),
            &AssertionConfig::blocking(Category::Performance, 0.9),
        );
        assert!(out.satisfied);
        assert_eq!(out.actual, Some(0.9));
        assert!(!out.missing_metric);
    }

    #[test]
    fn low_score_unsatisfied_but_not_missing() {
        let m = metric(Category::Performance, 0.8);
        let out = evaluate_assertion(
            Some(&m),
            &AssertionConfig::blocking(Category::Performance, 0.9),
        );
        assert!(!out.satisfied);
        assert!(!out.missing_metric);
    }

    #[test]
    fn missing_metric_is_unsatisfied_for_any_severity() {
        let metrics = BTreeMap::new();
        let outcomes = evaluate_assertions(
            &metrics,
            &[
                AssertionConfig::advisory(Category::Seo, 0.0),
                AssertionConfig::blocking(Category::Seo, 0.0),
            ],
        );
        assert_eq!(outcomes.len(), 2);
        for out in outcomes {
            assert!(!out.satisfied);
            assert!(out.missing_metric);
            assert_eq!(out.actual, None);
        }
    }

    #[test]
    fn one_outcome_per_config_in_config_order() {
        let mut metrics = BTreeMap::new();
        metrics.insert(Category::Performance, metric(Category::Performance, 0.95));
        metrics.insert(Category::Accessibility, metric(Category::Accessibility, 0.7));
        let configs = vec![
            AssertionConfig::advisory(Category::Accessibility, 0.9),
            AssertionConfig::blocking(Category::Performance, 0.9),
        ];
        let outcomes = evaluate_assertions(&metrics, &configs);
        assert_eq!(outcomes[0].category, Category::Accessibility);
        assert!(!outcomes[0].satisfied);
        assert_eq!(outcomes[1].category, Category::Performance);
        assert!(outcomes[1].satisfied);
    }

    #[test]
    fn evaluation_is_order_independent_per_category() {
        let mut metrics = BTreeMap::new();
        metrics.insert(Category::Performance, metric(Category::Performance, 0.95));
        metrics.insert(Category::Seo, metric(Category::Seo, 0.5));
        let a = AssertionConfig::blocking(Category::Performance, 0.9);
        let b = AssertionConfig::blocking(Category::Seo, 0.6);

        let forward = evaluate_assertions(&metrics, &[a.clone(), b.clone()]);
        let mut backward = evaluate_assertions(&metrics, &[b, a]);
        backward.reverse();
        assert_eq!(forward, backward);
    }
}
