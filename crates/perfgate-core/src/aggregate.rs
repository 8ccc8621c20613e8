//! Metric aggregation: one representative score per category.
//!
//! The representative score is the median of the pass scores. A single noisy
//! pass (a slow machine inflating blocking time, say) moves a mean but not a
//! median.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::{AggregatedMetric, Category, GateError, MetricSample, Result};

/// Median of `values`: middle value for odd counts, mean of the two middle
/// values for even counts. `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Reduce the samples of one category to an [`AggregatedMetric`].
///
/// Samples of other categories are ignored. Fails with `MissingSamples` when
/// none are left.
pub fn aggregate_category(
    category: &Category,
    samples: &[MetricSample],
) -> Result<AggregatedMetric> {
    let mut own: Vec<&MetricSample> = samples
        .iter()
        .filter(|s| s.category() == category)
        .collect();
    own.sort_by_key(|s| s.pass_index());
    let scores: Vec<f64> = own.iter().map(|s| s.score()).collect();

    let score = median(&scores).ok_or_else(|| GateError::MissingSamples {
        category: category.clone(),
        expected: 1,
        recorded: 0,
    })?;

    Ok(AggregatedMetric {
        category: category.clone(),
        score,
        samples: scores,
    })
}

/// Aggregate every `required` category, each of which must carry exactly
/// `passes` samples.
///
/// Fewer samples than `passes` is `MissingSamples`; more is `InvalidSample`.
/// Samples for categories outside `required` are dropped.
pub fn aggregate_run(
    required: &[Category],
    passes: u32,
    samples: &[MetricSample],
) -> Result<BTreeMap<Category, AggregatedMetric>> {
    let mut by_category: BTreeMap<&Category, Vec<MetricSample>> = BTreeMap::new();
    for sample in samples {
        by_category
            .entry(sample.category())
            .or_default()
            .push(sample.clone());
    }

    let mut metrics = BTreeMap::new();
    for category in required {
        let own = by_category.remove(category).unwrap_or_default();
        let recorded = own.len() as u32;
        if recorded < passes {
            return Err(GateError::MissingSamples {
                category: category.clone(),
                expected: passes,
                recorded,
            });
        }
        if recorded > passes {
            return Err(GateError::InvalidSample(format!(
                "{category} has {recorded} samples for {passes} passes"
            )));
        }
        let metric = aggregate_category(category, &own)?;
        debug!(
            category = %category,
            score = metric.score,
            samples = recorded,
            "category aggregated"
        );
        metrics.insert(category.clone(), metric);
    }

    for stray in by_category.keys() {
        debug!(category = %stray, "dropping samples for unscheduled category");
    }

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(category: Category, scores: &[f64]) -> Vec<MetricSample> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| MetricSample::new(category.clone(), *s, i as u32 + 1).expect("sample"))
            .collect()
    }

    #[test]
    fn median_odd_takes_middle() {
        assert_eq!(median(&[0.95, 0.80, 0.70]), Some(0.80));
        assert_eq!(median(&[0.5]), Some(0.5));
    }

    #[test]
    fn median_even_averages_middle_pair() {
        let m = median(&[0.9, 0.7, 0.8, 1.0]).expect("median");
        assert!((m - 0.85).abs() < 1e-12);
    }

    #[test]
    fn median_empty_is_none() {
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn median_odd_splits_samples_evenly() {
        // For odd N, ceil(N/2) samples are <= the median and ceil(N/2) are >= it.
        let sets: [&[f64]; 4] = [
            &[0.3, 0.1, 0.2],
            &[0.9, 0.9, 0.1, 0.5, 0.7],
            &[1.0, 0.0, 0.5, 0.5, 0.25, 0.75, 0.6],
            &[0.42],
        ];
        for set in sets {
            let m = median(set).expect("median");
            let need = set.len().div_ceil(2);
            assert!(set.iter().filter(|v| **v <= m).count() >= need);
            assert!(set.iter().filter(|v| **v >= m).count() >= need);
            assert!(set.contains(&m));
        }
    }

    #[test]
    fn median_suppresses_single_outlier() {
        let m = median(&[0.91, 0.92, 0.10]).expect("median");
        assert_eq!(m, 0.91);
    }

    #[test]
    fn aggregate_category_keeps_pass_order() {
        let mut s = samples(Category::Performance, &[0.95, 0.80, 0.70]);
        s.reverse();
        let metric = aggregate_category(&Category::Performance, &s).expect("aggregate");
        assert_eq!(metric.score, 0.80);
        assert_eq!(metric.samples, vec![0.95, 0.80, 0.70]);
        assert_eq!(metric.sample_count(), 3);
    }

    #[test]
    fn aggregate_category_without_samples_fails() {
        let s = samples(Category::Performance, &[0.9]);
        let err = aggregate_category(&Category::Seo, &s).unwrap_err();
        assert!(matches!(err, GateError::MissingSamples { recorded: 0, .. }));
    }

    #[test]
    fn aggregate_run_requires_exact_pass_count() {
        let mut s = samples(Category::Performance, &[0.9, 0.8, 0.7]);
        s.extend(samples(Category::Accessibility, &[0.9, 0.8]));

        let err = aggregate_run(&[Category::Performance, Category::Accessibility], 3, &s)
            .unwrap_err();
        assert!(matches!(
            err,
            GateError::MissingSamples {
                category: Category::Accessibility,
                expected: 3,
                recorded: 2
            }
        ));
    }

    #[test]
    fn aggregate_run_rejects_surplus_samples() {
        let s = samples(Category::Seo, &[0.9, 0.8, 0.7, 0.6]);
        let err = aggregate_run(&[Category::Seo], 3, &s).unwrap_err();
        assert!(matches!(err, GateError::InvalidSample(_)));
    }

    #[test]
    fn aggregate_run_drops_unscheduled_categories() {
        let mut s = samples(Category::Performance, &[0.9, 0.95, 0.92]);
        s.extend(samples(Category::Seo, &[0.1, 0.1, 0.1]));
        let metrics = aggregate_run(&[Category::Performance], 3, &s).expect("aggregate");
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[&Category::Performance].score, 0.92);
    }
}
