//! Descriptive statistics over latency samples.
//!
//! Percentiles use linear interpolation between closest ranks: for a sorted
//! sample `s` of length `n`, percentile `p` sits at fractional rank
//! `p / 100 * (n - 1)` and is interpolated between the two neighbouring order
//! statistics. The median is the 50th percentile under the same rule.
//! Standard deviation is the sample (N-1) form and is 0 for a single sample.

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

use crate::core::errors::{AsrhError, Result};

/// Summary statistics for one set of successful samples (milliseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSummary {
    pub test_name: String,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
    pub std_dev: f64,
}

/// A statistic a requirement can be judged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Min,
    Max,
    Mean,
    Median,
    P95,
    P99,
    StdDev,
}

impl Statistic {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Mean => "mean",
            Self::Median => "median",
            Self::P95 => "p95",
            Self::P99 => "p99",
            Self::StdDev => "std_dev",
        }
    }
}

impl StatisticalSummary {
    /// Read one statistic by name.
    #[must_use]
    pub const fn get(&self, statistic: Statistic) -> f64 {
        match statistic {
            Statistic::Min => self.min,
            Statistic::Max => self.max,
            Statistic::Mean => self.mean,
            Statistic::Median => self.median,
            Statistic::P95 => self.p95,
            Statistic::P99 => self.p99,
            Statistic::StdDev => self.std_dev,
        }
    }
}

/// Summarize a non-empty set of samples.
///
/// Sample order does not matter. Fails with `EmptySampleSet` when `samples` is
/// empty and `Runtime` when a sample is not a finite number.
pub fn compute_summary(test_name: &str, samples: &[f64]) -> Result<StatisticalSummary> {
    if samples.is_empty() {
        return Err(AsrhError::EmptySampleSet {
            scenario: test_name.to_string(),
        });
    }
    if let Some(bad) = samples.iter().find(|value| !value.is_finite()) {
        return Err(AsrhError::Runtime {
            details: format!("{test_name}: non-finite sample {bad}"),
        });
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let std_dev = if n > 1 {
        let sum_sq = sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
        (sum_sq / (n - 1) as f64).sqrt()
    } else {
        0.0
    };

    Ok(StatisticalSummary {
        test_name: test_name.to_string(),
        count: n,
        min: sorted[0],
        max: sorted[n - 1],
        mean,
        median: percentile_sorted(&sorted, 50.0),
        p95: percentile_sorted(&sorted, 95.0),
        p99: percentile_sorted(&sorted, 99.0),
        std_dev,
    })
}

/// Linear-interpolation percentile over an already sorted, non-empty slice.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let last = sorted.len() - 1;
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * last as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    (sorted[lo] + (sorted[hi] - sorted[lo]) * frac).clamp(sorted[lo], sorted[hi])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_set_is_an_error() {
        let err = compute_summary("patient_detail_latency", &[]).unwrap_err();
        assert!(matches!(err, AsrhError::EmptySampleSet { ref scenario } if scenario == "patient_detail_latency"));
    }

    #[test]
    fn non_finite_sample_rejected() {
        let err = compute_summary("x", &[1.0, f64::NAN]).unwrap_err();
        assert_eq!(err.code(), "ASRH-3900");
    }

    #[test]
    fn single_sample_collapses_every_statistic() {
        let s = compute_summary("single", &[42.5]).unwrap();
        assert_eq!(s.count, 1);
        for value in [s.min, s.max, s.mean, s.median, s.p95, s.p99] {
            assert!(close(value, 42.5));
        }
        assert!(close(s.std_dev, 0.0));
    }

    #[test]
    fn end_to_end_p95_interpolates_between_second_and_third() {
        let s = compute_summary("End-to-End", &[569.5, 598.2, 668.0]).unwrap();
        // rank = 0.95 * 2 = 1.9 -> 598.2 + 0.9 * (668.0 - 598.2)
        assert!(close(s.p95, 661.02), "p95 was {}", s.p95);
        assert!(s.p95 > 598.2 && s.p95 < 668.0);
        // rank = 0.99 * 2 = 1.98
        assert!(close(s.p99, 598.2 + 0.98 * 69.8), "p99 was {}", s.p99);
        assert!(close(s.median, 598.2));
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        let s = compute_summary("even", &[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert!(close(s.median, 2.5));
        assert!(close(s.min, 1.0));
        assert!(close(s.max, 4.0));
    }

    #[test]
    fn std_dev_uses_sample_denominator() {
        // mean 5, squared deviations sum to 32, / (8 - 1)
        let s = compute_summary("sd", &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!(close(s.mean, 5.0));
        assert!(close(s.std_dev, (32.0_f64 / 7.0).sqrt()));
    }

    #[test]
    fn statistic_lookup_matches_fields() {
        let s = compute_summary("lookup", &[10.0, 20.0, 30.0]).unwrap();
        assert!(close(s.get(Statistic::Mean), 20.0));
        assert!(close(s.get(Statistic::Max), 30.0));
        assert!(close(s.get(Statistic::Min), 10.0));
        assert_eq!(Statistic::StdDev.label(), "std_dev");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Order statistics never cross for any non-empty sample set.
        #[test]
        fn order_statistics_are_monotone(
            samples in prop::collection::vec(0.0f64..10_000.0, 1..200)
        ) {
            let s = compute_summary("prop", &samples).unwrap();
            prop_assert_eq!(s.count, samples.len());
            prop_assert!(s.min <= s.median);
            prop_assert!(s.median <= s.p95);
            prop_assert!(s.p95 <= s.p99);
            prop_assert!(s.p99 <= s.max);
            prop_assert!(s.min <= s.mean + 1e-9 && s.mean <= s.max + 1e-9);
            prop_assert!(s.std_dev >= 0.0);
        }

        /// Shuffling the input never changes the summary.
        #[test]
        fn summary_is_order_independent(
            mut samples in prop::collection::vec(0.0f64..5_000.0, 1..100)
        ) {
            let forward = compute_summary("prop", &samples).unwrap();
            samples.reverse();
            let backward = compute_summary("prop", &samples).unwrap();
            prop_assert_eq!(forward.p95.to_bits(), backward.p95.to_bits());
            prop_assert_eq!(forward.median.to_bits(), backward.median.to_bits());
            prop_assert!((forward.mean - backward.mean).abs() < 1e-6);
        }
    }
}
