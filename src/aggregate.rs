// src/aggregate.rs
//! Single-writer accumulation of verdicts into category rollups.
//!
//! The aggregator is the sole mutator of rollup state. Replaying the same
//! ordered `(descriptor, verdict)` sequence yields byte-identical rollups:
//! keys live in BTreeMaps and nothing here reads the clock.

use crate::catalog::TestDescriptor;
use crate::classify::{Outcome, Verdict};
use serde::Serialize;
use std::collections::BTreeMap;

/// One recorded test: descriptor identity plus the verdict that was folded in.
#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    pub category: String,
    pub subcategory: String,
    pub test_id: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// A failed test listed inside a rollup.
#[derive(Debug, Clone, Serialize)]
pub struct FailureEntry {
    pub test_id: String,
    pub subcategory: String,
    pub outcome: Outcome,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubcategoryRollup {
    pub tests_run: u64,
    /// Fixtures classified `Detected` (bounds the rate).
    pub detected_tests: u64,
    /// Sum of per-finding counts (may exceed `tests_run`).
    pub detections_total: u64,
    pub savings_total: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryRollup {
    pub tests_run: u64,
    pub detected_tests: u64,
    pub detections_total: u64,
    pub savings_total: f64,
    pub subcategories: BTreeMap<String, SubcategoryRollup>,
    pub failures: Vec<FailureEntry>,
}

impl CategoryRollup {
    /// Per-fixture detection rate, defined as 0 for an empty rollup.
    #[must_use]
    pub fn detection_rate(&self) -> f64 {
        detection_rate(self.detected_tests, self.tests_run)
    }
}

#[must_use]
pub fn detection_rate(detected: u64, tests_run: u64) -> f64 {
    if tests_run == 0 {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let rate = detected as f64 / tests_run as f64;
        rate
    }
}

/// Accumulates verdicts. Single writer; apply records in catalog order.
#[derive(Debug, Default)]
pub struct Aggregator {
    rollups: BTreeMap<String, CategoryRollup>,
    successes: Vec<TestRecord>,
    failures: Vec<TestRecord>,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, descriptor: &TestDescriptor, verdict: Verdict) {
        let category = self.rollups.entry(descriptor.category.clone()).or_default();
        category.tests_run += 1;
        category.detections_total += verdict.detection_count;
        if let Some(savings) = verdict.estimated_savings {
            category.savings_total += savings;
        }

        let sub = category
            .subcategories
            .entry(descriptor.subcategory.clone())
            .or_default();
        sub.tests_run += 1;
        sub.detections_total += verdict.detection_count;
        if let Some(savings) = verdict.estimated_savings {
            sub.savings_total += savings;
        }

        if verdict.is_detection() {
            category.detected_tests += 1;
            sub.detected_tests += 1;
        } else {
            category.failures.push(FailureEntry {
                test_id: descriptor.test_id.clone(),
                subcategory: descriptor.subcategory.clone(),
                outcome: verdict.outcome,
                reason: verdict.failure_reason().to_string(),
            });
        }

        let record = TestRecord {
            category: descriptor.category.clone(),
            subcategory: descriptor.subcategory.clone(),
            test_id: descriptor.test_id.clone(),
            verdict,
        };
        if record.verdict.is_detection() {
            self.successes.push(record);
        } else {
            self.failures.push(record);
        }
    }

    #[must_use]
    pub fn rollups(&self) -> &BTreeMap<String, CategoryRollup> {
        &self.rollups
    }

    #[must_use]
    pub fn successes(&self) -> &[TestRecord] {
        &self.successes
    }

    #[must_use]
    pub fn failures(&self) -> &[TestRecord] {
        &self.failures
    }

    #[must_use]
    pub fn tests_run(&self) -> u64 {
        self.rollups.values().map(|c| c.tests_run).sum()
    }

    #[must_use]
    pub fn detected_tests(&self) -> u64 {
        self.rollups.values().map(|c| c.detected_tests).sum()
    }

    #[must_use]
    pub fn detections_total(&self) -> u64 {
        self.rollups.values().map(|c| c.detections_total).sum()
    }

    #[must_use]
    pub fn savings_total(&self) -> f64 {
        self.rollups.values().map(|c| c.savings_total).sum()
    }

    /// Consumes the accumulator, handing ownership of the final state to the
    /// report generator.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        BTreeMap<String, CategoryRollup>,
        Vec<TestRecord>,
        Vec<TestRecord>,
    ) {
        (self.rollups, self.successes, self.failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Outcome;
    use std::path::PathBuf;

    fn descriptor(category: &str, subcategory: &str, test_id: &str) -> TestDescriptor {
        TestDescriptor {
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            test_id: test_id.to_string(),
            fixture_path: PathBuf::from(format!("{category}/{subcategory}/{test_id}.json")),
        }
    }

    fn verdict(outcome: Outcome, detection_count: u64, savings: Option<f64>) -> Verdict {
        Verdict {
            outcome,
            detection_count,
            estimated_savings: savings,
            severity_counts: BTreeMap::new(),
            raw_output: String::new(),
            exit_code: 0,
            duration_ms: 1,
        }
    }

    #[test]
    fn category_totals_are_sums_of_subcategories() {
        let mut agg = Aggregator::new();
        agg.record(&descriptor("compute", "ec2", "a"), verdict(Outcome::Detected, 2, Some(10.0)));
        agg.record(&descriptor("compute", "ec2", "b"), verdict(Outcome::NotDetected, 0, None));
        agg.record(&descriptor("compute", "lambda", "c"), verdict(Outcome::Detected, 1, Some(5.0)));

        let cat = &agg.rollups()["compute"];
        assert_eq!(cat.tests_run, 3);
        let sub_sum: u64 = cat.subcategories.values().map(|s| s.tests_run).sum();
        assert_eq!(cat.tests_run, sub_sum);
        assert_eq!(cat.detections_total, 3);
        assert_eq!(cat.detected_tests, 2);
        assert!((cat.savings_total - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn failures_keep_insertion_order_with_reasons() {
        let mut agg = Aggregator::new();
        agg.record(&descriptor("net", "", "z_first"), verdict(Outcome::Timeout, 0, None));
        agg.record(&descriptor("net", "", "a_second"), verdict(Outcome::Error, 0, None));

        let failures = &agg.rollups()["net"].failures;
        assert_eq!(failures[0].test_id, "z_first");
        assert_eq!(failures[0].outcome, Outcome::Timeout);
        assert_eq!(failures[0].reason, "timed out");
        assert_eq!(failures[1].test_id, "a_second");
        assert_eq!(failures[1].outcome, Outcome::Error);
        assert_eq!(failures[1].reason, "analyzer error (non-zero exit)");
        assert_eq!(agg.failures().len(), 2);
        assert!(agg.successes().is_empty());
    }

    #[test]
    fn absent_savings_contributes_nothing() {
        let mut agg = Aggregator::new();
        agg.record(&descriptor("db", "", "a"), verdict(Outcome::Detected, 1, None));
        agg.record(&descriptor("db", "", "b"), verdict(Outcome::Detected, 1, Some(0.0)));
        assert!((agg.savings_total() - 0.0).abs() < f64::EPSILON);
        assert_eq!(agg.detected_tests(), 2);
    }

    #[test]
    fn replay_yields_identical_rollups() {
        let inputs = vec![
            (descriptor("a", "x", "t1"), verdict(Outcome::Detected, 3, Some(1.5))),
            (descriptor("b", "", "t2"), verdict(Outcome::NotDetected, 0, None)),
            (descriptor("a", "y", "t3"), verdict(Outcome::Timeout, 0, None)),
        ];

        let run = |inputs: &[(TestDescriptor, Verdict)]| {
            let mut agg = Aggregator::new();
            for (d, v) in inputs {
                agg.record(d, v.clone());
            }
            serde_json::to_string(agg.rollups()).unwrap()
        };

        assert_eq!(run(&inputs), run(&inputs));
    }

    #[test]
    fn detection_rate_bounds() {
        assert!((detection_rate(0, 0) - 0.0).abs() < f64::EPSILON);
        assert!((detection_rate(2, 4) - 0.5).abs() < f64::EPSILON);
        assert!((detection_rate(4, 4) - 1.0).abs() < f64::EPSILON);
    }
}
