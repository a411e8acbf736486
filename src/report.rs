// src/report.rs
//! Report assembly and rendering.
//!
//! A `RunReport` is built once from the aggregator's final state. Both output
//! forms (machine-readable JSON summary, human-readable narrative) derive from
//! the same value with no re-computation from raw verdicts.

use crate::aggregate::{detection_rate, Aggregator, CategoryRollup, TestRecord};
use crate::classify::Outcome;
use crate::error::{HarnessError, Result};
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Remediation priority for a below-threshold category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
}

impl Priority {
    fn for_rate(rate: f64) -> Self {
        if rate == 0.0 {
            Priority::Critical
        } else if rate < 0.3 {
            Priority::High
        } else {
            Priority::Medium
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
        }
    }
}

/// One improvement-roadmap entry for a category below the alert threshold.
#[derive(Debug, Clone, Serialize)]
pub struct RoadmapEntry {
    pub category: String,
    pub detection_rate: f64,
    pub priority: Priority,
    pub gap: String,
}

/// The terminal artifact of a run. Write-once.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    /// False when the run was cancelled before draining the corpus; the
    /// report is still internally consistent for the fixtures it covers.
    pub completed: bool,
    pub tests_run: u64,
    pub detected_tests: u64,
    pub detections_total: u64,
    pub detection_rate: f64,
    pub total_savings: f64,
    pub categories: BTreeMap<String, CategoryRollup>,
    pub failures: Vec<TestRecord>,
    pub roadmap: Vec<RoadmapEntry>,
}

impl RunReport {
    /// Builds the report from the aggregator's final state.
    #[must_use]
    pub fn build(run_id: String, aggregator: Aggregator, threshold: f64, completed: bool) -> Self {
        let tests_run = aggregator.tests_run();
        let detected_tests = aggregator.detected_tests();
        let detections_total = aggregator.detections_total();
        let total_savings = aggregator.savings_total();
        let (categories, _successes, failures) = aggregator.into_parts();
        let roadmap = build_roadmap(&categories, threshold);

        Self {
            run_id,
            completed,
            tests_run,
            detected_tests,
            detections_total,
            detection_rate: detection_rate(detected_tests, tests_run),
            total_savings,
            categories,
            failures,
            roadmap,
        }
    }

    /// Machine-readable summary.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One roadmap entry per category below the threshold, ascending by rate.
/// Ties break on category name so the ordering is reproducible.
fn build_roadmap(
    categories: &BTreeMap<String, CategoryRollup>,
    threshold: f64,
) -> Vec<RoadmapEntry> {
    let mut entries: Vec<RoadmapEntry> = categories
        .iter()
        .filter(|(_, rollup)| rollup.detection_rate() < threshold)
        .map(|(name, rollup)| {
            let rate = rollup.detection_rate();
            RoadmapEntry {
                category: name.clone(),
                detection_rate: rate,
                priority: Priority::for_rate(rate),
                gap: describe_gap(name, rollup),
            }
        })
        .collect();
    entries.sort_by(|a, b| {
        a.detection_rate
            .total_cmp(&b.detection_rate)
            .then_with(|| a.category.cmp(&b.category))
    });
    entries
}

/// Summarizes a category's failure pattern for its roadmap entry.
fn describe_gap(name: &str, rollup: &CategoryRollup) -> String {
    let mut timeouts = 0_u64;
    let mut errors = 0_u64;
    let mut misses = 0_u64;
    for f in &rollup.failures {
        match f.outcome {
            Outcome::Timeout => timeouts += 1,
            Outcome::NotDetected => misses += 1,
            Outcome::Error => errors += 1,
            Outcome::Detected => {}
        }
    }

    let mut parts = Vec::new();
    if misses > 0 {
        parts.push(format!("{misses} undetected"));
    }
    if errors > 0 {
        parts.push(format!("{errors} analyzer errors"));
    }
    if timeouts > 0 {
        parts.push(format!("{timeouts} timeouts"));
    }
    if parts.is_empty() {
        return format!("no fixtures exercised for '{name}'");
    }
    format!(
        "{} of {} fixtures in '{name}' failed ({})",
        rollup.failures.len(),
        rollup.tests_run,
        parts.join(", ")
    )
}

/// Renders the human-readable narrative as plain text. The console printer
/// adds color on top of the same structure.
#[must_use]
pub fn render_narrative(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Detection coverage report ({})", report.run_id);
    if !report.completed {
        let _ = writeln!(out, "NOTE: run was cancelled; results are partial.");
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Overall: {}/{} fixtures detected ({:.1}%), {} findings, est. ${:.2}/month savings",
        report.detected_tests,
        report.tests_run,
        report.detection_rate * 100.0,
        report.detections_total,
        report.total_savings
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Per-category breakdown:");
    for (name, rollup) in &report.categories {
        let _ = writeln!(
            out,
            "  {name}: {}/{} ({:.1}%), {} findings, ${:.2}/month",
            rollup.detected_tests,
            rollup.tests_run,
            rollup.detection_rate() * 100.0,
            rollup.detections_total,
            rollup.savings_total
        );
        for (sub, s) in &rollup.subcategories {
            if sub.is_empty() {
                continue;
            }
            let _ = writeln!(
                out,
                "    {sub}: {}/{} ({:.1}%)",
                s.detected_tests,
                s.tests_run,
                detection_rate(s.detected_tests, s.tests_run) * 100.0
            );
        }
    }

    if !report.failures.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Failures:");
        for f in &report.failures {
            let location = if f.subcategory.is_empty() {
                f.category.clone()
            } else {
                format!("{}/{}", f.category, f.subcategory)
            };
            let _ = writeln!(
                out,
                "  [{location}] {}: {}",
                f.test_id,
                f.verdict.failure_reason()
            );
        }
    }

    let _ = writeln!(out);
    if report.roadmap.is_empty() {
        let _ = writeln!(out, "Improvement roadmap: no categories below threshold.");
    } else {
        let _ = writeln!(out, "Improvement roadmap (worst first):");
        for entry in &report.roadmap {
            let _ = writeln!(
                out,
                "  [{}] {} at {:.1}%: {}",
                entry.priority.label(),
                entry.category,
                entry.detection_rate * 100.0,
                entry.gap
            );
        }
    }

    out
}

/// Prints the narrative to stdout with priority coloring.
pub fn print_narrative(report: &RunReport) {
    for line in render_narrative(report).lines() {
        if line.contains("[CRITICAL]") {
            println!("{}", line.red().bold());
        } else if line.contains("[HIGH]") {
            println!("{}", line.red());
        } else if line.contains("[MEDIUM]") {
            println!("{}", line.yellow());
        } else if line.starts_with("Overall:") {
            println!("{}", line.bold());
        } else {
            println!("{line}");
        }
    }
}

/// Writes both artifacts under `output_dir`, filenames keyed by run id so
/// successive runs never overwrite each other. Returns the written paths.
///
/// # Errors
/// Returns `ReportWrite` on any filesystem failure; the in-memory report
/// remains available to the caller.
pub fn write_artifacts(report: &RunReport, output_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(output_dir).map_err(|source| HarnessError::ReportWrite {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let json_path = output_dir.join(format!("{}-summary.json", report.run_id));
    let json = serde_json::to_string_pretty(report).map_err(|e| HarnessError::ReportWrite {
        path: json_path.clone(),
        source: std::io::Error::other(e),
    })?;
    fs::write(&json_path, json).map_err(|source| HarnessError::ReportWrite {
        path: json_path.clone(),
        source,
    })?;

    let text_path = output_dir.join(format!("{}-report.txt", report.run_id));
    fs::write(&text_path, render_narrative(report)).map_err(|source| {
        HarnessError::ReportWrite {
            path: text_path.clone(),
            source,
        }
    })?;

    Ok((json_path, text_path))
}

/// Fresh run identifier: unix seconds plus pid, unique across successive runs.
#[must_use]
pub fn new_run_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    format!("run-{secs}-{}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregator;
    use crate::catalog::TestDescriptor;
    use crate::classify::{Outcome, Verdict};

    fn descriptor(category: &str, test_id: &str) -> TestDescriptor {
        TestDescriptor {
            category: category.to_string(),
            subcategory: String::new(),
            test_id: test_id.to_string(),
            fixture_path: PathBuf::from(format!("{category}/{test_id}.json")),
        }
    }

    fn verdict(outcome: Outcome, detection_count: u64) -> Verdict {
        Verdict {
            outcome,
            detection_count,
            estimated_savings: None,
            severity_counts: BTreeMap::new(),
            raw_output: String::new(),
            exit_code: 0,
            duration_ms: 1,
        }
    }

    #[test]
    fn empty_corpus_report() {
        let report = RunReport::build("run-0-0".to_string(), Aggregator::new(), 0.5, true);
        assert_eq!(report.tests_run, 0);
        assert!((report.detection_rate - 0.0).abs() < f64::EPSILON);
        assert!(report.roadmap.is_empty());
        assert!(report.detection_rate.is_finite());
    }

    #[test]
    fn all_detections_rate_is_one() {
        let mut agg = Aggregator::new();
        agg.record(&descriptor("c", "a"), verdict(Outcome::Detected, 1));
        agg.record(&descriptor("c", "b"), verdict(Outcome::Detected, 2));
        agg.record(&descriptor("c", "c"), verdict(Outcome::Detected, 3));
        let report = RunReport::build("r".to_string(), agg, 0.5, true);
        assert_eq!(report.detected_tests, 3);
        assert_eq!(report.detections_total, 6);
        assert!((report.detection_rate - 1.0).abs() < f64::EPSILON);
        assert!(report.roadmap.is_empty());
    }

    #[test]
    fn mixed_categories_roadmap_priorities() {
        let mut agg = Aggregator::new();
        agg.record(&descriptor("storage", "s1"), verdict(Outcome::Detected, 1));
        agg.record(&descriptor("storage", "s2"), verdict(Outcome::NotDetected, 0));
        agg.record(&descriptor("network", "n1"), verdict(Outcome::NotDetected, 0));
        agg.record(&descriptor("network", "n2"), verdict(Outcome::NotDetected, 0));
        let report = RunReport::build("r".to_string(), agg, 0.6, true);

        assert!((report.categories["storage"].detection_rate() - 0.5).abs() < f64::EPSILON);
        assert!((report.categories["network"].detection_rate() - 0.0).abs() < f64::EPSILON);

        // Ascending by rate: network (0.0) first, then storage (0.5).
        assert_eq!(report.roadmap.len(), 2);
        assert_eq!(report.roadmap[0].category, "network");
        assert_eq!(report.roadmap[0].priority, Priority::Critical);
        assert_eq!(report.roadmap[1].category, "storage");
        assert_eq!(report.roadmap[1].priority, Priority::Medium);
    }

    #[test]
    fn roadmap_gap_counts_failure_kinds() {
        let mut agg = Aggregator::new();
        agg.record(&descriptor("compute", "t1"), verdict(Outcome::Timeout, 0));
        agg.record(&descriptor("compute", "t2"), verdict(Outcome::Error, 0));
        agg.record(&descriptor("compute", "t3"), verdict(Outcome::NotDetected, 0));
        let report = RunReport::build("r".to_string(), agg, 0.5, true);

        let entry = &report.roadmap[0];
        assert!(entry.gap.contains("1 undetected"));
        assert!(entry.gap.contains("1 analyzer errors"));
        assert!(entry.gap.contains("1 timeouts"));
        assert!(entry.gap.contains("3 of 3 fixtures"));
    }

    #[test]
    fn priority_bands() {
        assert_eq!(Priority::for_rate(0.0), Priority::Critical);
        assert_eq!(Priority::for_rate(0.1), Priority::High);
        assert_eq!(Priority::for_rate(0.29), Priority::High);
        assert_eq!(Priority::for_rate(0.3), Priority::Medium);
        assert_eq!(Priority::for_rate(0.49), Priority::Medium);
    }

    #[test]
    fn narrative_and_json_derive_from_same_value() {
        let mut agg = Aggregator::new();
        agg.record(&descriptor("db", "slow"), verdict(Outcome::Timeout, 0));
        let report = RunReport::build("run-1-1".to_string(), agg, 0.5, true);

        let narrative = render_narrative(&report);
        assert!(narrative.contains("run-1-1"));
        assert!(narrative.contains("timed out"));
        assert!(narrative.contains("[CRITICAL]"));

        let json = report.to_json().unwrap();
        assert!(json.contains("\"run_id\": \"run-1-1\""));
        assert!(json.contains("\"tests_run\": 1"));
    }

    #[test]
    fn cancelled_report_is_flagged_partial() {
        let mut agg = Aggregator::new();
        agg.record(&descriptor("a", "t"), verdict(Outcome::Detected, 1));
        let report = RunReport::build("r".to_string(), agg, 0.5, false);
        assert_eq!(report.tests_run, 1);
        assert!(render_narrative(&report).contains("results are partial"));
    }

    #[test]
    fn artifacts_written_with_run_id_in_name() {
        let dir = tempfile::tempdir().unwrap();
        let report = RunReport::build("run-7-7".to_string(), Aggregator::new(), 0.5, true);
        let (json_path, text_path) = write_artifacts(&report, dir.path()).unwrap();
        assert!(json_path.ends_with("run-7-7-summary.json"));
        assert!(text_path.ends_with("run-7-7-report.txt"));
        assert!(json_path.exists());
        assert!(text_path.exists());
    }

    #[test]
    fn run_ids_embed_process_identity() {
        let id = new_run_id();
        assert!(id.starts_with("run-"));
        assert!(id.ends_with(&std::process::id().to_string()));
    }
}
