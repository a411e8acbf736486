// src/classify.rs
//! Two-tier classification of analyzer output.
//!
//! Tier 1 parses stdout as a structured JSON report. Tier 2 falls back to a
//! case-insensitive keyword scan over the raw text. Some analyzer builds emit
//! machine-parseable JSON and others only human prose; the classifier degrades
//! instead of failing the run, and the fallback is never promoted past
//! `detection_count = 1`.

use crate::invoker::RawCapture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Classified outcome of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Detected,
    NotDetected,
    Error,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

/// The classified result of running the analyzer against one fixture.
/// Immutable once built; owned by the aggregator after recording.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub outcome: Outcome,
    /// Per-finding count. May exceed 1 for a single fixture; the detection
    /// RATE counts fixtures, not findings.
    pub detection_count: u64,
    /// Estimated monthly savings. Absent and zero are distinct: malformed
    /// numeric text parses to absent, never to zero.
    pub estimated_savings: Option<f64>,
    pub severity_counts: BTreeMap<Severity, u64>,
    /// Captured stdout + stderr, retained for audit.
    pub raw_output: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl Verdict {
    #[must_use]
    pub fn is_detection(&self) -> bool {
        self.outcome == Outcome::Detected
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.is_detection()
    }

    /// Short reason string for failure listings.
    #[must_use]
    pub fn failure_reason(&self) -> &'static str {
        match self.outcome {
            Outcome::Timeout => "timed out",
            Outcome::Error => "analyzer error (non-zero exit)",
            Outcome::NotDetected => "no detection",
            Outcome::Detected => "none",
        }
    }
}

/// Classifies one raw capture. Pure function of its input: the same capture
/// always yields the same verdict.
#[must_use]
pub fn classify(capture: &RawCapture) -> Verdict {
    let raw_output = combined_output(capture);
    #[allow(clippy::cast_possible_truncation)]
    let duration_ms = capture.duration.as_millis() as u64;

    let base = |outcome, detection_count, estimated_savings, severity_counts| Verdict {
        outcome,
        detection_count,
        estimated_savings,
        severity_counts,
        raw_output: raw_output.clone(),
        exit_code: capture.exit_code,
        duration_ms,
    };

    if capture.timed_out {
        return base(Outcome::Timeout, 0, None, BTreeMap::new());
    }
    if capture.exit_code != 0 {
        return base(Outcome::Error, 0, None, BTreeMap::new());
    }

    // Tier 1: structured JSON report
    if let Some(report) = parse_structured(&capture.stdout) {
        if report.count >= 1 {
            return base(
                Outcome::Detected,
                report.count,
                report.savings,
                report.severities,
            );
        }
    }

    // Tier 2: keyword heuristic over the full text
    if KEYWORD_RE.is_match(&raw_output) {
        return base(
            Outcome::Detected,
            1,
            scrape_dollar_amount(&raw_output),
            BTreeMap::new(),
        );
    }

    base(Outcome::NotDetected, 0, None, BTreeMap::new())
}

fn combined_output(capture: &RawCapture) -> String {
    if capture.stderr.is_empty() {
        capture.stdout.clone()
    } else {
        format!("{}\n{}", capture.stdout, capture.stderr)
    }
}

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(optimi[sz]ations?|recommendations?|recommends?|right-?sizing|savings?|over-?provisioned|idle|unused)\b",
    )
    .unwrap_or_else(|_| panic!("Invalid Regex"))
});

static DOLLAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s*([0-9][0-9,]*(?:\.[0-9]+)?)").unwrap_or_else(|_| panic!("Invalid Regex"))
});

/// Pulls the first `$<amount>` figure out of free text, if any.
fn scrape_dollar_amount(text: &str) -> Option<f64> {
    let caps = DOLLAR_RE.captures(text)?;
    parse_decimal(&caps[1])
}

/// Parses a decimal amount, tolerating thousands separators. Malformed text
/// yields `None` so it never corrupts the savings total as a silent zero.
fn parse_decimal(text: &str) -> Option<f64> {
    let cleaned = text.trim().trim_start_matches('$').replace(',', "");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

struct Structured {
    count: u64,
    savings: Option<f64>,
    severities: BTreeMap<Severity, u64>,
}

#[derive(Deserialize)]
struct AnalyzerReport {
    findings: Option<Vec<AnalyzerFinding>>,
    finding_count: Option<u64>,
    estimated_monthly_savings: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct AnalyzerFinding {
    severity: Option<String>,
    monthly_savings: Option<serde_json::Value>,
}

/// Tier-1 parse. Unknown fields are ignored; anything that is not a JSON
/// object with a recognizable shape yields `None` and defers to tier 2.
fn parse_structured(stdout: &str) -> Option<Structured> {
    let report: AnalyzerReport = serde_json::from_str(stdout.trim()).ok()?;

    let mut severities: BTreeMap<Severity, u64> = BTreeMap::new();
    let mut finding_savings = 0.0_f64;
    let mut any_finding_savings = false;

    let count = if let Some(findings) = &report.findings {
        for f in findings {
            if let Some(sev) = f.severity.as_deref().and_then(parse_severity) {
                *severities.entry(sev).or_insert(0) += 1;
            }
            if let Some(v) = f.monthly_savings.as_ref().and_then(json_decimal) {
                finding_savings += v;
                any_finding_savings = true;
            }
        }
        findings.len() as u64
    } else {
        report.finding_count?
    };

    // Top-level figure wins over the per-finding sum when both exist.
    let savings = report
        .estimated_monthly_savings
        .as_ref()
        .and_then(json_decimal)
        .or(any_finding_savings.then_some(finding_savings));

    Some(Structured {
        count,
        savings,
        severities,
    })
}

fn parse_severity(s: &str) -> Option<Severity> {
    match s.to_ascii_lowercase().as_str() {
        "high" | "critical" => Some(Severity::High),
        "medium" => Some(Severity::Medium),
        "low" => Some(Severity::Low),
        _ => None,
    }
}

/// Accepts either a JSON number or a numeric string like `"$1,234.50"`.
fn json_decimal(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        serde_json::Value::String(s) => parse_decimal(s),
        _ => None,
    }
}
