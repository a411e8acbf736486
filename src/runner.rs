// src/runner.rs
//! Run controller: health check, parallel invocation, ordered aggregation.

use crate::aggregate::Aggregator;
use crate::catalog::{self, TestDescriptor};
use crate::classify::{self, Verdict};
use crate::config::Config;
use crate::error::Result;
use crate::invoker::Invoker;
use crate::report::{self, RunReport};
use rayon::prelude::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared with the worker pool. Cancelling
/// stops dispatch of new fixtures; in-flight invocations finish (or hit
/// their own timeout) and a partial report is still produced.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Controller lifecycle. `Failed` is reachable only from `HealthChecking`;
/// per-fixture failures keep the run in `Running`. A spawn failure after
/// preflight (analyzer binary vanishing mid-run) also surfaces as an error,
/// with the controller left in `Running` since the run was underway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    HealthChecking,
    Running,
    Reporting,
    Done,
    Failed,
}

/// Orchestrates one complete corpus run.
pub struct Runner {
    config: Config,
    state: RunState,
}

impl Runner {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: RunState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Drives catalog → invoker → classifier → aggregator → report.
    ///
    /// # Errors
    /// Returns an error only for fatal preconditions (unreadable corpus root,
    /// analyzer not invocable, bad command template). Per-fixture failures
    /// become verdicts in the report. A mid-run spawn failure is also fatal;
    /// the state stays `Running` in that case because `Failed` marks
    /// preflight rejection, not an interrupted run.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<RunReport> {
        self.state = RunState::HealthChecking;
        let preflight = self.preflight();
        let (invoker, descriptors) = match preflight {
            Ok(parts) => parts,
            Err(e) => {
                self.state = RunState::Failed;
                return Err(e);
            }
        };

        self.state = RunState::Running;
        let outcomes = self.drain_corpus(&invoker, &descriptors, cancel)?;

        self.state = RunState::Reporting;
        let mut aggregator = Aggregator::new();
        // Applied in catalog order, not completion order, so reports are
        // reproducible across concurrency levels.
        for (descriptor, verdict) in descriptors.iter().zip(outcomes) {
            if let Some(verdict) = verdict {
                aggregator.record(descriptor, verdict);
            }
        }

        let report = RunReport::build(
            report::new_run_id(),
            aggregator,
            self.config.alert_threshold,
            !cancel.is_cancelled(),
        );

        self.state = RunState::Done;
        Ok(report)
    }

    /// Fatal-precondition phase: command template, analyzer probe, corpus.
    fn preflight(&self) -> Result<(Invoker, Vec<TestDescriptor>)> {
        self.config.validate()?;
        let invoker = Invoker::from_config(&self.config)?;
        let banner = invoker.health_check()?;
        if self.config.verbose {
            eprintln!("analyzer: {banner}");
        }
        let descriptors = catalog::discover(&self.config.corpus_root)?;
        Ok((invoker, descriptors))
    }

    /// Invokes and classifies every fixture on a bounded worker pool.
    /// The result vector is index-aligned with `descriptors`; entries are
    /// `None` for fixtures skipped after cancellation.
    fn drain_corpus(
        &self,
        invoker: &Invoker,
        descriptors: &[TestDescriptor],
        cancel: &CancelToken,
    ) -> Result<Vec<Option<Verdict>>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.concurrency.max(1))
            .build()
            .map_err(|e| crate::error::HarnessError::WorkerPool(e.to_string()))?;

        let verbose = self.config.verbose;
        let total = descriptors.len();

        let results: Vec<Option<Result<Verdict>>> = pool.install(|| {
            descriptors
                .par_iter()
                .enumerate()
                .map(|(idx, descriptor)| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    if verbose {
                        eprintln!(
                            "[{}/{total}] {}/{}",
                            idx + 1,
                            descriptor.category,
                            descriptor.test_id
                        );
                    }
                    Some(invoker.invoke(descriptor).map(|cap| classify::classify(&cap)))
                })
                .collect()
        });

        // Spawn failure mid-run is fatal, same as a failed health check.
        results
            .into_iter()
            .map(|slot| slot.transpose())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn corpus_with(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for f in files {
            let path = dir.path().join(f);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "{}").unwrap();
        }
        dir
    }

    fn config_for(root: PathBuf, cmd: &str) -> Config {
        let mut config = Config::new();
        config.corpus_root = root;
        config.analyzer_cmd = cmd.to_string();
        config.concurrency = 2;
        config
    }

    #[test]
    fn missing_corpus_root_fails_before_dispatch() {
        let config = config_for(PathBuf::from("/nonexistent_corpus_xyz"), "cargo build");
        let mut runner = Runner::new(config);
        assert_eq!(runner.state(), RunState::Idle);
        assert!(runner.run(&CancelToken::new()).is_err());
        assert_eq!(runner.state(), RunState::Failed);
    }

    #[test]
    fn missing_binary_fails_health_check() {
        let corpus = corpus_with(&["storage/a.json"]);
        let config = config_for(corpus.path().to_path_buf(), "costprobe_no_such_binary_xyz");
        let mut runner = Runner::new(config);
        assert!(runner.run(&CancelToken::new()).is_err());
        assert_eq!(runner.state(), RunState::Failed);
    }

    #[test]
    fn empty_corpus_completes_with_zero_tests() {
        let corpus = corpus_with(&[]);
        let config = config_for(corpus.path().to_path_buf(), "cargo build");
        let mut runner = Runner::new(config);
        let report = runner.run(&CancelToken::new()).unwrap();
        assert_eq!(runner.state(), RunState::Done);
        assert_eq!(report.tests_run, 0);
        assert!((report.detection_rate - 0.0).abs() < f64::EPSILON);
        assert!(report.roadmap.is_empty());
    }

    #[test]
    fn pre_cancelled_run_yields_empty_partial_report() {
        let corpus = corpus_with(&["storage/a.json", "storage/b.json"]);
        let config = config_for(corpus.path().to_path_buf(), "cargo build");
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut runner = Runner::new(config);
        let report = runner.run(&cancel).unwrap();
        assert_eq!(report.tests_run, 0);
        assert!(!report.completed);
    }
}
