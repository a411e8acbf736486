// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Fatal-path errors for the harness.
///
/// Per-fixture failures (timeouts, non-zero exits, unparsable output) are
/// deliberately NOT represented here: they become `Verdict`s and flow into
/// the report's failure lists instead of aborting the run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("corpus root does not exist or is not readable: {path}")]
    CorpusRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("analyzer is not invocable ({command}): {reason}")]
    AnalyzerUnavailable { command: String, reason: String },

    #[error("invalid analyzer command template: {0}")]
    CommandTemplate(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error("failed to write report artifact {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, HarnessError>;
