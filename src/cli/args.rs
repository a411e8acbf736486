use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "costprobe", version, about = "Fixture-corpus detection harness")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full corpus and write detection-rate reports
    Run {
        /// Corpus root directory
        #[arg(long, value_name = "DIR")]
        corpus: Option<PathBuf>,
        /// Analyzer command template, e.g. "costwatch analyze"
        #[arg(long, value_name = "CMD")]
        analyzer: Option<String>,
        /// Value for the analyzer's --format flag
        #[arg(long, value_name = "FMT")]
        format: Option<String>,
        /// Per-invocation timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Parallel invoker tasks
        #[arg(long, short = 'j', value_name = "N")]
        concurrency: Option<usize>,
        /// Detection-rate threshold below which categories enter the roadmap
        #[arg(long, value_name = "RATE")]
        threshold: Option<f64>,
        /// Directory for report artifacts
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
        /// Per-fixture progress on stderr
        #[arg(long, short)]
        verbose: bool,
    },
    /// Health-check the analyzer binary and exit
    Probe {
        /// Analyzer command template
        #[arg(long, value_name = "CMD")]
        analyzer: Option<String>,
    },
}
