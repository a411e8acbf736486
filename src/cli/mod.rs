// src/cli/mod.rs
pub mod args;

pub use args::{Cli, Commands};

use crate::config::Config;
use crate::invoker::Invoker;
use crate::report;
use crate::runner::{CancelToken, Runner};
use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

/// Dispatches a parsed command line. Returns the process exit code:
/// 0 for a completed run (whatever the measured detection rate), non-zero
/// for fatal preconditions or a failed report write.
pub fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            corpus,
            analyzer,
            format,
            timeout,
            concurrency,
            threshold,
            output,
            verbose,
        } => run_command(RunOverrides {
            corpus,
            analyzer,
            format,
            timeout,
            concurrency,
            threshold,
            output,
            verbose,
        }),
        Commands::Probe { analyzer } => probe_command(analyzer),
    }
}

struct RunOverrides {
    corpus: Option<PathBuf>,
    analyzer: Option<String>,
    format: Option<String>,
    timeout: Option<u64>,
    concurrency: Option<usize>,
    threshold: Option<f64>,
    output: Option<PathBuf>,
    verbose: bool,
}

fn apply_overrides(config: &mut Config, overrides: RunOverrides) {
    if let Some(corpus) = overrides.corpus {
        config.corpus_root = corpus;
    }
    if let Some(cmd) = overrides.analyzer {
        config.analyzer_cmd = cmd;
    }
    if let Some(fmt) = overrides.format {
        config.analyzer_format = Some(fmt);
    }
    if let Some(secs) = overrides.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(n) = overrides.concurrency {
        config.concurrency = n.max(1);
    }
    if let Some(t) = overrides.threshold {
        config.alert_threshold = t;
    }
    if let Some(dir) = overrides.output {
        config.output_dir = dir;
    }
    config.verbose = overrides.verbose;
}

fn run_command(overrides: RunOverrides) -> Result<i32> {
    let mut config = Config::load();
    apply_overrides(&mut config, overrides);
    let output_dir = config.output_dir.clone();

    let mut runner = Runner::new(config);
    let report = runner.run(&CancelToken::new())?;

    report::print_narrative(&report);

    // The in-memory report survives a failed write; the narrative above is
    // already on screen, so no aggregated work is lost.
    match report::write_artifacts(&report, &output_dir) {
        Ok((json_path, text_path)) => {
            println!();
            println!(
                "{} {} and {}",
                "Wrote".green(),
                json_path.display(),
                text_path.display()
            );
            Ok(0)
        }
        Err(e) => {
            eprintln!("{} {e}", "[!]".red().bold());
            Ok(1)
        }
    }
}

fn probe_command(analyzer: Option<String>) -> Result<i32> {
    let mut config = Config::load();
    if let Some(cmd) = analyzer {
        config.analyzer_cmd = cmd;
    }
    let invoker = Invoker::from_config(&config)?;
    let banner = invoker.health_check()?;
    println!("{} {} ({banner})", "OK".green().bold(), invoker.program());
    Ok(0)
}
