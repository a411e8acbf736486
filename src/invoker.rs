// src/invoker.rs
//! External analyzer invocation.
//!
//! One child process per fixture, stdout/stderr captured on reader threads,
//! wall-clock bounded by the configured timeout. The invoker never interprets
//! output; classification happens downstream.

use crate::catalog::TestDescriptor;
use crate::config::Config;
use crate::error::{HarnessError, Result};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Raw capture of one analyzer invocation. Interpretation is the
/// classifier's job.
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
    pub timed_out: bool,
}

/// Invokes the analyzer as `<binary> [args..] <fixture> [--format <fmt>]`.
#[derive(Debug, Clone)]
pub struct Invoker {
    program: String,
    base_args: Vec<String>,
    format: Option<String>,
    timeout: Duration,
}

impl Invoker {
    /// Builds an invoker from the configured command template.
    ///
    /// # Errors
    /// Returns `CommandTemplate` if the template is empty or unparseable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let parts = shell_words::split(&config.analyzer_cmd)
            .map_err(|e| HarnessError::CommandTemplate(e.to_string()))?;
        let Some((program, base_args)) = parts.split_first() else {
            return Err(HarnessError::CommandTemplate(
                "analyzer command is empty".to_string(),
            ));
        };
        Ok(Self {
            program: program.clone(),
            base_args: base_args.to_vec(),
            format: config.analyzer_format.clone(),
            timeout: config.timeout,
        })
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Upfront probe that the analyzer binary is invocable at all.
    /// Runs `<binary> --version` and requires a zero exit.
    ///
    /// # Errors
    /// Returns `AnalyzerUnavailable` on spawn failure or non-zero exit.
    pub fn health_check(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .map_err(|e| HarnessError::AnalyzerUnavailable {
                command: self.program.clone(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(HarnessError::AnalyzerUnavailable {
                command: self.program.clone(),
                reason: format!(
                    "--version exited with {}",
                    output.status.code().unwrap_or(-1)
                ),
            });
        }
        let banner = String::from_utf8_lossy(&output.stdout);
        Ok(banner.lines().next().unwrap_or_default().to_string())
    }

    /// Runs the analyzer against one fixture.
    ///
    /// # Errors
    /// Returns `AnalyzerUnavailable` only when the process cannot be spawned;
    /// every other failure mode (timeout, non-zero exit) is data in the
    /// returned capture.
    pub fn invoke(&self, descriptor: &TestDescriptor) -> Result<RawCapture> {
        self.run_once(&descriptor.fixture_path)
    }

    fn run_once(&self, fixture: &Path) -> Result<RawCapture> {
        let start = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args).arg(fixture);
        if let Some(fmt) = &self.format {
            cmd.arg("--format").arg(fmt);
        }

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HarnessError::AnalyzerUnavailable {
                command: self.program.clone(),
                reason: e.to_string(),
            })?;

        let out_thread = drain_pipe(child.stdout.take());
        let err_thread = drain_pipe(child.stderr.take());

        let (status, timed_out) = wait_with_timeout(&mut child, start, self.timeout);

        let stdout = out_thread.map_or_else(String::new, |t| t.join().unwrap_or_default());
        let stderr = err_thread.map_or_else(String::new, |t| t.join().unwrap_or_default());

        Ok(RawCapture {
            stdout,
            stderr,
            exit_code: status,
            duration: start.elapsed(),
            timed_out,
        })
    }
}

fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> Option<thread::JoinHandle<String>> {
    pipe.map(|mut r| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = r.read_to_string(&mut buf);
            buf
        })
    })
}

/// Polls the child until it exits or the deadline passes, killing it in the
/// latter case. Returns `(exit_code, timed_out)`.
fn wait_with_timeout(child: &mut Child, start: Instant, timeout: Duration) -> (i32, bool) {
    const POLL_INTERVAL: Duration = Duration::from_millis(25);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return (status.code().unwrap_or(-1), false),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return (-1, true);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                return (-1, false);
            }
        }
    }
}
