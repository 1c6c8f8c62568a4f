//! # Worker executor — one isolated, time-bounded run
//!
//! Spawns the worker as `interpreter <source_path>`, captures stdout/stderr
//! and exit status, and enforces a hard deadline. A run that exceeds the
//! deadline is abandoned and the child is killed on drop.
//!
//! Crashes and timeouts are classifications, not `Err` values: the watcher
//! needs the captured output either way, so every run yields an
//! [`ExecutionResult`].

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::time::timeout;

/// How one worker run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSignal {
    /// Exit code 0.
    Ok,
    /// Nonzero exit code (the worker crashed).
    NonZeroExit(i32),
    /// The hard deadline elapsed before the worker finished.
    Timeout,
    /// The supervisor could not run the worker at all (spawn/IO fault).
    Internal,
}

impl std::fmt::Display for ExitSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitSignal::Ok => write!(f, "ok"),
            ExitSignal::NonZeroExit(code) => write!(f, "exit code {code}"),
            ExitSignal::Timeout => write!(f, "timeout"),
            ExitSignal::Internal => write!(f, "internal error"),
        }
    }
}

/// Outcome of one worker run, consumed immediately for classification.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub succeeded: bool,
    pub signal: ExitSignal,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn duration_secs(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    fn failed(signal: ExitSignal, duration: Duration, stderr: String) -> Self {
        Self {
            succeeded: false,
            signal,
            duration,
            stdout: String::new(),
            stderr,
        }
    }
}

/// Runs the worker source under an interpreter with a hard deadline.
#[derive(Debug, Clone)]
pub struct WorkerProcess {
    interpreter: String,
    source_path: PathBuf,
    deadline: Duration,
}

impl WorkerProcess {
    pub fn new(
        interpreter: impl Into<String>,
        source_path: impl Into<PathBuf>,
        deadline: Duration,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            source_path: source_path.into(),
            deadline,
        }
    }

    /// Execute one run. Never returns `Err`: spawn failures classify as
    /// [`ExitSignal::Internal`] with the fault text in `stderr`.
    pub async fn execute(&self) -> ExecutionResult {
        let started = Instant::now();

        let spawned = Command::new(&self.interpreter)
            .arg(&self.source_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return ExecutionResult::failed(
                    ExitSignal::Internal,
                    started.elapsed(),
                    format!("failed to spawn '{} {}': {e}", self.interpreter, self.source_path.display()),
                );
            }
        };

        // Dropping the wait future on timeout drops the child, which kills it
        // thanks to kill_on_drop.
        match timeout(self.deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let duration = started.elapsed();
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                match output.status.code() {
                    Some(0) => ExecutionResult {
                        succeeded: true,
                        signal: ExitSignal::Ok,
                        duration,
                        stdout,
                        stderr,
                    },
                    Some(code) => ExecutionResult {
                        succeeded: false,
                        signal: ExitSignal::NonZeroExit(code),
                        duration,
                        stdout,
                        stderr,
                    },
                    // Killed by signal — treat like a crash with no code.
                    None => ExecutionResult {
                        succeeded: false,
                        signal: ExitSignal::NonZeroExit(-1),
                        duration,
                        stdout,
                        stderr,
                    },
                }
            }
            Ok(Err(e)) => ExecutionResult::failed(
                ExitSignal::Internal,
                started.elapsed(),
                format!("failed to collect worker output: {e}"),
            ),
            Err(_) => ExecutionResult::failed(
                ExitSignal::Timeout,
                started.elapsed(),
                format!(
                    "worker exceeded the {:.1}s execution deadline",
                    self.deadline.as_secs_f64()
                ),
            ),
        }
    }
}
