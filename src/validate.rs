//! # Candidate validation — parse-only syntax checks
//!
//! A generated candidate must be syntactically well-formed before it may
//! replace the active worker source. The check parses only; candidate code is
//! never executed.

use std::future::Future;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Seam between the mutation protocol and the concrete syntax checker.
pub trait SourceValidator: Send + Sync {
    /// True when `source` parses cleanly. Must have no side effects and must
    /// never execute the candidate.
    fn is_well_formed(&self, source: &str) -> impl Future<Output = bool> + Send;
}

/// Parses the candidate with stdlib `ast.parse` — a pure parse, no execution.
/// The candidate is piped over stdin so nothing is written to disk.
const PARSE_SNIPPET: &str = "import sys, ast\nast.parse(sys.stdin.read())\n";

/// Validates Python source by piping it into `python3 -c "ast.parse(...)"`.
#[derive(Debug, Clone)]
pub struct PythonSyntaxValidator {
    interpreter: String,
}

impl Default for PythonSyntaxValidator {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl PythonSyntaxValidator {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl SourceValidator for PythonSyntaxValidator {
    async fn is_well_formed(&self, source: &str) -> bool {
        let spawned = Command::new(&self.interpreter)
            .args(["-c", PARSE_SNIPPET])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(interpreter = %self.interpreter, "validator spawn failed: {e}");
                return false;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            // The interpreter may exit before reading everything; a broken
            // pipe here is resolved by the exit status below.
            let _ = stdin.write_all(source.as_bytes()).await;
        }

        match child.wait_with_output().await {
            Ok(output) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    debug!("candidate rejected by parser: {}", stderr.trim());
                }
                output.status.success()
            }
            Err(e) => {
                warn!("validator wait failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // "true" and "false" stand in for the interpreter so these tests exercise
    // the subprocess plumbing without requiring a Python installation.

    #[tokio::test]
    async fn test_zero_exit_means_well_formed() {
        let v = PythonSyntaxValidator::new("true");
        assert!(v.is_well_formed("anything").await);
    }

    #[tokio::test]
    async fn test_nonzero_exit_means_rejected() {
        let v = PythonSyntaxValidator::new("false");
        assert!(!v.is_well_formed("anything").await);
    }

    #[tokio::test]
    async fn test_unspawnable_interpreter_rejects() {
        let v = PythonSyntaxValidator::new("definitely-not-a-real-binary");
        assert!(!v.is_well_formed("x = 1").await);
    }
}
