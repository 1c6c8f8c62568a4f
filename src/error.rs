//! Crate-level error taxonomy.
//!
//! Worker crashes and timeouts are deliberately *not* errors — they are
//! classifications that drive the mutation protocol (see `executor::ExitSignal`).
//! The variants here cover the supervisor's own fallible machinery.

use thiserror::Error;

/// Errors that can abort a single mutation attempt or a supervisor cycle.
///
/// None of these are fatal to the watch loop: generation and validation
/// failures abort the current mutation attempt only, and internal faults are
/// caught at the top of each cycle.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The external code-generation service failed, timed out, or returned
    /// content that could not be used as source text.
    #[error("code generation failed: {0}")]
    Generation(String),

    /// The generated candidate did not pass the parse-only syntax check.
    #[error("candidate failed syntax validation: {0}")]
    Validation(String),

    /// A supervisor-side I/O fault (reading/writing the worker source,
    /// spawning the validator, persisting a backup).
    #[error("supervisor I/O fault: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport failure talking to the code-generation service.
    #[error("generation service transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Required configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl WatchError {
    /// True when this error should abort only the in-flight mutation attempt,
    /// leaving the active worker source untouched.
    pub fn aborts_mutation_only(&self) -> bool {
        matches!(
            self,
            WatchError::Generation(_) | WatchError::Validation(_) | WatchError::Http(_)
        )
    }
}
