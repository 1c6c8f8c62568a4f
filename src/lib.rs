//! # symbiont — a self-healing worker supervisor
//!
//! Supervises a short-lived worker process on a fixed cycle. Crashes,
//! timeouts, and sustained latency breaches trigger the mutation protocol:
//! the current source is snapshotted into the bounded genome history, an LLM
//! backend generates a replacement, the candidate is parse-checked, and on
//! success it is atomically redeployed as the next generation.
//!
//! ## Layout
//! - [`executor`] — one isolated, time-bounded worker run
//! - [`watcher`] — the supervision loop, mutation protocol, and the
//!   [`watcher::WatcherHandle`] observability surface
//! - [`architect`] — the [`architect::CodeGenerator`] seam and its Groq-backed
//!   implementation
//! - [`validate`] — parse-only candidate validation
//! - [`genome`] — bounded source snapshot history
//! - [`chaos`] — deliberate fault injection for exercising the healing loop
//! - [`config`] / [`error`] — environment configuration and the error taxonomy

pub mod architect;
pub mod chaos;
pub mod config;
pub mod error;
pub mod executor;
pub mod genome;
pub mod validate;
pub mod watcher;

pub use architect::{CodeGenerator, Generated, GroqArchitect, MutationIntent};
pub use chaos::{ChaosKind, FaultInjector};
pub use config::WatchConfig;
pub use error::WatchError;
pub use executor::{ExecutionResult, ExitSignal, WorkerProcess};
pub use genome::{GenomeStore, GenomeVersion, WorkerSnapshot};
pub use validate::{PythonSyntaxValidator, SourceValidator};
pub use watcher::{Status, StatusReport, Watcher, WatcherHandle};
