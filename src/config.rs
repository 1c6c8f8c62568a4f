//! Environment-sourced configuration for the watch loop.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default hard timeout for one worker execution.
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(10);
/// Default pause between supervisor cycles.
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_secs(3);
/// Default latency target (seconds) above which optimization mutations arm.
pub const DEFAULT_TARGET_LATENCY: f64 = 1.0;
/// How many worker source snapshots the genome history retains.
pub const DEFAULT_GENOME_CAPACITY: usize = 10;
/// How many ring-log lines the watcher retains for the API layer.
pub const DEFAULT_LOG_CAPACITY: usize = 100;
/// How many recent durations are retained for the optimization trigger.
pub const DURATION_WINDOW: usize = 10;
/// How many consecutive slow durations arm an optimization mutation.
pub const SLOW_STREAK: usize = 5;

/// Everything the watcher needs to supervise one worker.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Path to the active worker source file (overwritten on redeploy).
    pub worker_path: PathBuf,
    /// Interpreter invoked as `interpreter <worker_path>`.
    pub interpreter: String,
    /// Hard kill deadline for one worker run.
    pub worker_timeout: Duration,
    /// Sleep between cycles.
    pub cycle_interval: Duration,
    /// Sustained-latency threshold in seconds for optimization mutations.
    pub target_latency: f64,
    /// Genome history bound.
    pub genome_capacity: usize,
    /// Ring-log bound.
    pub log_capacity: usize,
}

impl WatchConfig {
    /// Build a config for `worker_path` with defaults, honoring the
    /// `TARGET_LATENCY` environment variable when it parses.
    pub fn for_worker(worker_path: impl Into<PathBuf>) -> Self {
        Self {
            worker_path: worker_path.into(),
            interpreter: "python3".to_string(),
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
            target_latency: target_latency_from_env(),
            genome_capacity: DEFAULT_GENOME_CAPACITY,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Read `TARGET_LATENCY` (float seconds). Unset or unparseable → default 1.0.
pub fn target_latency_from_env() -> f64 {
    env::var("TARGET_LATENCY")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(DEFAULT_TARGET_LATENCY)
}

/// Read `PORT` for the serving layer that sits in front of the watcher.
/// Not used by the core loop itself.
pub fn port_from_env() -> u16 {
    env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8000)
}
