//! # Watcher — the supervise→detect→mutate→validate→redeploy loop
//!
//! ```text
//! WorkerProcess ──► classify ──► CodeGenerator ──► SourceValidator
//!      ▲                                                │
//!      │                GenomeStore ◄───────────────────┤
//!      └──────────────── redeploy ◄─────────────────────┘
//! ```
//!
//! One background task runs the loop; it is the single writer of
//! [`WatcherState`] and the genome store. Everything the serving layer needs
//! (status, logs, history, chaos) goes through the cloneable
//! [`WatcherHandle`], which only ever takes short snapshot reads.
//!
//! The loop never terminates on its own: worker crashes drive the mutation
//! protocol, mutation failures revert to the previous source, and
//! supervisor-side faults are logged and swallowed. Only [`WatcherHandle::stop`]
//! ends it.

use std::collections::VecDeque;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Local;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

use crate::architect::{CodeGenerator, MutationIntent};
use crate::chaos::{ChaosKind, Corruption, FaultInjector};
use crate::config::{WatchConfig, DURATION_WINDOW, SLOW_STREAK};
use crate::error::WatchError;
use crate::executor::{ExecutionResult, ExitSignal, WorkerProcess};
use crate::genome::{GenomeStore, GenomeVersion, WorkerSnapshot};
use crate::validate::SourceValidator;

/// Marker embedded in a trigger context to request an optimization mutation.
pub const PERF_MARKER: &str = "OPTIMIZATION_NEEDED";

/// How many recent durations the status view exposes.
const STATUS_DURATIONS: usize = 5;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of the supervised worker, as seen by the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Initializing,
    Alive,
    Crashed,
    Timeout,
    Mutating,
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Initializing => write!(f, "INITIALIZING"),
            Status::Alive => write!(f, "ALIVE"),
            Status::Crashed => write!(f, "CRASHED"),
            Status::Timeout => write!(f, "TIMEOUT"),
            Status::Mutating => write!(f, "MUTATING"),
            Status::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// WatcherState — single writer: the loop
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct WatcherState {
    generation: u64,
    status: Status,
    last_mutation: String,
    crash_count: u64,
    success_count: u64,
    /// Full retention window for the optimization trigger (cap 10); the
    /// status view exposes only the last 5.
    recent_durations: VecDeque<f64>,
    logs: VecDeque<String>,
    last_error: Option<String>,
    log_capacity: usize,
}

impl WatcherState {
    fn new(log_capacity: usize) -> Self {
        Self {
            generation: 1,
            status: Status::Initializing,
            last_mutation: "None".to_string(),
            crash_count: 0,
            success_count: 0,
            recent_durations: VecDeque::with_capacity(DURATION_WINDOW),
            logs: VecDeque::new(),
            last_error: None,
            log_capacity,
        }
    }

    /// Append a timestamped line to the bounded ring and emit a tracing event.
    fn log(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!("{message}");
        let stamp = Local::now().format("%H:%M:%S%.3f");
        while self.logs.len() >= self.log_capacity.max(1) {
            self.logs.pop_front();
        }
        self.logs.push_back(format!("[{stamp}] {message}"));
    }

    fn record_duration(&mut self, secs: f64) {
        while self.recent_durations.len() >= DURATION_WINDOW {
            self.recent_durations.pop_front();
        }
        self.recent_durations.push_back(secs);
    }
}

/// Consistent snapshot of the watcher for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generation: u64,
    pub status: Status,
    pub last_mutation: String,
    pub crash_count: u64,
    pub success_count: u64,
    pub avg_duration: f64,
    pub recent_durations: Vec<f64>,
    pub log_count: usize,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// WatcherHandle — the read-only surface plus stop/chaos
// ---------------------------------------------------------------------------

/// Cloneable handle to a running watcher for the serving layer.
#[derive(Clone)]
pub struct WatcherHandle {
    state: Arc<Mutex<WatcherState>>,
    genome: Arc<Mutex<GenomeStore>>,
    injector: Arc<Mutex<FaultInjector>>,
    stop: Arc<AtomicBool>,
}

impl WatcherHandle {
    /// Snapshot the observable state. Durations are rounded to milliseconds
    /// and capped at the last five; the average covers the full retention
    /// window.
    pub fn status(&self) -> StatusReport {
        let Ok(state) = self.state.lock() else {
            return StatusReport {
                generation: 0,
                status: Status::Error,
                last_mutation: String::new(),
                crash_count: 0,
                success_count: 0,
                avg_duration: 0.0,
                recent_durations: Vec::new(),
                log_count: 0,
                last_error: Some("state lock poisoned".to_string()),
            };
        };
        let n = state.recent_durations.len();
        let avg = if n == 0 {
            0.0
        } else {
            state.recent_durations.iter().sum::<f64>() / n as f64
        };
        StatusReport {
            generation: state.generation,
            status: state.status,
            last_mutation: state.last_mutation.clone(),
            crash_count: state.crash_count,
            success_count: state.success_count,
            avg_duration: round_ms(avg),
            recent_durations: state
                .recent_durations
                .iter()
                .rev()
                .take(STATUS_DURATIONS)
                .rev()
                .map(|d| round_ms(*d))
                .collect(),
            log_count: state.logs.len(),
            last_error: state.last_error.clone(),
        }
    }

    /// The last `limit` ring-log lines, oldest first.
    pub fn logs(&self, limit: usize) -> Vec<String> {
        match self.state.lock() {
            Ok(state) => {
                let skip = state.logs.len().saturating_sub(limit);
                state.logs.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Metadata-only genome history, oldest first. Source text is not exposed.
    pub fn genome_history(&self) -> Vec<GenomeVersion> {
        self.genome
            .lock()
            .map(|g| g.versions())
            .unwrap_or_default()
    }

    /// Corrupt the active worker source. Fire-and-forget: the next cycle's
    /// crash drives the healing protocol.
    ///
    /// # Errors
    /// I/O failure reading or writing the worker source.
    pub fn inject_chaos(&self, kind: ChaosKind) -> std::io::Result<Corruption> {
        let corruption = self
            .injector
            .lock()
            .map_err(|_| std::io::Error::other("injector lock poisoned"))?
            .inject(kind)?;
        if let Ok(mut state) = self.state.lock() {
            state.log(format!(
                "chaos injected ({}): {}",
                corruption.kind, corruption.detail
            ));
        }
        Ok(corruption)
    }

    /// Ask the loop to exit. Checked at the top of each cycle; an in-flight
    /// worker run still honors its own deadline.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

/// The supervisor. Owns the loop; hand out [`WatcherHandle`]s for everything
/// else.
pub struct Watcher<G, V> {
    config: WatchConfig,
    worker: WorkerProcess,
    generator: G,
    validator: V,
    state: Arc<Mutex<WatcherState>>,
    genome: Arc<Mutex<GenomeStore>>,
    injector: Arc<Mutex<FaultInjector>>,
    stop: Arc<AtomicBool>,
}

impl<G, V> Watcher<G, V>
where
    G: CodeGenerator,
    V: SourceValidator,
{
    pub fn new(config: WatchConfig, generator: G, validator: V) -> Self {
        let worker = WorkerProcess::new(
            config.interpreter.clone(),
            config.worker_path.clone(),
            config.worker_timeout,
        );
        let genome = GenomeStore::with_capacity(config.genome_capacity);
        let injector = FaultInjector::new(config.worker_path.clone());
        let state = WatcherState::new(config.log_capacity);
        Self {
            worker,
            generator,
            validator,
            state: Arc::new(Mutex::new(state)),
            genome: Arc::new(Mutex::new(genome)),
            injector: Arc::new(Mutex::new(injector)),
            stop: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Replace the fault injector with a seeded one for reproducible chaos.
    pub fn with_chaos_seed(self, seed: u64) -> Self {
        if let Ok(mut injector) = self.injector.lock() {
            *injector = FaultInjector::with_seed(self.config.worker_path.clone(), seed);
        }
        self
    }

    /// Handle for the serving layer. Cloneable, snapshot reads only.
    pub fn handle(&self) -> WatcherHandle {
        WatcherHandle {
            state: Arc::clone(&self.state),
            genome: Arc::clone(&self.genome),
            injector: Arc::clone(&self.injector),
            stop: Arc::clone(&self.stop),
        }
    }

    /// Run until [`WatcherHandle::stop`] is called. Never panics, never
    /// returns early: every per-cycle fault is logged and absorbed.
    pub async fn run(mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.log("watcher initialized");
            state.log(format!(
                "target latency: {:.1}s, cycle interval: {:.1}s",
                self.config.target_latency,
                self.config.cycle_interval.as_secs_f64()
            ));
        }
        while !self.stop.load(Ordering::Relaxed) {
            self.run_once().await;
            tokio::time::sleep(self.config.cycle_interval).await;
        }
        if let Ok(mut state) = self.state.lock() {
            state.log("watcher stopped");
        }
    }

    /// Execute exactly one supervision cycle: run, classify, maybe mutate.
    pub async fn run_once(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            let generation = state.generation;
            state.log(format!("cycle start — generation {generation}"));
        }

        let result = self.worker.execute().await;
        match result.signal {
            ExitSignal::Ok => self.on_success(result).await,
            ExitSignal::NonZeroExit(code) => self.on_crash(result, code).await,
            ExitSignal::Timeout => self.on_timeout(result).await,
            ExitSignal::Internal => self.on_internal(result),
        }
    }

    async fn on_success(&mut self, result: ExecutionResult) {
        let secs = result.duration_secs();
        let target = self.config.target_latency;

        let optimize = match self.state.lock() {
            Ok(mut state) => {
                state.status = Status::Alive;
                state.success_count += 1;
                state.record_duration(secs);
                for line in result.stdout.lines().filter(|l| !l.trim().is_empty()) {
                    state.log(format!("worker: {line}"));
                }
                state.log(format!("cycle complete in {secs:.3}s"));

                let mut breach = false;
                if secs > target {
                    state.log(format!("slow execution detected: {secs:.3}s > {target}s"));
                    breach = sustained_latency_breach(&state.recent_durations, target);
                    if breach {
                        state.log("triggering optimization mutation");
                    }
                }
                breach
            }
            Err(_) => false,
        };

        if optimize {
            let context = format!(
                "{PERF_MARKER}: last {SLOW_STREAK} runs all exceeded the {target}s latency target \
                 (most recent: {secs:.3}s)"
            );
            self.mutate(&context).await;
        }
    }

    async fn on_crash(&mut self, result: ExecutionResult, code: i32) {
        let context = if result.stderr.trim().is_empty() {
            format!("worker exited with code {code} and no stderr")
        } else {
            result.stderr.clone()
        };
        if let Ok(mut state) = self.state.lock() {
            state.status = Status::Crashed;
            state.crash_count += 1;
            state.last_error = Some(context.clone());
            // Whatever the worker managed to print before dying is still
            // worth surfacing.
            for line in result.stdout.lines().filter(|l| !l.trim().is_empty()) {
                state.log(format!("worker: {line}"));
            }
            state.log(format!("crash detected (exit code {code})"));
            state.log(format!("error: {}", context.trim()));
        }
        self.mutate(&context).await;
    }

    async fn on_timeout(&mut self, result: ExecutionResult) {
        // executor synthesizes the context string for timeouts
        let context = result.stderr;
        if let Ok(mut state) = self.state.lock() {
            state.status = Status::Timeout;
            state.crash_count += 1;
            state.last_error = Some(context.clone());
            state.log("timeout — worker frozen, killing it");
        }
        self.mutate(&context).await;
    }

    fn on_internal(&mut self, result: ExecutionResult) {
        error!("supervisor fault: {}", result.stderr);
        if let Ok(mut state) = self.state.lock() {
            state.status = Status::Error;
            state.last_error = Some(result.stderr.clone());
            state.log(format!("supervisor fault: {}", result.stderr));
        }
    }

    // -----------------------------------------------------------------------
    // Mutation protocol
    // -----------------------------------------------------------------------

    /// Run one mutation attempt. Any failure reverts to `Alive` with the
    /// source untouched; the next natural trigger retries.
    async fn mutate(&mut self, trigger: &str) {
        let intent = if trigger.contains(PERF_MARKER) {
            MutationIntent::Optimize
        } else {
            MutationIntent::Fix
        };
        if let Ok(mut state) = self.state.lock() {
            state.status = Status::Mutating;
            state.log(format!("mutation triggered (intent: {intent})"));
            state.log(format!(
                "context: {}",
                trigger.chars().take(200).collect::<String>().trim()
            ));
        }

        if let Err(e) = self.try_mutate(trigger, intent).await {
            warn!("mutation failed: {e}");
            if let Ok(mut state) = self.state.lock() {
                state.log(format!("mutation failed: {e}"));
                state.log("continuing with current source");
                state.status = Status::Alive;
            }
        }
    }

    async fn try_mutate(&mut self, trigger: &str, intent: MutationIntent) -> Result<(), WatchError> {
        let source = fs::read_to_string(&self.config.worker_path)?;
        let generation = self.state.lock().map(|s| s.generation).unwrap_or(1);

        // Snapshot the pre-mutation source first so history survives even if
        // the fix below is abandoned.
        if let Ok(mut genome) = self.genome.lock() {
            genome.append(WorkerSnapshot::capture(generation, source.clone(), trigger));
        }

        let generated = self.generator.generate(trigger, &source, intent).await?;

        if !self.validator.is_well_formed(&generated.source).await {
            return Err(WatchError::Validation(
                "generated candidate does not parse".to_string(),
            ));
        }

        let new_generation = generation + 1;
        let backup = backup_path(&self.config.worker_path, new_generation);
        fs::copy(&self.config.worker_path, &backup)?;
        write_atomic(&self.config.worker_path, &generated.source)?;

        if let Ok(mut state) = self.state.lock() {
            state.generation = new_generation;
            state.last_mutation = generated.rationale.clone();
            state.status = Status::Alive;
            state.log(format!("mutation committed — generation {new_generation}"));
            state.log(format!("backup saved: {}", backup.display()));
            state.log(format!("note: {}", generated.rationale));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// True when the five most recent durations all breach the latency target.
/// A single slow outlier never arms an optimization mutation.
pub(crate) fn sustained_latency_breach(durations: &VecDeque<f64>, target: f64) -> bool {
    durations.len() >= SLOW_STREAK
        && durations.iter().rev().take(SLOW_STREAK).all(|d| *d > target)
}

/// `organism.py` + generation 3 → `organism_v3.py`, beside the active source.
pub(crate) fn backup_path(source: &Path, generation: u64) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "worker".to_string());
    let tagged = match source.extension() {
        Some(ext) => format!("{stem}_v{generation}.{}", ext.to_string_lossy()),
        None => format!("{stem}_v{generation}"),
    };
    source.with_file_name(tagged)
}

/// Write-to-temp-then-rename in the source's directory, so the next cycle's
/// worker invocation never sees a partially written file.
fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn round_ms(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn durations(values: &[f64]) -> VecDeque<f64> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_breach_requires_five_consecutive_slow_runs() {
        let target = 1.0;
        assert!(!sustained_latency_breach(&durations(&[1.5]), target));
        assert!(!sustained_latency_breach(
            &durations(&[1.5, 1.5, 1.5, 1.5]),
            target
        ));
        assert!(sustained_latency_breach(
            &durations(&[1.5, 1.2, 1.9, 1.1, 1.3]),
            target
        ));
    }

    #[test]
    fn test_single_slow_then_fast_does_not_breach() {
        let target = 1.0;
        assert!(!sustained_latency_breach(
            &durations(&[0.2, 0.2, 0.2, 1.8, 0.2]),
            target
        ));
    }

    #[test]
    fn test_breach_looks_only_at_most_recent_five() {
        let target = 1.0;
        // Old fast runs beyond the streak window are irrelevant.
        assert!(sustained_latency_breach(
            &durations(&[0.1, 0.1, 1.5, 1.5, 1.5, 1.5, 1.5]),
            target
        ));
    }

    #[test]
    fn test_backup_path_tags_generation() {
        let p = backup_path(Path::new("/tmp/organism.py"), 4);
        assert_eq!(p, PathBuf::from("/tmp/organism_v4.py"));
        let bare = backup_path(Path::new("worker"), 2);
        assert_eq!(bare, PathBuf::from("worker_v2"));
    }

    #[test]
    fn test_write_atomic_replaces_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("organism.py");
        fs::write(&path, "old").expect("seed");
        write_atomic(&path, "new contents").expect("atomic write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "new contents");
    }

    #[test]
    fn test_status_display_matches_wire_form() {
        assert_eq!(Status::Alive.to_string(), "ALIVE");
        assert_eq!(Status::Mutating.to_string(), "MUTATING");
        let json = serde_json::to_string(&Status::Initializing).expect("serialize");
        assert_eq!(json, "\"INITIALIZING\"");
    }

    #[test]
    fn test_state_log_ring_is_bounded() {
        let mut state = WatcherState::new(3);
        for i in 0..5 {
            state.log(format!("line {i}"));
        }
        assert_eq!(state.logs.len(), 3);
        assert!(state.logs[0].contains("line 2"));
        assert!(state.logs[2].contains("line 4"));
    }

    #[test]
    fn test_zero_log_capacity_still_bounds_the_ring() {
        let mut state = WatcherState::new(0);
        for i in 0..4 {
            state.log(format!("line {i}"));
        }
        assert_eq!(state.logs.len(), 1);
        assert!(state.logs[0].contains("line 3"));
    }

    #[test]
    fn test_duration_window_is_bounded() {
        let mut state = WatcherState::new(10);
        for i in 0..15 {
            state.record_duration(i as f64);
        }
        assert_eq!(state.recent_durations.len(), DURATION_WINDOW);
        assert_eq!(state.recent_durations.front(), Some(&5.0));
    }
}
