//! # Genome store — bounded worker source history
//!
//! ## Responsibility
//! Append-only history of worker source snapshots, one per mutation attempt,
//! capped at a fixed capacity with FIFO eviction. Snapshots are immutable
//! once appended; only the watcher appends, everyone else reads.
//!
//! ## NOT Responsible For
//! - Persisting snapshots to disk (generation backups live beside the active
//!   source file; see the watcher's commit step).
//! - Deciding *when* to snapshot (mutation protocol concern).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::DEFAULT_GENOME_CAPACITY;

/// Maximum length of the trigger context stored with a snapshot.
const CONTEXT_LIMIT: usize = 200;

/// One immutable point-in-time record of the worker's source.
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    /// Generation the source belonged to when captured (≥ 1).
    pub generation: u64,
    /// Full source text at capture time.
    pub source: String,
    /// Capture instant.
    pub created_at: DateTime<Utc>,
    /// Truncated error/perf context that triggered the capture.
    pub trigger_context: String,
}

impl WorkerSnapshot {
    /// Capture a snapshot now, truncating `context` to the storage limit.
    pub fn capture(generation: u64, source: String, context: &str) -> Self {
        Self {
            generation,
            source,
            created_at: Utc::now(),
            trigger_context: truncate_context(context),
        }
    }
}

/// The externally exposed view of one genome entry.
///
/// Source text is intentionally omitted — the API layer gets metadata only.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenomeVersion {
    pub generation: u64,
    pub timestamp: String,
    pub context: String,
}

impl From<&WorkerSnapshot> for GenomeVersion {
    fn from(snap: &WorkerSnapshot) -> Self {
        Self {
            generation: snap.generation,
            timestamp: snap.created_at.to_rfc3339(),
            context: snap.trigger_context.clone(),
        }
    }
}

/// Bounded FIFO history of [`WorkerSnapshot`]s.
#[derive(Debug)]
pub struct GenomeStore {
    entries: VecDeque<WorkerSnapshot>,
    capacity: usize,
}

impl Default for GenomeStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_GENOME_CAPACITY)
    }
}

impl GenomeStore {
    /// Create a store bounded to `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Append a snapshot, evicting the oldest entry once full. O(1) amortized.
    pub fn append(&mut self, snapshot: WorkerSnapshot) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(snapshot);
    }

    /// Read-only view of the stored snapshots, oldest first.
    pub fn list(&self) -> impl Iterator<Item = &WorkerSnapshot> {
        self.entries.iter()
    }

    /// Metadata-only view for the API layer, oldest first.
    pub fn versions(&self) -> Vec<GenomeVersion> {
        self.entries.iter().map(GenomeVersion::from).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Truncate `context` to the storage limit on a char boundary.
fn truncate_context(context: &str) -> String {
    context.chars().take(CONTEXT_LIMIT).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snap(generation: u64) -> WorkerSnapshot {
        WorkerSnapshot::capture(generation, format!("print({generation})"), "boom")
    }

    #[test]
    fn test_append_and_list_order() {
        let mut store = GenomeStore::default();
        store.append(snap(1));
        store.append(snap(2));
        let gens: Vec<u64> = store.list().map(|s| s.generation).collect();
        assert_eq!(gens, vec![1, 2]);
    }

    #[test]
    fn test_eleventh_append_evicts_oldest() {
        let mut store = GenomeStore::default();
        for g in 1..=11 {
            store.append(snap(g));
        }
        assert_eq!(store.len(), 10);
        let gens: Vec<u64> = store.list().map(|s| s.generation).collect();
        assert_eq!(gens.first(), Some(&2));
        assert_eq!(gens.last(), Some(&11));
    }

    #[test]
    fn test_context_truncated_to_limit() {
        let long = "e".repeat(500);
        let s = WorkerSnapshot::capture(1, String::new(), &long);
        assert_eq!(s.trigger_context.chars().count(), 200);
    }

    #[test]
    fn test_versions_omit_source() {
        let mut store = GenomeStore::default();
        store.append(snap(3));
        let versions = store.versions();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].generation, 3);
        assert_eq!(versions[0].context, "boom");
        let json = serde_json::to_string(&versions[0]).expect("serialize");
        assert!(!json.contains("print"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_zero_capacity_clamped_to_one() {
        let mut store = GenomeStore::with_capacity(0);
        store.append(snap(1));
        store.append(snap(2));
        assert_eq!(store.len(), 1);
        assert_eq!(store.list().next().map(|s| s.generation), Some(2));
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(appends in 0usize..64, cap in 1usize..16) {
            let mut store = GenomeStore::with_capacity(cap);
            for g in 0..appends {
                store.append(snap(g as u64));
            }
            prop_assert!(store.len() <= cap);
            prop_assert_eq!(store.len(), appends.min(cap));
        }
    }
}
