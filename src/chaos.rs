//! # Fault injector — deliberate worker corruption
//!
//! Corrupts the active worker source in place to induce a chosen failure
//! class on the next execution. The genome store is never touched here; the
//! crash on the next cycle drives the normal mutation protocol, which records
//! history as usual.

use std::fs;
use std::io;
use std::path::PathBuf;

use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Line inserted by [`ChaosKind::SyntaxError`]. Unparseable in any Python.
const SYNTAX_ERROR_LINE: &str = "this is not valid python!!!";
/// Line inserted by [`ChaosKind::DivisionByZero`], indented to land inside a body.
const DIV_ZERO_LINE: &str = "    result = 1 / 0  # chaos";
/// Insertion offsets for the two insert-style corruptions.
const SYNTAX_ERROR_OFFSET: usize = 10;
const DIV_ZERO_OFFSET: usize = 15;
/// Files at or under this many lines are left alone by `DeleteLine`.
const DELETE_MIN_LINES: usize = 10;

/// The failure classes the injector can induce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChaosKind {
    /// Remove one interior line of the file.
    DeleteLine,
    /// Insert a line no parser will accept.
    SyntaxError,
    /// Insert an integer division by zero.
    DivisionByZero,
    /// Uniformly pick one of the three concrete kinds.
    Random,
}

impl std::fmt::Display for ChaosKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChaosKind::DeleteLine => write!(f, "delete_line"),
            ChaosKind::SyntaxError => write!(f, "syntax_error"),
            ChaosKind::DivisionByZero => write!(f, "division_by_zero"),
            ChaosKind::Random => write!(f, "random"),
        }
    }
}

/// What one injection actually did, for logging.
#[derive(Debug, Clone)]
pub struct Corruption {
    /// The concrete kind applied (`Random` is resolved before injection).
    pub kind: ChaosKind,
    /// Human-readable description of the edit.
    pub detail: String,
}

/// Corrupts a worker source file on demand.
///
/// Seeded construction makes both the `Random` kind resolution and the
/// `DeleteLine` line choice reproducible.
pub struct FaultInjector {
    source_path: PathBuf,
    rng: StdRng,
}

impl FaultInjector {
    /// Injector with OS-sourced entropy.
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Injector with a fixed seed for reproducible scenarios.
    pub fn with_seed(source_path: impl Into<PathBuf>, seed: u64) -> Self {
        Self {
            source_path: source_path.into(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Corrupt the worker source with `kind`, resolving `Random` first.
    ///
    /// # Errors
    /// Returns the underlying I/O error when the source file cannot be read
    /// or written.
    pub fn inject(&mut self, kind: ChaosKind) -> io::Result<Corruption> {
        let kind = self.resolve(kind);
        let text = fs::read_to_string(&self.source_path)?;
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();

        let detail = match kind {
            ChaosKind::DeleteLine => {
                if lines.len() > DELETE_MIN_LINES {
                    let idx = self.rng.gen_range(5..lines.len() - 5);
                    let removed = lines.remove(idx);
                    format!("deleted line {idx}: {}", removed.trim())
                } else {
                    "file too short, nothing deleted".to_string()
                }
            }
            ChaosKind::SyntaxError => {
                let idx = SYNTAX_ERROR_OFFSET.min(lines.len());
                lines.insert(idx, SYNTAX_ERROR_LINE.to_string());
                format!("inserted syntax error at line {idx}")
            }
            ChaosKind::DivisionByZero => {
                let idx = DIV_ZERO_OFFSET.min(lines.len());
                lines.insert(idx, DIV_ZERO_LINE.to_string());
                format!("inserted division by zero at line {idx}")
            }
            // resolve() never returns Random
            ChaosKind::Random => unreachable!("random resolved before injection"),
        };

        let mut out = lines.join("\n");
        out.push('\n');
        fs::write(&self.source_path, out)?;

        Ok(Corruption { kind, detail })
    }

    /// Map `Random` to one of the three concrete kinds.
    fn resolve(&mut self, kind: ChaosKind) -> ChaosKind {
        match kind {
            ChaosKind::Random => match self.rng.gen_range(0..3) {
                0 => ChaosKind::DeleteLine,
                1 => ChaosKind::SyntaxError,
                _ => ChaosKind::DivisionByZero,
            },
            concrete => concrete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn worker_file(lines: usize) -> NamedTempFile {
        let mut f = NamedTempFile::new().expect("temp file");
        for i in 0..lines {
            writeln!(f, "line_{i} = {i}").expect("write");
        }
        f
    }

    fn line_count(f: &NamedTempFile) -> usize {
        fs::read_to_string(f.path()).expect("read").lines().count()
    }

    #[test]
    fn test_syntax_error_inserts_unparseable_line() {
        let f = worker_file(20);
        let mut inj = FaultInjector::new(f.path());
        let c = inj.inject(ChaosKind::SyntaxError).expect("inject");
        assert_eq!(c.kind, ChaosKind::SyntaxError);
        let text = fs::read_to_string(f.path()).expect("read");
        assert_eq!(text.lines().nth(SYNTAX_ERROR_OFFSET), Some(SYNTAX_ERROR_LINE));
        assert_eq!(line_count(&f), 21);
    }

    #[test]
    fn test_division_by_zero_offset_clamped_on_short_file() {
        let f = worker_file(4);
        let mut inj = FaultInjector::new(f.path());
        inj.inject(ChaosKind::DivisionByZero).expect("inject");
        let text = fs::read_to_string(f.path()).expect("read");
        assert_eq!(text.lines().last(), Some(DIV_ZERO_LINE));
        assert_eq!(line_count(&f), 5);
    }

    #[test]
    fn test_delete_line_removes_interior_line() {
        let f = worker_file(20);
        let mut inj = FaultInjector::with_seed(f.path(), 7);
        let c = inj.inject(ChaosKind::DeleteLine).expect("inject");
        assert_eq!(line_count(&f), 19);
        assert!(c.detail.starts_with("deleted line "));
        // First and last five lines are never touched.
        let text = fs::read_to_string(f.path()).expect("read");
        assert_eq!(text.lines().next(), Some("line_0 = 0"));
        assert_eq!(text.lines().last(), Some("line_19 = 19"));
    }

    #[test]
    fn test_delete_line_skips_short_file() {
        let f = worker_file(8);
        let mut inj = FaultInjector::with_seed(f.path(), 1);
        let c = inj.inject(ChaosKind::DeleteLine).expect("inject");
        assert_eq!(line_count(&f), 8);
        assert!(c.detail.contains("too short"));
    }

    #[test]
    fn test_random_resolution_is_seed_deterministic() {
        let f1 = worker_file(20);
        let f2 = worker_file(20);
        let mut a = FaultInjector::with_seed(f1.path(), 42);
        let mut b = FaultInjector::with_seed(f2.path(), 42);
        let ka = a.inject(ChaosKind::Random).expect("inject").kind;
        let kb = b.inject(ChaosKind::Random).expect("inject").kind;
        assert_eq!(ka, kb);
        assert_ne!(ka, ChaosKind::Random);
    }

    #[rstest]
    #[case(ChaosKind::DeleteLine, "delete_line")]
    #[case(ChaosKind::SyntaxError, "syntax_error")]
    #[case(ChaosKind::DivisionByZero, "division_by_zero")]
    #[case(ChaosKind::Random, "random")]
    fn test_kind_display(#[case] kind: ChaosKind, #[case] expected: &str) {
        assert_eq!(kind.to_string(), expected);
    }

    #[test]
    fn test_missing_file_surfaces_io_error() {
        let mut inj = FaultInjector::new("/nonexistent/worker.py");
        assert!(inj.inject(ChaosKind::SyntaxError).is_err());
    }
}
