//! Diagnostics sink.
//!
//! Engine components never log through process-wide state of their own.
//! Each one receives an `Arc<dyn Diagnostics>` at construction and reports
//! through it. [`TracingDiagnostics`] forwards to `tracing`;
//! [`MemoryDiagnostics`] records entries so callers can inspect them.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, warn};

/// Severity of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Warn,
    Error,
}

/// Sink for advisory and fatal diagnostics.
///
/// Implementations must be cheap to call from the dispatch thread.
pub trait Diagnostics: Send + Sync {
    fn debug(&self, args: fmt::Arguments<'_>);
    fn warn(&self, args: fmt::Arguments<'_>);
    fn error(&self, args: fmt::Arguments<'_>);
}

// ============================================================================
// Tracing-backed sink
// ============================================================================

/// `tracing` target of every event emitted by [`TracingDiagnostics`].
///
/// Enable the startup name dump with `RUST_LOG=busmon_core::diagnostics=debug`
/// (or any prefix of it, such as `busmon_core=debug`).
pub const DIAGNOSTICS_TARGET: &str = "busmon_core::diagnostics";

/// Forwards diagnostics to `tracing`, tagged with a component field.
#[derive(Debug, Clone, Copy)]
pub struct TracingDiagnostics {
    component: &'static str,
}

impl TracingDiagnostics {
    pub fn new(component: &'static str) -> Self {
        Self { component }
    }

    /// Convenience constructor returning a shareable sink.
    pub fn shared(component: &'static str) -> Arc<dyn Diagnostics> {
        Arc::new(Self::new(component))
    }
}

impl Default for TracingDiagnostics {
    fn default() -> Self {
        Self::new("busmon")
    }
}

impl Diagnostics for TracingDiagnostics {
    fn debug(&self, args: fmt::Arguments<'_>) {
        debug!(target: DIAGNOSTICS_TARGET, component = self.component, "{}", args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        warn!(target: DIAGNOSTICS_TARGET, component = self.component, "{}", args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        error!(target: DIAGNOSTICS_TARGET, component = self.component, "{}", args);
    }
}

// ============================================================================
// In-memory sink
// ============================================================================

/// One recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub level: Level,
    pub message: String,
}

/// Records every diagnostic in memory.
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    entries: Mutex<Vec<Entry>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn entries(&self) -> Vec<Entry> {
        self.lock().clone()
    }

    /// Returns true if an entry at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.lock()
            .iter()
            .any(|e| e.level == level && e.message.contains(needle))
    }

    /// Number of entries at `level`.
    pub fn count(&self, level: Level) -> usize {
        self.lock().iter().filter(|e| e.level == level).count()
    }

    fn record(&self, level: Level, args: fmt::Arguments<'_>) {
        self.lock().push(Entry {
            level,
            message: args.to_string(),
        });
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        // Entries are append-only, so a poisoned lock still guards a valid Vec.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Diagnostics for MemoryDiagnostics {
    fn debug(&self, args: fmt::Arguments<'_>) {
        self.record(Level::Debug, args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        self.record(Level::Warn, args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        self.record(Level::Error, args);
    }
}
