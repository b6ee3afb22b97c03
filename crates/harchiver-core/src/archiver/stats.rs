//! Counters describing what the archiver has done so far.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    observed: AtomicU64,
    filtered: AtomicU64,
    build_failures: AtomicU64,
    queued_entries: AtomicU64,
    written_entries: AtomicU64,
    write_failures: AtomicU64,
}

impl StatCounters {
    pub(crate) fn observed(&self) {
        self.observed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn build_failed(&self) {
        self.build_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn queued(&self, entries: usize) {
        self.queued_entries.fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn written(&self, entries: usize) {
        self.written_entries.fetch_add(entries as u64, Ordering::Relaxed);
    }

    pub(crate) fn write_failed(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ArchiverStats {
        ArchiverStats {
            observed: self.observed.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            build_failures: self.build_failures.load(Ordering::Relaxed),
            queued_entries: self.queued_entries.load(Ordering::Relaxed),
            written_entries: self.written_entries.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the archiver's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiverStats {
    /// Completions delivered while archiving.
    pub observed: u64,
    /// Completions rejected by a filter.
    pub filtered: u64,
    /// Completions skipped because no entry could be built.
    pub build_failures: u64,
    /// Entries (including redirect hops) handed to the writer.
    pub queued_entries: u64,
    /// Entries on disk.
    pub written_entries: u64,
    pub write_failures: u64,
}
