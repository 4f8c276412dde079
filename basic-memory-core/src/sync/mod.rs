//! Filesystem-to-index synchronization.
//!
//! The scanner diffs on-disk checksums against the store, the service
//! applies the two-pass reconciliation, and the watch service streams
//! debounced filesystem events into incremental syncs.

pub mod scanner;
mod service;
mod watch;

pub use scanner::{find_changes, FileChangeScanner, ScanResult};
pub use service::SyncService;
pub use watch::{WatchEvent, WatchService, WatchState, RECENT_EVENTS_MAX};

use std::collections::{BTreeSet, HashMap};

/// Which stage of the pipeline an error surfaced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Scan,
    Parse,
    Store,
    Index,
    Resolve,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Scan => "scan",
            SyncPhase::Parse => "parse",
            SyncPhase::Store => "store",
            SyncPhase::Index => "index",
            SyncPhase::Resolve => "resolve",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-file error recorded during a sync batch. Per-file errors never
/// abort the batch; the file retries on the next run.
#[derive(Debug, Clone)]
pub struct SyncFileError {
    pub path: String,
    pub phase: SyncPhase,
    pub message: String,
}

/// Transient view of one file inside a sync report.
#[derive(Debug, Clone)]
pub struct FileState {
    /// Path relative to the project root
    pub path: String,
    /// Checksum of the file contents at scan time
    pub checksum: String,
    /// Previous path, when this entry is a detected move
    pub moved_from: Option<String>,
}

/// Result of one sync batch.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub new: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub deleted: BTreeSet<String>,
    /// Renames detected by checksum (`moved_from` carries the old path)
    pub moved: Vec<FileState>,
    /// Scan-time checksums for every current file in the batch
    pub checksums: HashMap<String, String>,
    /// Paths excluded by the ignore filter before any IO
    pub ignored: usize,
    /// Per-file errors (parse, IO, conflicts)
    pub errors: Vec<SyncFileError>,
}

impl SyncReport {
    pub fn total_changes(&self) -> usize {
        self.new.len() + self.modified.len() + self.deleted.len() + self.moved.len()
    }

    pub(crate) fn record_error(
        &mut self,
        path: impl Into<String>,
        phase: SyncPhase,
        message: impl Into<String>,
    ) {
        let error = SyncFileError {
            path: path.into(),
            phase,
            message: message.into(),
        };
        tracing::warn!(
            path = %error.path,
            phase = %error.phase.as_str(),
            message = %error.message,
            "Sync error"
        );
        self.errors.push(error);
    }
}

impl std::fmt::Display for SyncReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Changes detected:\n  New files: {}\n  Modified: {}\n  Moved: {}\n  Deleted: {}\n  Errors: {}",
            self.new.len(),
            self.modified.len(),
            self.moved.len(),
            self.deleted.len(),
            self.errors.len(),
        )
    }
}
