//! Filesystem watch service.
//!
//! Subscribes to recursive change events under the project root, coalesces
//! them per path inside a debounce window, filters them through the ignore
//! and markdown rules, and drives incremental syncs from a single consumer
//! loop. A full sync runs at startup to catch anything missed while
//! offline.

use crate::config::{ProjectConfig, SyncOptions};
use crate::error::Result;
use crate::sync::{SyncReport, SyncService};
use chrono::{DateTime, Utc};
use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use serde::Serialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

/// Bound on the diagnostic ring buffer of recent events.
pub const RECENT_EVENTS_MAX: usize = 100;

/// One processed watch event, kept for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct WatchEvent {
    pub timestamp: DateTime<Utc>,
    /// Path relative to the project root
    pub path: String,
    /// `sync` or `delete`
    pub action: String,
    /// `success` or `error`
    pub status: String,
}

/// Observable watcher state.
#[derive(Debug, Default)]
pub struct WatchState {
    pub running: bool,
    pub files_synced: usize,
    pub bytes_processed: u64,
    pub error_count: usize,
    /// Most recent events, oldest first, capped at [`RECENT_EVENTS_MAX`]
    pub recent_events: VecDeque<WatchEvent>,
}

impl WatchState {
    fn record_event(&mut self, path: String, action: &str, status: &str) {
        self.recent_events.push_back(WatchEvent {
            timestamp: Utc::now(),
            path,
            action: action.to_string(),
            status: status.to_string(),
        });
        while self.recent_events.len() > RECENT_EVENTS_MAX {
            self.recent_events.pop_front();
        }
    }
}

/// Streams filtered, debounced change events into the synchronizer.
pub struct WatchService {
    sync: Arc<SyncService>,
    root: PathBuf,
    debounce: Duration,
    state: Arc<Mutex<WatchState>>,
    shutdown: Arc<AtomicBool>,
}

impl WatchService {
    pub fn new(config: &ProjectConfig, options: &SyncOptions, sync: Arc<SyncService>) -> Self {
        Self {
            sync,
            root: config.root_path.clone(),
            debounce: Duration::from_millis(options.debounce_ms),
            state: Arc::new(Mutex::new(WatchState::default())),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared view of the watcher's counters and recent events.
    pub fn state(&self) -> Arc<Mutex<WatchState>> {
        self.state.clone()
    }

    /// Request the run loop to exit.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Run the watch loop on the current thread until [`stop`](Self::stop)
    /// is called. Spawn this on a dedicated thread; it is the single
    /// consumer of the event channel.
    pub fn run(&self) -> Result<()> {
        // Catch up on changes missed while offline
        let report = self.sync.sync()?;
        tracing::info!(changes = report.total_changes(), "Startup sync complete");
        self.note_report(&report);

        let (tx, rx) = mpsc::channel::<DebounceEventResult>();
        let mut debouncer = new_debouncer(self.debounce, tx)?;
        debouncer.watcher().watch(&self.root, RecursiveMode::Recursive)?;

        self.state.lock().unwrap().running = true;
        tracing::info!(root = %self.root.display(), "Watching for changes");

        while !self.shutdown.load(Ordering::SeqCst) {
            match rx.recv_timeout(Duration::from_millis(500)) {
                Ok(Ok(events)) => {
                    let paths: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                    self.handle_changes(paths);
                }
                Ok(Err(err)) => {
                    tracing::warn!(error = %err, "Watcher error");
                    self.state.lock().unwrap().error_count += 1;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        self.state.lock().unwrap().running = false;
        tracing::info!("Watcher stopped");
        Ok(())
    }

    /// Process one debounced batch of changed paths.
    pub fn handle_changes(&self, paths: Vec<PathBuf>) {
        let mut batch: Vec<PathBuf> = Vec::new();
        for path in paths {
            if !batch.contains(&path) {
                batch.push(path);
            }
        }
        if batch.is_empty() {
            return;
        }

        let bytes: u64 = batch
            .iter()
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
            })
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .sum();

        match self.sync.sync_paths(&batch) {
            Ok(report) => {
                let mut state = self.state.lock().unwrap();
                state.files_synced += report.new.len() + report.modified.len() + report.moved.len();
                state.bytes_processed += bytes;
                state.error_count += report.errors.len();
                drop(state);
                self.note_report(&report);
            }
            Err(err) => {
                tracing::error!(error = %err, "Incremental sync failed");
                self.state.lock().unwrap().error_count += 1;
            }
        }
    }

    fn note_report(&self, report: &SyncReport) {
        let mut state = self.state.lock().unwrap();
        for path in report.new.iter().chain(report.modified.iter()) {
            state.record_event(path.clone(), "sync", "success");
        }
        for state_file in &report.moved {
            state.record_event(state_file.path.clone(), "sync", "success");
        }
        for path in report.deleted.iter() {
            state.record_event(path.clone(), "delete", "success");
        }
        for error in &report.errors {
            state.record_event(error.path.clone(), "sync", "error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::db::EntityStore;

    fn service(root: &std::path::Path) -> (Arc<SyncService>, WatchService) {
        let config = ProjectConfig::new(root, ":memory:", 1);
        let sync = Arc::new(SyncService::open(&config, SyncOptions::default()).unwrap());
        let watch = WatchService::new(&config, &SyncOptions::default(), sync.clone());
        (sync, watch)
    }

    #[test]
    fn test_handle_file_added() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("test.md");
        std::fs::write(&file, "---\ntitle: Test Note\ntype: note\n---\n# Test Note\n").unwrap();

        let (_sync, watch) = service(dir.path());
        watch.handle_changes(vec![file]);

        let state = watch.state();
        let state = state.lock().unwrap();
        assert_eq!(state.files_synced, 1);
        assert!(state.bytes_processed > 0);
        assert_eq!(state.recent_events.len(), 1);
        assert_eq!(state.recent_events[0].path, "test.md");
        assert_eq!(state.recent_events[0].action, "sync");
        assert_eq!(state.recent_events[0].status, "success");
    }

    #[test]
    fn test_handle_file_modified_and_deleted() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("test.md");
        std::fs::write(&file, "# Test\n").unwrap();

        let (sync, watch) = service(dir.path());
        watch.handle_changes(vec![file.clone()]);

        std::fs::write(&file, "# Test\n\nmore\n").unwrap();
        watch.handle_changes(vec![file.clone()]);

        std::fs::remove_file(&file).unwrap();
        watch.handle_changes(vec![file]);

        let state = watch.state();
        let state = state.lock().unwrap();
        assert_eq!(state.files_synced, 2);
        assert_eq!(state.recent_events.len(), 3);
        assert_eq!(state.recent_events[2].action, "delete");

        // Entity is gone from the store as well
        assert!(sync.store().find_by_file_path("test.md").unwrap().is_none());
    }

    #[test]
    fn test_non_markdown_events_filtered() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("data.json");
        std::fs::write(&file, "{}").unwrap();

        let (_sync, watch) = service(dir.path());
        watch.handle_changes(vec![file]);

        let state = watch.state();
        let state = state.lock().unwrap();
        assert_eq!(state.files_synced, 0);
        assert!(state.recent_events.is_empty());
    }

    #[test]
    fn test_ring_buffer_bounded() {
        let mut state = WatchState::default();
        for i in 0..150 {
            state.record_event(format!("{i}.md"), "sync", "success");
        }
        assert_eq!(state.recent_events.len(), RECENT_EVENTS_MAX);
        assert_eq!(state.recent_events[0].path, "50.md");
    }
}
