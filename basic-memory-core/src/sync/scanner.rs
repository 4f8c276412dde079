//! File change detection: filesystem tree vs. stored checksums.

use crate::fileio;
use crate::ignore::IgnoreFilter;
use crate::sync::{FileState, SyncPhase, SyncReport};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Current filesystem state under the project root.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// `rel_path -> checksum` for every non-ignored `.md` file
    pub files: HashMap<String, String>,
    /// Paths excluded by the ignore filter before any IO
    pub ignored: usize,
    /// Files that could not be read
    pub errors: Vec<(String, String)>,
}

/// Scans the project tree and diffs it against database state.
pub struct FileChangeScanner {
    root: PathBuf,
    filter: IgnoreFilter,
}

impl FileChangeScanner {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            filter: IgnoreFilter::load(root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Turn an absolute path into the canonical root-relative form, if it
    /// is inside the project.
    pub fn relative(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root)
            .ok()
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
    }

    /// Whether a path takes part in sync at all: a markdown file that the
    /// ignore filter keeps.
    pub fn is_watchable(&self, path: &Path) -> bool {
        is_markdown(path) && !self.filter.is_ignored(path, false)
    }

    /// Walk the tree and checksum every markdown file.
    pub fn scan(&self) -> ScanResult {
        let mut result = ScanResult::default();
        let mut it = WalkDir::new(&self.root).into_iter();

        loop {
            let entry = match it.next() {
                None => break,
                Some(Err(err)) => {
                    let path = err
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    result.errors.push((path, err.to_string()));
                    continue;
                }
                Some(Ok(entry)) => entry,
            };

            if entry.depth() == 0 {
                continue;
            }

            let is_dir = entry.file_type().is_dir();
            if self.filter.is_ignored(entry.path(), is_dir) {
                result.ignored += 1;
                if is_dir {
                    it.skip_current_dir();
                }
                continue;
            }
            if is_dir || !is_markdown(entry.path()) {
                continue;
            }

            let Some(rel) = self.relative(entry.path()) else {
                continue;
            };
            match std::fs::read(entry.path()) {
                Ok(bytes) => {
                    result.files.insert(rel, fileio::checksum_bytes(&bytes));
                }
                Err(err) => result.errors.push((rel, err.to_string())),
            }
        }

        tracing::debug!(
            files = result.files.len(),
            ignored = result.ignored,
            root = %self.root.display(),
            "Scanned project tree"
        );
        result
    }

    /// Checksum only the given paths (for watcher-driven batches). Paths
    /// that no longer exist are simply absent from the result.
    pub fn scan_paths(&self, paths: &[PathBuf]) -> ScanResult {
        let mut result = ScanResult::default();

        for path in paths {
            if !self.is_watchable(path) {
                result.ignored += 1;
                continue;
            }
            let Some(rel) = self.relative(path) else {
                continue;
            };
            match std::fs::read(path) {
                Ok(bytes) => {
                    result.files.insert(rel, fileio::checksum_bytes(&bytes));
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => result.errors.push((rel, err.to_string())),
            }
        }

        result
    }
}

/// Diff a scan against the store's checksums.
///
/// With `detect_moves`, a new path sharing a checksum with a deleted path
/// collapses into a single move of the existing entity.
pub fn find_changes(
    scan: ScanResult,
    known: &HashMap<String, String>,
    detect_moves: bool,
) -> SyncReport {
    let mut report = SyncReport {
        ignored: scan.ignored,
        ..Default::default()
    };

    for (path, message) in scan.errors {
        report.record_error(path, SyncPhase::Scan, message);
    }

    for (path, checksum) in &scan.files {
        match known.get(path) {
            None => {
                report.new.insert(path.clone());
            }
            Some(existing) if existing != checksum => {
                report.modified.insert(path.clone());
            }
            Some(_) => {}
        }
    }

    for path in known.keys() {
        if !scan.files.contains_key(path) {
            report.deleted.insert(path.clone());
        }
    }

    if detect_moves {
        for path in report.new.clone() {
            let checksum = &scan.files[&path];
            let old = report
                .deleted
                .iter()
                .find(|deleted| known.get(*deleted) == Some(checksum))
                .cloned();
            if let Some(old) = old {
                report.new.remove(&path);
                report.deleted.remove(&old);
                report.moved.push(FileState {
                    path,
                    checksum: checksum.clone(),
                    moved_from: Some(old),
                });
            }
        }
    }

    report.checksums = scan.files;

    tracing::debug!(
        new = report.new.len(),
        modified = report.modified.len(),
        moved = report.moved.len(),
        deleted = report.deleted.len(),
        "Computed sync report"
    );
    report
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_finds_markdown_only() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "notes/alpha.md", "# Alpha");
        write(dir.path(), "notes/data.json", "{}");
        write(dir.path(), "beta.md", "# Beta");

        let scanner = FileChangeScanner::new(dir.path());
        let scan = scanner.scan();

        assert_eq!(scan.files.len(), 2);
        assert!(scan.files.contains_key("notes/alpha.md"));
        assert!(scan.files.contains_key("beta.md"));
    }

    #[test]
    fn test_scan_applies_ignore_filter() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "notes/alpha.md", "# Alpha");
        write(dir.path(), ".obsidian/cache.md", "ignored");
        write(dir.path(), "drafts/hidden.md", "ignored");
        std::fs::write(dir.path().join(".gitignore"), "/drafts\n").unwrap();

        let scanner = FileChangeScanner::new(dir.path());
        let scan = scanner.scan();

        assert_eq!(scan.files.len(), 1);
        assert!(scan.ignored >= 2);
    }

    #[test]
    fn test_find_changes_new_modified_deleted() {
        let mut known = HashMap::new();
        known.insert("kept.md".to_string(), "aaa".to_string());
        known.insert("changed.md".to_string(), "bbb".to_string());
        known.insert("gone.md".to_string(), "ccc".to_string());

        let mut scan = ScanResult::default();
        scan.files.insert("kept.md".to_string(), "aaa".to_string());
        scan.files.insert("changed.md".to_string(), "BBB".to_string());
        scan.files.insert("fresh.md".to_string(), "ddd".to_string());

        let report = find_changes(scan, &known, true);

        assert_eq!(report.new.iter().collect::<Vec<_>>(), vec!["fresh.md"]);
        assert_eq!(report.modified.iter().collect::<Vec<_>>(), vec!["changed.md"]);
        assert_eq!(report.deleted.iter().collect::<Vec<_>>(), vec!["gone.md"]);
        assert!(report.moved.is_empty());
    }

    #[test]
    fn test_find_changes_detects_moves() {
        let mut known = HashMap::new();
        known.insert("notes/alpha.md".to_string(), "aaa".to_string());

        let mut scan = ScanResult::default();
        scan.files.insert("notes/archive/alpha.md".to_string(), "aaa".to_string());

        let report = find_changes(scan, &known, true);

        assert!(report.new.is_empty());
        assert!(report.deleted.is_empty());
        assert_eq!(report.moved.len(), 1);
        assert_eq!(report.moved[0].path, "notes/archive/alpha.md");
        assert_eq!(report.moved[0].moved_from.as_deref(), Some("notes/alpha.md"));
    }

    #[test]
    fn test_move_detection_configurable() {
        let mut known = HashMap::new();
        known.insert("notes/alpha.md".to_string(), "aaa".to_string());

        let mut scan = ScanResult::default();
        scan.files.insert("notes/archive/alpha.md".to_string(), "aaa".to_string());

        let report = find_changes(scan, &known, false);

        assert_eq!(report.new.len(), 1);
        assert_eq!(report.deleted.len(), 1);
        assert!(report.moved.is_empty());
    }

    #[test]
    fn test_no_changes_is_empty_report() {
        let mut known = HashMap::new();
        known.insert("a.md".to_string(), "aaa".to_string());

        let mut scan = ScanResult::default();
        scan.files.insert("a.md".to_string(), "aaa".to_string());

        let report = find_changes(scan, &known, true);
        assert_eq!(report.total_changes(), 0);
    }
}
