//! Scan-time ignore rules.
//!
//! Combines a built-in default set (VCS, editor, build, cache, OS metadata,
//! `.obsidian`) with `<root>/.gitignore`, using full gitignore semantics:
//! a leading `/` anchors a pattern to the root, a trailing `/` restricts it
//! to directories, and bare names match any path component.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// Patterns that are always ignored, regardless of `.gitignore`.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    ".venv",
    "venv",
    "env",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    ".idea",
    ".vscode",
    ".obsidian",
    "build",
    "dist",
    "target",
    ".cache",
    ".DS_Store",
    "Thumbs.db",
    "*.tmp",
];

/// Matcher applied to every path before any file IO during a scan.
pub struct IgnoreFilter {
    matcher: Gitignore,
    root: PathBuf,
}

impl IgnoreFilter {
    /// Build a filter for a project root, reading `<root>/.gitignore` when
    /// present.
    pub fn load(root: &Path) -> Self {
        let mut builder = GitignoreBuilder::new(root);

        for pattern in DEFAULT_IGNORE_PATTERNS {
            // Built-in patterns are well-formed; ignore add failures
            let _ = builder.add_line(None, pattern);
        }

        let gitignore_file = root.join(".gitignore");
        if gitignore_file.exists() {
            if let Some(err) = builder.add(&gitignore_file) {
                tracing::warn!(
                    path = %gitignore_file.display(),
                    error = %err,
                    "Failed to read .gitignore, using defaults only"
                );
            }
        }

        let matcher = builder.build().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "Failed to build ignore matcher");
            Gitignore::empty()
        });

        Self {
            matcher,
            root: root.to_path_buf(),
        }
    }

    /// Whether a path (absolute or root-relative) should be excluded from
    /// scanning.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        if path == self.root {
            return false;
        }
        // The matcher only understands paths inside its root
        if path.is_absolute() && !path.starts_with(&self.root) {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn filter_with_gitignore(contents: Option<&str>) -> (TempDir, IgnoreFilter) {
        let dir = TempDir::new().unwrap();
        if let Some(contents) = contents {
            std::fs::write(dir.path().join(".gitignore"), contents).unwrap();
        }
        let filter = IgnoreFilter::load(dir.path());
        (dir, filter)
    }

    #[test]
    fn test_default_patterns() {
        let (dir, filter) = filter_with_gitignore(None);
        assert!(filter.is_ignored(&dir.path().join(".git"), true));
        assert!(filter.is_ignored(&dir.path().join("sub/node_modules/pkg/readme.md"), false));
        assert!(filter.is_ignored(&dir.path().join(".obsidian/workspace.json"), false));
        assert!(filter.is_ignored(&dir.path().join("notes/draft.tmp"), false));
        assert!(!filter.is_ignored(&dir.path().join("notes/alpha.md"), false));
    }

    #[test]
    fn test_gitignore_anchored_pattern() {
        let (dir, filter) = filter_with_gitignore(Some("/drafts\n"));
        assert!(filter.is_ignored(&dir.path().join("drafts/a.md"), false));
        assert!(!filter.is_ignored(&dir.path().join("notes/drafts/a.md"), false));
    }

    #[test]
    fn test_gitignore_directory_pattern() {
        let (dir, filter) = filter_with_gitignore(Some("archive/\n"));
        assert!(filter.is_ignored(&dir.path().join("notes/archive"), true));
        assert!(filter.is_ignored(&dir.path().join("notes/archive/old.md"), false));
    }

    #[test]
    fn test_gitignore_glob_pattern() {
        let (dir, filter) = filter_with_gitignore(Some("*.draft.md\n"));
        assert!(filter.is_ignored(&dir.path().join("notes/wip.draft.md"), false));
        assert!(!filter.is_ignored(&dir.path().join("notes/wip.md"), false));
    }

    #[test]
    fn test_root_never_ignored() {
        let (dir, filter) = filter_with_gitignore(None);
        assert!(!filter.is_ignored(dir.path(), true));
    }
}
