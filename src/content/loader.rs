//! Content discovery - finds markdown sources under the content root and
//! tracks them across rescans

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::{ContentItem, Identity};
use crate::error::Error;

/// Items found under one content root, keyed by identity
#[derive(Debug)]
pub struct ContentSet {
    root: PathBuf,
    items: BTreeMap<Identity, ContentItem>,
}

/// Difference between two scans of a content root
#[derive(Debug, Default)]
pub struct ChangeSet {
    /// Items seen for the first time
    pub added: Vec<Identity>,
    /// Items whose fingerprint changed
    pub changed: Vec<Identity>,
    /// Items that are no longer readable or no longer exist
    pub removed: Vec<Identity>,
    /// Files that were found but could not be read
    pub failed: Vec<Error>,
}

impl ChangeSet {
    /// Check if any changes were detected
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.changed.is_empty() || !self.removed.is_empty()
    }

    /// Get summary of changes for logging
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.added.is_empty() {
            parts.push(format!("{} added", self.added.len()));
        }
        if !self.changed.is_empty() {
            parts.push(format!("{} changed", self.changed.len()));
        }
        if !self.removed.is_empty() {
            parts.push(format!("{} removed", self.removed.len()));
        }
        if !self.failed.is_empty() {
            parts.push(format!("{} unreadable", self.failed.len()));
        }

        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl ContentSet {
    /// Create an empty set rooted at `root`; call [`ContentSet::refresh`] to fill it
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            items: BTreeMap::new(),
        }
    }

    /// Discover every content file under `root`
    pub fn scan(root: impl Into<PathBuf>) -> (Self, ChangeSet) {
        let mut set = Self::new(root);
        let changes = set.refresh();
        (set, changes)
    }

    /// Rescan the root, replacing items whose fingerprint changed and
    /// dropping items whose file disappeared
    pub fn refresh(&mut self) -> ChangeSet {
        let mut changes = ChangeSet::default();
        let mut found = BTreeMap::new();

        if !self.root.exists() {
            tracing::warn!("Content directory {:?} does not exist", self.root);
        }

        for path in discover(&self.root) {
            match ContentItem::load(&self.root, &path) {
                Ok(item) => {
                    match self.items.get(item.identity()) {
                        None => changes.added.push(item.identity().clone()),
                        Some(old) if old.fingerprint() != item.fingerprint() => {
                            changes.changed.push(item.identity().clone())
                        }
                        Some(_) => {}
                    }
                    found.insert(item.identity().clone(), item);
                }
                Err(e) => {
                    tracing::warn!("Failed to read {:?}: {}", path, e);
                    changes.failed.push(e);
                }
            }
        }

        changes.removed = self
            .items
            .keys()
            .filter(|id| !found.contains_key(*id))
            .cloned()
            .collect();

        // Unchanged items keep the instance from the previous scan
        for (id, item) in found.iter_mut() {
            if let Some(old) = self.items.remove(id) {
                if old.fingerprint() == item.fingerprint() {
                    *item = old;
                }
            }
        }
        self.items = found;

        tracing::debug!("Rescanned {:?}: {}", self.root, changes.summary());
        changes
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, identity: &Identity) -> Option<&ContentItem> {
        self.items.get(identity)
    }

    /// Items in identity order
    pub fn items(&self) -> impl Iterator<Item = &ContentItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Markdown files under `root`, skipping `_`- and `.`-prefixed entries
fn discover(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                tracing::warn!("Skipping {:?}: {}", path, e);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_markdown_file(e.path()))
        .map(DirEntry::into_path)
        .collect()
}

fn is_ignored(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('_') || name.starts_with('.'))
        .unwrap_or(false)
}

/// Check if a file is a markdown file
fn is_markdown_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "md" || e == "markdown")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    fn ids(list: &[Identity]) -> Vec<&str> {
        list.iter().map(Identity::as_str).collect()
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_finds_markdown_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "index.md", "# Home");
        write(tmp.path(), "posts/hello.markdown", "hi");
        write(tmp.path(), "posts/image.png", "png");
        write(tmp.path(), "_drafts/wip.md", "draft");
        write(tmp.path(), ".git/notes.md", "hidden");
        write(tmp.path(), "posts/_partial.md", "partial");

        let (set, changes) = ContentSet::scan(tmp.path());
        let found: Vec<_> = set.items().map(|i| i.identity().as_str()).collect();
        assert_eq!(found, vec!["index.md", "posts/hello.markdown"]);
        assert_eq!(ids(&changes.added), vec!["index.md", "posts/hello.markdown"]);
        assert!(changes.failed.is_empty());
    }

    #[test]
    fn test_scan_missing_root() {
        let tmp = TempDir::new().unwrap();
        let (set, changes) = ContentSet::scan(tmp.path().join("nope"));
        assert!(set.is_empty());
        assert!(!changes.has_changes());
    }

    #[test]
    fn test_refresh_reports_changes() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.md", "first");
        write(tmp.path(), "b.md", "stays");
        write(tmp.path(), "c.md", "goes away");

        let (mut set, _) = ContentSet::scan(tmp.path());
        let before = set.get(&Identity::from("b.md")).unwrap().fingerprint();

        write(tmp.path(), "a.md", "second");
        write(tmp.path(), "d.md", "new");
        fs::remove_file(tmp.path().join("c.md")).unwrap();

        let changes = set.refresh();
        assert_eq!(ids(&changes.added), vec!["d.md"]);
        assert_eq!(ids(&changes.changed), vec!["a.md"]);
        assert_eq!(ids(&changes.removed), vec!["c.md"]);
        assert_eq!(changes.summary(), "1 added, 1 changed, 1 removed");

        assert_eq!(set.len(), 3);
        assert_eq!(set.get(&Identity::from("a.md")).unwrap().raw(), "second");
        assert_eq!(set.get(&Identity::from("b.md")).unwrap().fingerprint(), before);
        assert!(set.get(&Identity::from("c.md")).is_none());
    }

    #[test]
    fn test_refresh_without_changes() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.md", "same");

        let (mut set, _) = ContentSet::scan(tmp.path());
        let changes = set.refresh();
        assert!(!changes.has_changes());
        assert_eq!(changes.summary(), "no changes");
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_errors_do_not_stop_discovery() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.md"), "A").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("missing"), tmp.path().join("dangling")).unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("sub/b.md"), "B").unwrap();

        let (set, changes) = ContentSet::scan(tmp.path());
        assert_eq!(set.len(), 2);
        assert!(changes.failed.is_empty());
    }
}
