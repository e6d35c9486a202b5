//! Tree scanner.
//!
//! Walks a source root once and records every directory and file below it
//! with its depth and size. Directory records carry the aggregate size and
//! file count of all descendant files, which is what the classifier needs.
//!
//! Unreadable entries do not abort the scan. They are collected in
//! [`Tree::skipped`] and the caller decides how loudly to report them. Only a
//! root that cannot be listed at all is an error.

use crate::error::EngineError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A directory below the root, including the root itself (empty path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirRecord {
    /// Number of relative path components (root = 0)
    pub depth: usize,
    /// Sum of all descendant file sizes
    pub size: u64,
    /// Number of descendant files
    pub files: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRecord {
    pub depth: usize,
    pub size: u64,
}

/// An entry left out of the tree, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of scanning one root. Keys are paths relative to the root.
#[derive(Debug, Clone)]
pub struct Tree {
    pub root: PathBuf,
    pub dirs: BTreeMap<PathBuf, DirRecord>,
    pub files: BTreeMap<PathBuf, FileRecord>,
    pub skipped: Vec<SkippedEntry>,
}

impl Tree {
    /// Total bytes of all files
    pub fn total_size(&self) -> u64 {
        self.dirs.get(Path::new("")).map(|d| d.size).unwrap_or(0)
    }

    /// Relative paths of all entries, directories first
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.dirs.keys().chain(self.files.keys())
    }
}

/// Scan `root` recursively.
///
/// # Errors
/// `NotADirectory` if the root is missing or not a directory,
/// `EnumerationFailed` if the root itself cannot be listed.
pub fn scan_tree(root: &Path) -> Result<Tree, EngineError> {
    match fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => {}
        _ => {
            return Err(EngineError::NotADirectory {
                path: root.to_path_buf(),
            })
        }
    }
    fs::read_dir(root).map_err(|e| EngineError::EnumerationFailed {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut tree = Tree {
        root: root.to_path_buf(),
        dirs: BTreeMap::from([(PathBuf::new(), DirRecord::default())]),
        files: BTreeMap::new(),
        skipped: Vec::new(),
    };

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                tree.skip(path, e.to_string());
                continue;
            }
        };
        let rel_path = match entry.path().strip_prefix(root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => continue,
        };
        let depth = entry.depth();
        let file_type = entry.file_type();

        if file_type.is_dir() {
            tree.dirs.insert(
                rel_path,
                DirRecord {
                    depth,
                    ..DirRecord::default()
                },
            );
            continue;
        }

        // Links to files are copied as files, links to directories are not followed
        let metadata = if file_type.is_symlink() {
            fs::metadata(entry.path())
        } else {
            entry.metadata().map_err(std::io::Error::from)
        };
        match metadata {
            Ok(m) if m.is_file() => tree.add_file(rel_path, depth, m.len()),
            Ok(m) if m.is_dir() => {
                tree.skip(entry.into_path(), "link to a directory is not followed".to_string())
            }
            Ok(_) => tree.skip(entry.into_path(), "not a regular file".to_string()),
            Err(e) => tree.skip(entry.into_path(), e.to_string()),
        }
    }

    Ok(tree)
}

impl Tree {
    fn add_file(&mut self, rel_path: PathBuf, depth: usize, size: u64) {
        for ancestor in rel_path.ancestors().skip(1) {
            if let Some(dir) = self.dirs.get_mut(ancestor) {
                dir.size += size;
                dir.files += 1;
            }
        }
        self.files.insert(rel_path, FileRecord { depth, size });
    }

    fn skip(&mut self, path: PathBuf, reason: String) {
        tracing::debug!(path = %path.display(), %reason, "skipping entry");
        self.skipped.push(SkippedEntry { path, reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_depths_and_aggregates() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        write(&root.join("doc.txt"), b"hello world!");
        write(&root.join("a/one.bin"), &[0u8; 10]);
        write(&root.join("a/b/two.bin"), &[0u8; 20]);
        write(&root.join("a/b/three.bin"), &[0u8; 30]);
        fs::create_dir(root.join("empty")).unwrap();

        let tree = scan_tree(root).expect("Failed to scan");

        assert_eq!(tree.dirs[Path::new("")], DirRecord { depth: 0, size: 72, files: 4 });
        assert_eq!(tree.dirs[Path::new("a")], DirRecord { depth: 1, size: 60, files: 3 });
        assert_eq!(tree.dirs[Path::new("a/b")], DirRecord { depth: 2, size: 50, files: 2 });
        assert_eq!(tree.dirs[Path::new("empty")], DirRecord { depth: 1, size: 0, files: 0 });
        assert_eq!(tree.files[Path::new("doc.txt")], FileRecord { depth: 1, size: 12 });
        assert_eq!(tree.files[Path::new("a/b/two.bin")], FileRecord { depth: 3, size: 20 });
        assert_eq!(tree.total_size(), 72);
        assert_eq!(tree.paths().count(), 8);
        assert!(tree.skipped.is_empty());
    }

    #[test]
    fn test_root_must_be_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file = temp_dir.path().join("file.txt");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(scan_tree(&file), Err(EngineError::NotADirectory { .. })));
        assert!(matches!(
            scan_tree(&temp_dir.path().join("missing")),
            Err(EngineError::NotADirectory { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_link_is_skipped_not_fatal() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        write(&root.join("keep.txt"), b"keep");
        std::os::unix::fs::symlink(root.join("gone"), root.join("dangling")).unwrap();
        std::os::unix::fs::symlink(root.join("keep.txt"), root.join("alias.txt")).unwrap();

        let tree = scan_tree(root).expect("Scan should tolerate bad entries");

        assert_eq!(tree.files.len(), 2);
        assert_eq!(tree.files[Path::new("alias.txt")].size, 4);
        assert_eq!(tree.skipped.len(), 1);
        assert_eq!(tree.skipped[0].path, root.join("dangling"));
    }
}
