//! Classifier: copy as files or archive as zip.
//!
//! A directory at exactly `zip_depth` holding at least `zip_file_quantity`
//! descendant files is archived as a unit. Everything below an archived
//! directory is left out of the plain copy, so each file ends up in the
//! destination exactly once.

use crate::scan::Tree;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Three disjoint sets of relative paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Directories to pack into `<dir>.zip`
    pub archive: BTreeSet<PathBuf>,
    /// Directories to create in the destination (root excluded)
    pub create: BTreeSet<PathBuf>,
    /// Files to copy one by one
    pub copy: BTreeSet<PathBuf>,
}

pub fn classify(tree: &Tree, zip_depth: usize, zip_file_quantity: u64) -> Classification {
    let archive: BTreeSet<PathBuf> = tree
        .dirs
        .iter()
        .filter(|(_, d)| d.depth == zip_depth && d.files >= zip_file_quantity)
        .map(|(p, _)| p.clone())
        .collect();

    let create = tree
        .dirs
        .keys()
        .filter(|p| !p.as_os_str().is_empty() && !is_archived(p, &archive))
        .cloned()
        .collect();

    let copy = tree
        .files
        .keys()
        .filter(|p| !is_archived(p, &archive))
        .cloned()
        .collect();

    Classification {
        archive,
        create,
        copy,
    }
}

/// True if `path` or one of its ancestors is archived.
///
/// Compares whole components: `Foo2` is not below `Foo`.
pub fn is_archived(path: &Path, archive: &BTreeSet<PathBuf>) -> bool {
    !archive.is_empty() && path.ancestors().any(|a| archive.contains(a))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::scan_tree;
    use std::fs;

    fn populate(root: &Path, dir: &str, count: usize) {
        let dir = root.join(dir);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            fs::write(dir.join(format!("f{i}.txt")), b"x").unwrap();
        }
    }

    #[test]
    fn test_archives_dense_directory_at_depth() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        populate(root, "case/bulk", 12);
        populate(root, "case/bulk/inner", 3);
        populate(root, "case/sparse", 2);
        fs::write(root.join("case/doc.txt"), b"doc").unwrap();

        let tree = scan_tree(root).unwrap();
        let plan = classify(&tree, 2, 10);

        assert_eq!(plan.archive, BTreeSet::from([PathBuf::from("case/bulk")]));
        assert_eq!(
            plan.create,
            BTreeSet::from([PathBuf::from("case"), PathBuf::from("case/sparse")])
        );
        assert_eq!(plan.copy.len(), 3);
        assert!(plan.copy.iter().all(|p| !p.starts_with("case/bulk")));
    }

    #[test]
    fn test_sibling_with_common_prefix_is_not_excluded() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        populate(root, "c/Foo", 10);
        populate(root, "c/Foo2", 1);

        let tree = scan_tree(root).unwrap();
        let plan = classify(&tree, 2, 10);

        assert!(plan.archive.contains(Path::new("c/Foo")));
        assert!(!plan.create.contains(Path::new("c/Foo")));
        assert!(plan.create.contains(Path::new("c/Foo2")));
        assert!(plan.copy.contains(Path::new("c/Foo2/f0.txt")));
    }

    #[test]
    fn test_counts_descendants_not_direct_children() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        populate(root, "c/deep/x", 5);
        populate(root, "c/deep/y", 5);

        let tree = scan_tree(root).unwrap();
        let plan = classify(&tree, 2, 10);

        assert_eq!(plan.archive, BTreeSet::from([PathBuf::from("c/deep")]));
        assert!(plan.copy.is_empty());
        assert_eq!(plan.create, BTreeSet::from([PathBuf::from("c")]));
    }

    #[test]
    fn test_below_threshold_copies_everything() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path();
        populate(root, "c/small", 9);

        let tree = scan_tree(root).unwrap();
        let plan = classify(&tree, 2, 10);

        assert!(plan.archive.is_empty());
        assert_eq!(plan.copy.len(), 9);
        assert_eq!(plan.create.len(), 2);
    }
}
