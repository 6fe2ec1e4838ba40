//! # Directory Lifecycle
//!
//! Parent directories are created on demand before a write and removed
//! again, once empty, after a delete or a failed write. Pruning never
//! touches the storage root or anything above it.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::StoreError;

/// Create every missing directory above `target`.
pub fn ensure_parents(target: &Path) -> io::Result<()> {
    let Some(parent) = target.parent() else {
        return Ok(());
    };
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(parent)
}

/// Remove `start` and each of its ancestors while they are empty, stopping
/// at `root`.
///
/// Both paths are compared in absolute, lexically normalized form. A start
/// directory that does not exist or lies outside `root` is left alone.
pub fn prune_empty_ancestors(root: &Path, start: &Path) -> Result<(), StoreError> {
    let prune_err = |path: &Path, source: io::Error| StoreError::Prune {
        path: path.to_path_buf(),
        source,
    };
    let root = absolutize(root).map_err(|e| prune_err(root, e))?;
    let mut current = absolutize(start).map_err(|e| prune_err(start, e))?;

    while current != root {
        if !current.starts_with(&root) || !current.is_dir() {
            return Ok(());
        }
        match emptiness(&current).map_err(|e| prune_err(&current, e))? {
            Some(true) => {}
            Some(false) | None => return Ok(()),
        }
        match fs::remove_dir(&current) {
            Ok(()) => tracing::debug!(path = %current.display(), "removed empty directory"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(prune_err(&current, e)),
        }
        if !current.pop() {
            break;
        }
    }
    Ok(())
}

/// Whether the directory at `path` is empty, or `None` if it is already gone.
fn emptiness(path: &Path) -> io::Result<Option<bool>> {
    match fs::read_dir(path) {
        Ok(mut entries) => Ok(Some(entries.next().is_none())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Absolute form of `path` with `.` and `..` resolved lexically. Symlinks
/// are not followed.
pub fn absolutize(path: &Path) -> io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(normalize(&joined))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                out.push(component.as_os_str())
            }
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_parents_creates_nested_directories() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("a/b/c/file.txt");
        ensure_parents(&target).unwrap();
        assert!(root.path().join("a/b/c").is_dir());
        assert!(!target.exists());
    }

    #[test]
    fn ensure_parents_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("a/file.txt");
        ensure_parents(&target).unwrap();
        ensure_parents(&target).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn created_directories_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        ensure_parents(&root.path().join("private/file")).unwrap();
        let mode = fs::metadata(root.path().join("private")).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn ensure_parents_fails_when_a_component_is_a_file() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a"), b"x").unwrap();
        assert!(ensure_parents(&root.path().join("a/b/file")).is_err());
    }

    #[test]
    fn prune_removes_empty_chain_but_keeps_root() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("a/b/c")).unwrap();
        prune_empty_ancestors(root.path(), &root.path().join("a/b/c")).unwrap();
        assert!(!root.path().join("a").exists());
        assert!(root.path().is_dir());
    }

    #[test]
    fn prune_stops_at_first_non_empty_directory() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("a/b/c")).unwrap();
        fs::write(root.path().join("a/keep.txt"), b"x").unwrap();
        prune_empty_ancestors(root.path(), &root.path().join("a/b/c")).unwrap();
        assert!(!root.path().join("a/b").exists());
        assert!(root.path().join("a/keep.txt").is_file());
    }

    #[test]
    fn prune_of_missing_directory_is_a_no_op() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("a")).unwrap();
        prune_empty_ancestors(root.path(), &root.path().join("a/missing")).unwrap();
        assert!(root.path().join("a").is_dir());
    }

    #[test]
    fn directory_removed_before_listing_counts_as_clean() {
        let root = tempfile::tempdir().unwrap();
        let gone = root.path().join("gone");
        fs::create_dir(&gone).unwrap();
        assert_eq!(emptiness(&gone).unwrap(), Some(true));
        fs::write(gone.join("f"), b"x").unwrap();
        assert_eq!(emptiness(&gone).unwrap(), Some(false));
        fs::remove_dir_all(&gone).unwrap();
        assert_eq!(emptiness(&gone).unwrap(), None);
    }

    #[test]
    fn prune_never_leaves_the_root() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join("root");
        let sibling = outer.path().join("sibling");
        fs::create_dir(&root).unwrap();
        fs::create_dir(&sibling).unwrap();
        prune_empty_ancestors(&root, &sibling).unwrap();
        assert!(sibling.is_dir());
    }

    #[test]
    fn prune_treats_unnormalized_paths_as_equal() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("a")).unwrap();
        let dotted_root = root.path().join("a/..");
        prune_empty_ancestors(&dotted_root, &root.path().join("a/./")).unwrap();
        assert!(!root.path().join("a").exists());
        assert!(root.path().is_dir());
    }

    #[test]
    fn normalize_resolves_dots() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/../a")), PathBuf::from("/a"));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn prune_clears_any_depth_and_keeps_root(depth in 1usize..12) {
                let root = tempfile::tempdir().unwrap();
                let mut deepest = root.path().to_path_buf();
                for level in 0..depth {
                    deepest.push(format!("d{level}"));
                }
                fs::create_dir_all(&deepest).unwrap();

                prune_empty_ancestors(root.path(), &deepest).unwrap();

                prop_assert!(root.path().is_dir());
                prop_assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
            }
        }
    }
}
