//! # Staging Files
//!
//! New content is written to a uniquely named file next to its target and
//! only renamed onto the target once it is complete. Readers therefore see
//! either the previous object or the new one, never a partial write.
//!
//! A [`StagingFile`] ends in exactly one of [`commit`](StagingFile::commit)
//! or [`rollback`](StagingFile::rollback); whichever runs first finalizes
//! the handle and makes the other a no-op. Dropping an unfinalized handle
//! deletes the staging file.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::TempPath;

/// File name prefix of every staging file. Object paths containing a
/// component with this prefix are rejected so staging files can neither
/// collide with objects nor be served.
pub const STAGING_PREFIX: &str = ".depot-staging-";

#[derive(Debug)]
pub struct StagingFile {
    file: Option<File>,
    temp_path: Option<TempPath>,
    target: PathBuf,
}

impl StagingFile {
    /// Create a staging file in the directory of `target`. The directory
    /// must already exist.
    pub fn open(target: &Path) -> io::Result<Self> {
        let dir = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "target has no parent directory")
        })?;
        let (file, temp_path) = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(dir)?
            .into_parts();
        tracing::trace!(staging = %temp_path.display(), path = %target.display(), "staging file created");
        Ok(Self {
            file: Some(file),
            temp_path: Some(temp_path),
            target: target.to_path_buf(),
        })
    }

    /// Current location of the staging file, until finalized.
    pub fn path(&self) -> Option<&Path> {
        self.temp_path.as_deref()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn is_finalized(&self) -> bool {
        self.temp_path.is_none()
    }

    /// Flush, close and rename the staging file onto the target.
    ///
    /// If the platform refuses to rename over an existing file, the target
    /// is removed and the rename retried; the target is briefly absent in
    /// that case. On any failure the staging file is deleted.
    pub fn commit(&mut self) -> io::Result<()> {
        let Some(temp_path) = self.temp_path.take() else {
            return Ok(());
        };
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }

        match temp_path.persist(&self.target) {
            Ok(()) => Ok(()),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                let temp_path = err.path;
                tracing::debug!(path = %self.target.display(), "target exists, replacing");
                fs::remove_file(&self.target)?;
                temp_path.persist(&self.target).map_err(|err| err.error)
            }
            Err(err) => Err(err.error),
        }
    }

    /// Close and delete the staging file.
    pub fn rollback(&mut self) -> io::Result<()> {
        self.file = None;
        match self.temp_path.take() {
            Some(temp_path) => temp_path.close(),
            None => Ok(()),
        }
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("staging file already finalized"))
    }
}

impl Write for StagingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file_mut()?.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn staging_file_lives_next_to_target_with_reserved_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("object.bin");
        let staging = StagingFile::open(&target).unwrap();

        let staged = staging.path().unwrap();
        assert_eq!(staged.parent(), Some(dir.path()));
        let name = staged.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with(STAGING_PREFIX), "{name}");
        assert!(!target.exists());
    }

    #[test]
    fn commit_promotes_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("object.bin");
        let mut staging = StagingFile::open(&target).unwrap();
        staging.write_all(b"hello").unwrap();
        staging.commit().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"hello");
        assert_eq!(entries(dir.path()), vec!["object.bin"]);
        assert!(staging.is_finalized());
    }

    #[test]
    fn commit_replaces_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("object.bin");
        fs::write(&target, b"old").unwrap();

        let mut staging = StagingFile::open(&target).unwrap();
        staging.write_all(b"new").unwrap();
        staging.commit().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert_eq!(entries(dir.path()), vec!["object.bin"]);
    }

    #[test]
    fn rollback_discards_and_leaves_target_alone() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("object.bin");
        fs::write(&target, b"old").unwrap();

        let mut staging = StagingFile::open(&target).unwrap();
        staging.write_all(b"partial").unwrap();
        staging.rollback().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"old");
        assert_eq!(entries(dir.path()), vec!["object.bin"]);
    }

    #[test]
    fn terminal_operations_are_exclusive_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("object.bin");

        let mut staging = StagingFile::open(&target).unwrap();
        staging.write_all(b"kept").unwrap();
        staging.commit().unwrap();
        staging.commit().unwrap();
        staging.rollback().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"kept");

        let mut discarded = StagingFile::open(&dir.path().join("other.bin")).unwrap();
        discarded.rollback().unwrap();
        discarded.rollback().unwrap();
        discarded.commit().unwrap();
        assert!(!dir.path().join("other.bin").exists());
    }

    #[test]
    fn write_after_finalize_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut staging = StagingFile::open(&dir.path().join("x")).unwrap();
        staging.rollback().unwrap();
        assert!(staging.write_all(b"late").is_err());
    }

    #[test]
    fn failed_commit_still_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the target makes the rename fail.
        let target = dir.path().join("occupied");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("child"), b"x").unwrap();

        let mut staging = StagingFile::open(&target).unwrap();
        staging.write_all(b"data").unwrap();
        assert!(staging.commit().is_err());
        assert!(staging.is_finalized());
        assert_eq!(entries(dir.path()), vec!["occupied"]);
    }

    #[test]
    fn drop_without_finalize_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut staging = StagingFile::open(&dir.path().join("x")).unwrap();
            staging.write_all(b"abandoned").unwrap();
        }
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn missing_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("x");
        assert!(StagingFile::open(&target).is_err());
    }
}
