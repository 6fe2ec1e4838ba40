//! # Object Store
//!
//! Composes digest verification, staging, directory management and the
//! rollback log into the two mutating operations of the depot:
//!
//! - [`ObjectStore::put`] streams a body into a staging file next to the
//!   target, verifies any declared digests, and promotes the staging file
//!   onto the target. Any failure rolls back the staging file and the
//!   directories created for it.
//! - [`ObjectStore::delete`] removes a file or directory tree and prunes the
//!   ancestors left empty.
//!
//! ## Write states
//!
//! ```text
//! Start -> DirsEnsured -> Staged -> Streamed -> Committed
//!    \          \            \          \
//!     +----------+------------+----------+---> RolledBack
//! ```
//!
//! `Committed` and `RolledBack` are terminal and assigned at most once.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::digest::DigestSet;
use crate::dirs;
use crate::error::StoreError;
use crate::path::TargetPath;
use crate::rollback::{RollbackAction, RollbackSet};
use crate::staging::StagingFile;
use crate::tee::Tee;

/// Store settings, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory all objects live under.
    pub root: PathBuf,
    /// URL path prefix stripped from request paths.
    pub base_path: String,
    /// Reject writes that declare no supported digest.
    pub require_digest: bool,
}

/// Progress of a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    Start,
    DirsEnsured,
    Staged,
    Streamed,
    Committed,
    RolledBack,
}

impl WriteState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl fmt::Display for WriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::DirsEnsured => "dirs-ensured",
            Self::Staged => "staged",
            Self::Streamed => "streamed",
            Self::Committed => "committed",
            Self::RolledBack => "rolled-back",
        };
        f.write_str(name)
    }
}

/// Bookkeeping for one in-flight write.
struct WriteTxn {
    path: PathBuf,
    state: WriteState,
    rollback: RollbackSet,
    staging: Option<StagingFile>,
}

impl WriteTxn {
    fn begin(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            state: WriteState::Start,
            rollback: RollbackSet::new(),
            staging: None,
        }
    }

    fn advance(&mut self, next: WriteState) {
        assert!(
            !self.state.is_terminal(),
            "write to {} advanced to {next} after finishing as {}",
            self.path.display(),
            self.state
        );
        tracing::trace!(path = %self.path.display(), from = %self.state, to = %next, "write state");
        self.state = next;
    }

    fn finish(&mut self, terminal: WriteState) {
        debug_assert!(terminal.is_terminal());
        self.advance(terminal);
    }

    /// Mark the write rolled back, run the undo log, and hand back `err`.
    fn abort(&mut self, err: StoreError) -> StoreError {
        self.finish(WriteState::RolledBack);
        let actions = std::mem::take(&mut self.rollback);
        actions.run(self.staging.as_mut());
        err
    }
}

/// Local directory exposed as an object store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    config: Arc<StoreConfig>,
}

impl ObjectStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Create the storage root if it is missing and open the store.
    pub fn open(config: StoreConfig) -> io::Result<Self> {
        fs::create_dir_all(&config.root)?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Map a decoded request path onto the storage root.
    pub fn resolve(&self, request_path: &str) -> Result<TargetPath, StoreError> {
        TargetPath::resolve(&self.config.root, &self.config.base_path, request_path)
    }

    /// Write `body` to `target`, verified against `digest_header` if given.
    ///
    /// The digest header is parsed and checked against policy before the
    /// filesystem is touched. Returns the number of bytes stored.
    pub fn put<R: Read>(
        &self,
        target: &TargetPath,
        digest_header: Option<&str>,
        mut body: R,
    ) -> Result<u64, StoreError> {
        if target.is_root() {
            return Err(StoreError::InvalidPath("cannot write to the storage root".into()));
        }
        let path = target.absolute();

        let mut digests = match DigestSet::parse(digest_header.unwrap_or_default()) {
            Ok(digests) => digests,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "digest could not be parsed");
                return Err(e.into());
            }
        };
        if self.config.require_digest && digests.is_empty() {
            tracing::warn!(path = %path.display(), "missing digest");
            return Err(StoreError::DigestMissing);
        }

        let mut txn = WriteTxn::begin(path);
        let parent = path.parent().unwrap_or(self.config.root.as_path()).to_path_buf();
        txn.rollback.push(RollbackAction::DiscardStaging);
        txn.rollback.push(RollbackAction::PruneEmptyDirs {
            root: self.config.root.clone(),
            start: parent,
        });

        if let Err(source) = dirs::ensure_parents(path) {
            tracing::warn!(path = %path.display(), error = %source, "path could not be created");
            return Err(txn.abort(StoreError::CreateDirs {
                path: path.to_path_buf(),
                source,
            }));
        }
        txn.advance(WriteState::DirsEnsured);

        match StagingFile::open(path) {
            Ok(staging) => txn.staging = Some(staging),
            Err(source) => {
                tracing::error!(path = %path.display(), error = %source, "file could not be created");
                return Err(txn.abort(StoreError::Stage {
                    path: path.to_path_buf(),
                    source,
                }));
            }
        }
        txn.advance(WriteState::Staged);

        let copied = match txn.staging.as_mut() {
            Some(staging) => io::copy(&mut body, &mut Tee::new(staging, &mut digests)),
            None => Err(io::Error::other("staging file missing")),
        };
        let written = match copied {
            Ok(written) => written,
            Err(source) => {
                tracing::error!(path = %path.display(), error = %source, "file could not be saved");
                return Err(txn.abort(StoreError::Write {
                    path: path.to_path_buf(),
                    source,
                }));
            }
        };
        txn.advance(WriteState::Streamed);

        if !digests.is_valid() {
            tracing::warn!(
                path = %path.display(),
                algorithms = ?digests.algorithms(),
                "invalid digest"
            );
            return Err(txn.abort(StoreError::DigestMismatch {
                path: path.to_path_buf(),
            }));
        }

        let committed = match txn.staging.as_mut() {
            Some(staging) => staging.commit(),
            None => Err(io::Error::other("staging file missing")),
        };
        if let Err(source) = committed {
            tracing::error!(path = %path.display(), error = %source, "file could not be committed");
            return Err(txn.abort(StoreError::Commit {
                path: path.to_path_buf(),
                source,
            }));
        }
        txn.finish(WriteState::Committed);

        tracing::debug!(path = %path.display(), bytes = written, "file written");
        Ok(written)
    }

    /// Remove the file or directory tree at `target` and prune the empty
    /// ancestors it leaves behind.
    pub fn delete(&self, target: &TargetPath) -> Result<(), StoreError> {
        if target.is_root() {
            return Err(StoreError::InvalidPath("cannot delete the storage root".into()));
        }
        let path = target.absolute();

        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "file not found");
                return Err(StoreError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                tracing::error!(path = %path.display(), error = %source, "file could not be inspected");
                return Err(StoreError::Stat {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let removed = if metadata.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        if let Err(source) = removed {
            tracing::error!(path = %path.display(), error = %source, "file could not be deleted");
            return Err(StoreError::Remove {
                path: path.to_path_buf(),
                source,
            });
        }

        if let Some(parent) = path.parent() {
            if let Err(e) = dirs::prune_empty_ancestors(&self.config.root, parent) {
                tracing::error!(path = %path.display(), error = %e, "could not clean empty directories");
                return Err(e);
            }
        }

        tracing::debug!(path = %path.display(), "file deleted");
        Ok(())
    }
}
