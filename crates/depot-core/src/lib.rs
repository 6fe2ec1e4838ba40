//! # depot-core
//!
//! The write path of the depot object server: a local directory exposed as
//! an object store where every write is staged, optionally verified against
//! caller-declared digests, and then atomically promoted. Failed writes leave
//! no trace, neither the partial file nor the directories created to hold it.
//!
//! ## Layout
//!
//! - [`digest`]: `Digest` header parsing and streaming verification.
//! - [`staging`]: the staging file that is either committed or discarded.
//! - [`dirs`]: parent directory creation and empty-ancestor pruning.
//! - [`rollback`]: the ordered undo log run when a write fails.
//! - [`path`]: request path to storage path resolution.
//! - [`store`]: the orchestrator tying the above into `put` and `delete`.
//!
//! Everything here is blocking `std::io`. Async callers run it on a
//! blocking pool.

pub mod digest;
pub mod dirs;
pub mod error;
pub mod path;
pub mod rollback;
pub mod staging;
pub mod store;
pub mod tee;

pub use digest::{DigestSet, DigestValidator, supported_algorithms};
pub use error::{DigestError, StoreError};
pub use path::TargetPath;
pub use rollback::{RollbackAction, RollbackSet};
pub use staging::{StagingFile, STAGING_PREFIX};
pub use store::{ObjectStore, StoreConfig, WriteState};
