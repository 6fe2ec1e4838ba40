//! # Store Errors
//!
//! Errors produced by the write and delete paths. Each filesystem failure
//! carries the path it concerns and the underlying `std::io::Error`, so the
//! caller can log the cause while answering the client with a generic
//! message.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A recognized algorithm whose expected value was not valid base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestParseFailure {
    /// Algorithm name as registered (lower case).
    pub algorithm: &'static str,
    /// Decoder error for the expected value.
    pub source: base64::DecodeError,
}

impl fmt::Display for DigestParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.algorithm, self.source)
    }
}

/// A `Digest` header named a supported algorithm but its value could not be
/// decoded. All failing tokens are collected, not only the first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", render_failures(.failures))]
pub struct DigestError {
    pub failures: Vec<DigestParseFailure>,
}

fn render_failures(failures: &[DigestParseFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Failure of a store operation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The `Digest` header could not be parsed.
    #[error("digest could not be parsed: {0}")]
    Digest(#[from] DigestError),

    /// A digest is required by policy but the request declared none.
    #[error("digest required but none was supplied")]
    DigestMissing,

    /// The uploaded bytes do not match the declared digest.
    #[error("digest mismatch for {}", .path.display())]
    DigestMismatch { path: PathBuf },

    /// The request path cannot name an object.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A path component uses the staging file prefix.
    #[error("path component {0:?} is reserved")]
    ReservedPath(String),

    /// The request path does not start with the configured base path.
    #[error("path {0:?} is outside the base path")]
    OutsideBase(String),

    /// The object to delete does not exist.
    #[error("no object at {}", .0.display())]
    NotFound(PathBuf),

    /// Parent directories could not be created.
    #[error("failed to create directories for {}: {source}", .path.display())]
    CreateDirs { path: PathBuf, source: io::Error },

    /// The staging file could not be created.
    #[error("failed to create staging file for {}: {source}", .path.display())]
    Stage { path: PathBuf, source: io::Error },

    /// Copying the body into the staging file failed.
    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    /// Promoting the staging file onto the target failed.
    #[error("failed to commit {}: {source}", .path.display())]
    Commit { path: PathBuf, source: io::Error },

    /// The object to delete could not be inspected.
    #[error("failed to stat {}: {source}", .path.display())]
    Stat { path: PathBuf, source: io::Error },

    /// The object could not be removed.
    #[error("failed to remove {}: {source}", .path.display())]
    Remove { path: PathBuf, source: io::Error },

    /// An empty ancestor directory could not be removed.
    #[error("failed to prune {}: {source}", .path.display())]
    Prune { path: PathBuf, source: io::Error },
}

impl StoreError {
    /// HTTP status class of this error: 400 and 404 for problems with the
    /// request, 500 for filesystem faults.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Digest(_)
            | Self::DigestMissing
            | Self::DigestMismatch { .. }
            | Self::InvalidPath(_)
            | Self::ReservedPath(_) => 400,
            Self::OutsideBase(_) | Self::NotFound(_) => 404,
            Self::CreateDirs { .. }
            | Self::Stage { .. }
            | Self::Write { .. }
            | Self::Commit { .. }
            | Self::Stat { .. }
            | Self::Remove { .. }
            | Self::Prune { .. } => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}
