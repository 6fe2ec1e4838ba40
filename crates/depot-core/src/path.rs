//! Request path to storage path resolution.
//!
//! Request paths are cleaned lexically (duplicate separators, `.` and `..`
//! collapse, and `..` never climbs above `/`), stripped of the base path,
//! and joined onto the storage root. The result cannot leave the root.

use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::staging::STAGING_PREFIX;

/// Location of an object under the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPath {
    segments: Vec<String>,
    absolute: PathBuf,
}

impl TargetPath {
    /// Resolve a decoded request path against `root` and `base_path`.
    pub fn resolve(root: &Path, base_path: &str, request_path: &str) -> Result<Self, StoreError> {
        let base = clean_segments(base_path);
        let mut segments = clean_segments(request_path);
        if !segments.starts_with(&base) {
            return Err(StoreError::OutsideBase(request_path.to_string()));
        }
        let segments = segments.split_off(base.len());

        for segment in &segments {
            if segment.starts_with(STAGING_PREFIX) {
                return Err(StoreError::ReservedPath(segment.clone()));
            }
            if cfg!(windows) && segment.contains(['\\', ':']) {
                return Err(StoreError::InvalidPath(request_path.to_string()));
            }
        }

        let absolute = segments
            .iter()
            .fold(root.to_path_buf(), |path, segment| path.join(segment));
        Ok(Self { segments, absolute })
    }

    /// Filesystem path of the object.
    pub fn absolute(&self) -> &Path {
        &self.absolute
    }

    /// Path components below the storage root.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether the path names the storage root itself.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// `/`-joined path relative to the storage root.
    pub fn relative(&self) -> String {
        self.segments.join("/")
    }
}

/// Lexically cleaned, non-empty components of a `/`-separated path.
pub fn clean_segments(path: &str) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other.to_string()),
        }
    }
    segments
}
