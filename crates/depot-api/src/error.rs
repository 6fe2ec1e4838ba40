//! # API Error Types
//!
//! Error type implementing `axum::response::IntoResponse`. Maps store
//! errors to HTTP status codes with short plain-text bodies. Filesystem
//! faults answer with a fixed message per operation; their cause is logged
//! by the store, never sent to the client.

use axum::http::header::{ALLOW, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use depot_core::{StoreError, supported_algorithms};
use thiserror::Error;

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed request, bad or mismatched digest, reserved path (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or wrong token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Object does not exist (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Method not served at this path (405). `allow` becomes the `Allow`
    /// header.
    #[error("method not allowed, expected one of {allow}")]
    MethodNotAllowed { allow: &'static str },

    /// Server-side failure (500). Only `message` reaches the client.
    #[error("internal error: {detail}")]
    Internal {
        message: &'static str,
        detail: String,
    },
}

impl AppError {
    pub fn internal(message: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Internal {
            message,
            detail: detail.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text sent to the client.
    pub fn public_message(&self) -> &str {
        match self {
            Self::BadRequest(msg) | Self::Unauthorized(msg) | Self::NotFound(msg) => msg,
            Self::MethodNotAllowed { .. } => "Method not allowed",
            Self::Internal { message, .. } => message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = format!("{}\n", self.public_message());
        let mut response = (
            self.status(),
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response();
        if let Self::MethodNotAllowed { allow } = self {
            if let Ok(value) = allow.parse() {
                response.headers_mut().insert(ALLOW, value);
            }
        }
        response
    }
}

fn supported() -> String {
    supported_algorithms().collect::<Vec<_>>().join(", ")
}

/// Convert store errors to API errors.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Digest(e) => Self::BadRequest(format!("Digest could not be parsed \n\n{e}")),
            StoreError::DigestMissing => Self::BadRequest(format!(
                "Missing digest. Supported algorithms: {}",
                supported()
            )),
            StoreError::DigestMismatch { .. } => Self::BadRequest(format!(
                "Invalid digest. Supported algorithms: {}",
                supported()
            )),
            StoreError::InvalidPath(_) | StoreError::ReservedPath(_) => {
                Self::BadRequest(err.to_string())
            }
            StoreError::OutsideBase(_) | StoreError::NotFound(_) => {
                Self::NotFound("Not found".into())
            }
            StoreError::CreateDirs { .. } => Self::internal(
                "Path could not be created. Make sure the path is correct",
                err,
            ),
            StoreError::Stage { .. } => Self::internal("File could not be created/opened", err),
            StoreError::Write { .. } | StoreError::Commit { .. } => {
                Self::internal("File could not be saved", err)
            }
            StoreError::Stat { .. } | StoreError::Remove { .. } => {
                Self::internal("File could not be deleted", err)
            }
            StoreError::Prune { .. } => Self::internal("Could not clean empty directories", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    use http_body_util::BodyExt;

    async fn body_of(err: AppError) -> (StatusCode, String, Option<String>) {
        let response = err.into_response();
        let status = response.status();
        let allow = response
            .headers()
            .get(ALLOW)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap(), allow)
    }

    #[test]
    fn status_codes() {
        assert_eq!(AppError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthorized("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::MethodNotAllowed { allow: "GET" }.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            AppError::internal("boom", "detail").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn internal_detail_is_not_exposed() {
        let err = AppError::from(StoreError::Write {
            path: PathBuf::from("/srv/secret/path"),
            source: io::Error::other("disk on fire"),
        });
        let (status, body, _) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "File could not be saved\n");
    }

    #[tokio::test]
    async fn method_not_allowed_sets_allow_header() {
        let (status, _, allow) = body_of(AppError::MethodNotAllowed { allow: "GET" }).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(allow.as_deref(), Some("GET"));
    }

    #[test]
    fn digest_errors_name_supported_algorithms() {
        let missing = AppError::from(StoreError::DigestMissing);
        assert_eq!(
            missing.public_message(),
            "Missing digest. Supported algorithms: sha-256, md5"
        );
        let mismatch = AppError::from(StoreError::DigestMismatch {
            path: PathBuf::from("/x"),
        });
        assert_eq!(mismatch.status(), StatusCode::BAD_REQUEST);
        assert!(mismatch.public_message().starts_with("Invalid digest."));
    }

    #[test]
    fn missing_objects_map_to_404() {
        let err = AppError::from(StoreError::NotFound(PathBuf::from("/x")));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn delete_failures_have_their_own_messages() {
        let remove = AppError::from(StoreError::Remove {
            path: PathBuf::from("/x"),
            source: io::Error::other("busy"),
        });
        assert_eq!(remove.public_message(), "File could not be deleted");
        let prune = AppError::from(StoreError::Prune {
            path: PathBuf::from("/x"),
            source: io::Error::other("busy"),
        });
        assert_eq!(prune.public_message(), "Could not clean empty directories");
    }
}
