//! # Authentication Middleware
//!
//! Per-method shared-secret tokens. `GET`, `PUT` and `DELETE` each have an
//! optional token; a method without one is open.
//!
//! ## Token sources
//!
//! ```text
//! ?token={secret}                         query parameter, checked first
//! {AUTH_HEADER}: {AUTH_HEADER_PREFIX}{secret}   default "Authorization: Bearer {secret}"
//! ```

use std::collections::HashMap;

use axum::extract::{Query, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderName, Method, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::error::AppError;

// ── Configuration ───────────────────────────────────────────────────────────

/// Token required for each method, if any.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct MethodTokens {
    pub get: Option<String>,
    pub put: Option<String>,
    pub delete: Option<String>,
}

/// Configuration for the auth middleware.
///
/// Injected via Axum `Extension`.
#[derive(Clone)]
pub struct AuthConfig {
    pub tokens: MethodTokens,
    /// Header carrying the token when no `token` query parameter is given.
    pub header: HeaderName,
    /// Required prefix of the header value, stripped before comparison.
    pub prefix: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            tokens: MethodTokens::default(),
            header: AUTHORIZATION,
            prefix: "Bearer ".to_string(),
        }
    }
}

impl AuthConfig {
    /// Token guarding `method`, or `None` when the method is open.
    pub fn token_for(&self, method: &Method) -> Option<&str> {
        let token = match *method {
            Method::GET => &self.tokens.get,
            Method::PUT => &self.tokens.put,
            Method::DELETE => &self.tokens.delete,
            _ => return None,
        };
        token.as_deref()
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("AuthConfig")
            .field("token_get", &redact(&self.tokens.get))
            .field("token_put", &redact(&self.tokens.put))
            .field("token_delete", &redact(&self.tokens.delete))
            .field("header", &self.header)
            .field("prefix", &self.prefix)
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of tokens.
///
/// When lengths differ, performs a dummy comparison so the rejection takes
/// about as long as a same-length mismatch.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

fn query_token(uri: &Uri) -> Option<String> {
    let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params.remove("token").filter(|token| !token.is_empty())
}

fn header_token(config: &AuthConfig, headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(value) = headers.get(&config.header) else {
        return Ok(None);
    };
    let value = value.to_str().unwrap_or_default();
    if value.is_empty() {
        return Ok(None);
    }
    match value.strip_prefix(config.prefix.as_str()) {
        Some(token) => Ok(Some(token.to_string())),
        None => {
            tracing::warn!(header = %config.header, "authentication failed: wrong header prefix");
            Err(AppError::Unauthorized("Wrong header prefix".into()))
        }
    }
}

/// Check the request against the token configured for its method.
pub fn authorize(config: &AuthConfig, method: &Method, uri: &Uri, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = config.token_for(method) else {
        return Ok(());
    };
    let provided = match query_token(uri) {
        Some(token) => Some(token),
        None => header_token(config, headers)?,
    };
    let Some(provided) = provided.filter(|token| !token.is_empty()) else {
        tracing::warn!(%method, "authentication failed: missing token");
        return Err(AppError::Unauthorized("Missing token".into()));
    };
    if !constant_time_token_eq(&provided, expected) {
        tracing::warn!(%method, "authentication failed: wrong token");
        return Err(AppError::Unauthorized("Wrong token".into()));
    }
    Ok(())
}

// ── Middleware ──────────────────────────────────────────────────────────────

/// Axum middleware enforcing [`AuthConfig`].
///
/// Requests pass through untouched when no `AuthConfig` extension is
/// installed.
pub async fn auth_middleware(request: Request, next: Next) -> Response {
    let verdict = match request.extensions().get::<AuthConfig>() {
        Some(config) => authorize(config, request.method(), request.uri(), request.headers()),
        None => Ok(()),
    };
    match verdict {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}
