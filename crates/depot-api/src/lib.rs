//! # depot-api — HTTP Surface for the depot Object Store
//!
//! Serves a directory over HTTP. Uploads are staged, checked against any
//! `Digest` header the client sends, and atomically promoted; deletes prune
//! the directories they empty. See `depot-core` for the write path itself.
//!
//! ## API Surface
//!
//! | Method    | Path              | Result                                  |
//! |-----------|-------------------|-----------------------------------------|
//! | `GET`     | `{base}/{path}`   | file content, `404` if absent           |
//! | `PUT`     | `{base}/{path}`   | `204`; raw body or multipart `file`     |
//! | `DELETE`  | `{base}/{path}`   | `204`, `404` if absent                  |
//! | `OPTIONS` | any               | `200` with `Allow`                      |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → Access-Control-Allow-Origin → AuthMiddleware → Handler
//! ```

pub mod auth;
pub mod body;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;

use axum::extract::DefaultBodyLimit;
use axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use axum::http::HeaderValue;
use axum::middleware::from_fn;
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::state::AppState;

/// Assemble the application router with all middleware.
///
/// Uploads are streamed to disk, so the default request body limit is
/// disabled.
pub fn app(state: AppState) -> Router {
    let auth_config = state.config.auth.clone();

    Router::new()
        .fallback(routes::objects::dispatch)
        .layer(DefaultBodyLimit::disable())
        .layer(from_fn(auth::auth_middleware))
        .layer(axum::Extension(auth_config))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(middleware::tracing_layer::layer())
        .with_state(state)
}
