//! Object handlers: read, write and delete files under the storage root.

use std::borrow::Cow;

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::{ALLOW, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::BoxError;
use depot_core::{StoreError, TargetPath};
use futures_util::Stream;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::body;
use crate::error::AppError;
use crate::state::AppState;

/// Methods served below the base path.
pub const ALLOWED_METHODS: &str = "OPTIONS, GET, PUT, DELETE";

/// Multipart field holding the upload.
pub const FILE_FIELD: &str = "file";

/// Characters escaped when rebuilding a path for the file server.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Fallback handler for every request.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    tracing::debug!(%method, path = %request.uri().path(), "request");

    if method != Method::GET && is_base_path(&state, request.uri()) {
        return AppError::MethodNotAllowed { allow: "GET" }.into_response();
    }

    let outcome = match method {
        Method::OPTIONS => Ok(options()),
        Method::GET => get_object(&state, request).await,
        Method::PUT => put_object(&state, request).await,
        Method::DELETE => delete_object(&state, request).await,
        _ => Err(AppError::MethodNotAllowed {
            allow: ALLOWED_METHODS,
        }),
    };
    outcome.unwrap_or_else(IntoResponse::into_response)
}

fn options() -> Response {
    (StatusCode::OK, [(ALLOW, ALLOWED_METHODS)]).into_response()
}

fn decode_path(uri: &Uri) -> Result<Cow<'_, str>, AppError> {
    percent_decode_str(uri.path())
        .decode_utf8()
        .map_err(|_| AppError::BadRequest("Path is not valid UTF-8".into()))
}

fn resolve(state: &AppState, uri: &Uri) -> Result<TargetPath, AppError> {
    let path = decode_path(uri)?;
    Ok(state.store.resolve(&path)?)
}

fn is_base_path(state: &AppState, uri: &Uri) -> bool {
    resolve(state, uri).is_ok_and(|target| target.is_root())
}

// ── GET ─────────────────────────────────────────────────────────────────────

async fn get_object(state: &AppState, request: Request) -> Result<Response, AppError> {
    let target = match resolve(state, request.uri()) {
        Ok(target) => target,
        Err(err) => {
            tracing::debug!(error = %err, "refusing to serve path");
            return Err(AppError::NotFound("Not found".into()));
        }
    };

    let (mut parts, body) = request.into_parts();
    parts.uri = served_uri(&target)?;
    let request = Request::from_parts(parts, body);

    let serve = ServeDir::new(state.store.root()).append_index_html_on_directories(false);
    let response = match serve.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    Ok(response.map(Body::new))
}

/// URI naming `target` relative to the storage root.
fn served_uri(target: &TargetPath) -> Result<Uri, AppError> {
    let mut path = String::from("/");
    let encoded: Vec<String> = target
        .segments()
        .iter()
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect();
    path.push_str(&encoded.join("/"));
    path.parse()
        .map_err(|e| AppError::BadRequest(format!("Invalid path: {e}")))
}

// ── PUT ─────────────────────────────────────────────────────────────────────

async fn put_object(state: &AppState, request: Request) -> Result<Response, AppError> {
    let target = resolve(state, request.uri())?;
    let digest = digest_header(request.headers())?;

    if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        store_multipart(state, target, digest, multipart).await?;
    } else {
        let stream = request.into_body().into_data_stream();
        store_stream(state, target, digest, stream).await?;
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn digest_header(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    headers
        .get("digest")
        .map(|value| {
            value
                .to_str()
                .map(str::to_owned)
                .map_err(|_| AppError::BadRequest("Digest header is not valid ASCII".into()))
        })
        .transpose()
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().starts_with("multipart/form-data"))
}

/// Store the first `file` field of a multipart body.
async fn store_multipart(
    state: &AppState,
    target: TargetPath,
    digest: Option<String>,
    mut multipart: Multipart,
) -> Result<(), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() == Some(FILE_FIELD) {
            return store_stream(state, target, digest, field).await;
        }
    }
    Err(AppError::BadRequest(format!(
        "Multipart body has no \"{FILE_FIELD}\" field"
    )))
}

/// Run the store write on the blocking pool, fed from `stream`.
async fn store_stream<S, E>(
    state: &AppState,
    target: TargetPath,
    digest: Option<String>,
    stream: S,
) -> Result<(), AppError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<BoxError>,
{
    let (sender, reader) = body::channel();
    let store = state.store.clone();
    let job = tokio::task::spawn_blocking(move || store.put(&target, digest.as_deref(), reader));
    sender.forward(stream).await;

    let written = job
        .await
        .map_err(|e| AppError::internal("File could not be saved", e))??;
    tracing::debug!(bytes = written, "upload stored");
    Ok(())
}

// ── DELETE ──────────────────────────────────────────────────────────────────

async fn delete_object(state: &AppState, request: Request) -> Result<Response, AppError> {
    let target = resolve(state, request.uri())?;
    let store = state.store.clone();
    tokio::task::spawn_blocking(move || store.delete(&target))
        .await
        .map_err(|e| AppError::internal("File could not be deleted", e))?
        .map_err(|err| match err {
            StoreError::NotFound(_) => AppError::NotFound("File not found".into()),
            other => other.into(),
        })?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn served_uri_escapes_segments() {
        let target = TargetPath::resolve(Path::new("/srv"), "/", "/a dir/50%.txt").unwrap();
        assert_eq!(served_uri(&target).unwrap().path(), "/a%20dir/50%25.txt");
    }

    #[test]
    fn served_uri_strips_base_path() {
        let target = TargetPath::resolve(Path::new("/srv"), "/files/", "/files/x/y").unwrap();
        assert_eq!(served_uri(&target).unwrap().path(), "/x/y");
    }

    #[test]
    fn multipart_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));
        headers.insert(
            CONTENT_TYPE,
            "multipart/form-data; boundary=xyz".parse().unwrap(),
        );
        assert!(is_multipart(&headers));
        headers.insert(CONTENT_TYPE, "application/octet-stream".parse().unwrap());
        assert!(!is_multipart(&headers));
    }

    #[test]
    fn digest_header_is_optional() {
        let mut headers = HeaderMap::new();
        assert_eq!(digest_header(&headers).unwrap(), None);
        headers.insert("digest", "md5=abc=".parse().unwrap());
        assert_eq!(digest_header(&headers).unwrap().as_deref(), Some("md5=abc="));
    }
}
