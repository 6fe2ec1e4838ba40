//! # Server Configuration
//!
//! Command-line flags with environment fallbacks, validated once at startup
//! into an immutable [`AppConfig`].

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use axum::http::HeaderName;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use depot_core::StoreConfig;

use crate::auth::{AuthConfig, MethodTokens};
use crate::telemetry::LogFormat;

/// Errors from validating [`ServerArgs`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid listen address {value:?}: {source}")]
    InvalidListen {
        value: String,
        source: std::io::Error,
    },

    #[error("root directory must not be empty")]
    EmptyRootDir,

    #[error("cannot resolve root directory {}: {source}", .path.display())]
    RootDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("URL base path {0:?} must start with '/'")]
    InvalidBasePath(String),

    #[error("invalid auth header name {value:?}: {source}")]
    InvalidAuthHeader {
        value: String,
        source: axum::http::header::InvalidHeaderName,
    },
}

/// Serve a directory over HTTP with verified, atomic uploads.
#[derive(Parser)]
#[command(name = "depot", version, about)]
pub struct ServerArgs {
    /// Directory objects are stored under. Created if missing.
    #[arg(long, env = "ROOT_DIR", default_value = "/uploads")]
    pub root_dir: PathBuf,

    /// URL path prefix under which objects are served.
    #[arg(long, env = "URL_BASE_PATH", default_value = "/")]
    pub url_base_path: String,

    /// Address to listen on. A bare `:port` binds every interface.
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:80")]
    pub listen: String,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, env = "DEBUG", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub debug: bool,

    /// Log output: pretty, json or logfmt.
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,

    /// Header carrying the token.
    #[arg(long, env = "AUTH_HEADER", default_value = "Authorization")]
    pub auth_header: String,

    /// Prefix of the auth header value preceding the token.
    #[arg(long, env = "AUTH_HEADER_PREFIX", default_value = "Bearer ", allow_hyphen_values = true)]
    pub auth_header_prefix: String,

    /// Reject uploads that declare no supported digest.
    #[arg(long, env = "FORCE_DIGEST", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub force_digest: bool,

    /// Token required for GET.
    #[arg(long, env = "TOKEN_GET", hide_env_values = true)]
    pub token_get: Option<String>,

    /// Token required for PUT.
    #[arg(long, env = "TOKEN_PUT", hide_env_values = true)]
    pub token_put: Option<String>,

    /// Token required for DELETE.
    #[arg(long, env = "TOKEN_DELETE", hide_env_values = true)]
    pub token_delete: Option<String>,
}

/// Validated server configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen: SocketAddr,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub log_format: LogFormat,
    pub debug: bool,
}

impl AppConfig {
    pub fn from_args(args: ServerArgs) -> Result<Self, ConfigError> {
        let listen = parse_listen(&args.listen)?;

        if args.root_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRootDir);
        }
        let root = depot_core::dirs::absolutize(&args.root_dir).map_err(|source| {
            ConfigError::RootDir {
                path: args.root_dir.clone(),
                source,
            }
        })?;

        if !args.url_base_path.starts_with('/') {
            return Err(ConfigError::InvalidBasePath(args.url_base_path));
        }

        let header = HeaderName::try_from(args.auth_header.as_str()).map_err(|source| {
            ConfigError::InvalidAuthHeader {
                value: args.auth_header.clone(),
                source,
            }
        })?;

        let non_empty = |token: Option<String>| token.filter(|t| !t.is_empty());
        Ok(Self {
            listen,
            store: StoreConfig {
                root,
                base_path: args.url_base_path,
                require_digest: args.force_digest,
            },
            auth: AuthConfig {
                tokens: MethodTokens {
                    get: non_empty(args.token_get),
                    put: non_empty(args.token_put),
                    delete: non_empty(args.token_delete),
                },
                header,
                prefix: args.auth_header_prefix,
            },
            log_format: args.log_format,
            debug: args.debug,
        })
    }
}

/// Resolve `host:port`, accepting `:port` as shorthand for `0.0.0.0:port`.
/// Host names are resolved once, and the first address is used.
fn parse_listen(value: &str) -> Result<SocketAddr, ConfigError> {
    let invalid = |source| ConfigError::InvalidListen {
        value: value.to_string(),
        source,
    };
    let normalized = match value.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => value.to_string(),
    };
    normalized
        .to_socket_addrs()
        .map_err(invalid)?
        .next()
        .ok_or_else(|| {
            invalid(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "host name resolved to no addresses",
            ))
        })
}
