use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::http::Method;

/// Per-request failures. Every variant resolves to an HTTP response at the
/// dispatch entrypoint and never unwinds further.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed(Vec<Method>),
    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("Request line or header exceeds {0} bytes")]
    HeaderTooLarge(usize),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Panic: {0}")]
    PanicError(String),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) => 400,
            ServerError::Unauthorized(_) => 401,
            ServerError::Forbidden(_) => 403,
            ServerError::NotFound => 404,
            ServerError::MethodNotAllowed(_) => 405,
            ServerError::PayloadTooLarge(_) => 413,
            ServerError::HeaderTooLarge(_) => 431,
            ServerError::IoError(_)
            | ServerError::InternalError(_)
            | ServerError::PanicError(_) => 500,
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Rejected route registrations. These are startup failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("pattern {pattern:?} must start with '/'")]
    MissingLeadingSlash { pattern: String },
    #[error("pattern {pattern:?} contains an empty segment")]
    EmptySegment { pattern: String },
    #[error("pattern {pattern:?} has a parameter without a valid name")]
    InvalidParamName { pattern: String },
    #[error("pattern {pattern:?} declares parameter {name:?} more than once")]
    DuplicateParam { pattern: String, name: String },
    #[error("pattern {pattern:?} has unbalanced parentheses")]
    UnbalancedParens { pattern: String },
    #[error("pattern {pattern:?} has an invalid constraint for {name:?}: {reason}")]
    InvalidConstraint {
        pattern: String,
        name: String,
        reason: String,
    },
    #[error("pattern {pattern:?} has a wildcard that is not the final segment")]
    WildcardNotLast { pattern: String },
    #[error("route {method} {pattern} is already registered")]
    Duplicate { method: Method, pattern: String },
    #[error("router mounted at {prefix:?} has its own not-found responder; set it on the root router")]
    MountedNotFound { prefix: String },
}

/// Listener lifecycle failures surfaced to the orchestrating caller.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no certificate provided for HTTPS")]
    MissingCertificate,
    #[error("no key file provided for HTTPS")]
    MissingKey,
    #[error("failed to load TLS material from {path}: {reason}")]
    Tls { path: PathBuf, reason: String },
    #[error("invalid TLS configuration: {0}")]
    TlsConfig(#[from] rustls::Error),
    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("accept failed on {addr}: {source}")]
    Accept { addr: SocketAddr, source: io::Error },
    #[error("{0} listener is already running")]
    AlreadyRunning(&'static str),
    #[error("graceful shutdown exceeded {timeout:?}; {abandoned} connection(s) abandoned")]
    ShutdownTimeout { timeout: Duration, abandoned: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
