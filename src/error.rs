//! Error classification — mirrors the error kinds a connection can fail
//! with, used to pick the right log level and client-visible response.

use std::fmt;

/// Per-connection or startup error kind. See spec §7 for the propagation
/// policy each variant implies: connection-local errors never cross a
/// connection boundary; only `ConfigInvalid` and `BindFailed` can
/// terminate the process.
#[derive(Debug)]
pub enum ProxyError {
    /// Startup configuration is invalid (e.g. port out of range).
    ConfigInvalid(String),
    /// The listener could not be bound.
    BindFailed(std::io::Error),
    /// The first request line/headers could not be parsed.
    BadRequest(String),
    /// Proxy-Authorization was missing, malformed, or did not match.
    Unauthorized,
    /// DNS resolution or `connect()` to the origin failed.
    OriginUnreachable(std::io::Error),
    /// A read/write failed mid-forward or mid-tunnel.
    Io(std::io::Error),
    /// The credential store could not be read or written.
    Db(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigInvalid(msg) => write!(f, "invalid configuration: {msg}"),
            Self::BindFailed(e) => write!(f, "failed to bind listener: {e}"),
            Self::BadRequest(msg) => write!(f, "bad request: {msg}"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::OriginUnreachable(e) => write!(f, "origin unreachable: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Db(msg) => write!(f, "credential store error: {msg}"),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<std::io::Error> for ProxyError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
