//! Crate-local error taxonomy (§7 of the design spec).
//!
//! Every fallible internal operation returns a `ProxyError` so the
//! worker's dispatch can match exhaustively on exactly the cases that
//! map to a status code. Nothing in this crate panics on bad input
//! from a client or a flaky upstream.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("malformed request")]
    MalformedRequest,

    #[error("unsupported method or missing host/path")]
    Unsupported,

    #[error("upstream connect failed: {0}")]
    UpstreamConnect(#[source] std::io::Error),

    #[error("upstream connect timed out")]
    UpstreamTimeout,

    #[error("upstream send failed: {0}")]
    UpstreamSend(#[source] std::io::Error),

    #[error("upstream recv failed: {0}")]
    UpstreamRecv(#[source] std::io::Error),

    #[error("connection limit reached")]
    GateFull,
}

impl ProxyError {
    /// The HTTP status this error maps to at the worker boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::MalformedRequest => 400,
            ProxyError::Unsupported => 501,
            ProxyError::UpstreamConnect(_)
            | ProxyError::UpstreamTimeout
            | ProxyError::UpstreamSend(_)
            | ProxyError::UpstreamRecv(_) => 500,
            ProxyError::GateFull => 503,
        }
    }
}
