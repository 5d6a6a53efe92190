//! HTTP transport seam.
//!
//! Everything above this crate speaks in terms of [`Request`], [`Response`],
//! and [`TransportError`]; the retry layer consumes the classification
//! contract (`needs_retry` / `needs_switch_server` / `is_unrecoverable`)
//! without knowing which HTTP stack produced the outcome.

mod http;
mod types;

pub use http::{HttpTransport, TransportConfig};
pub use types::{Method, Request, Response};

use std::future::Future;

/// One network attempt: send a request, get a response or a typed error.
///
/// Implementations must be cheap to share (`&self`); the upload engine holds
/// one transport behind an `Arc` for the whole session.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: Request,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send;
}

/// Transport-level failures (no usable HTTP response).
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    /// The request could not even be built locally. Never a network fault,
    /// so never retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Locally-built failures can never succeed on retry.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, TransportError::InvalidRequest(_))
    }

    /// Whether the same request may be attempted again.
    pub fn needs_retry(&self) -> bool {
        !self.is_unrecoverable()
    }

    /// Whether the next attempt should go to a different host.
    pub fn needs_switch_server(&self) -> bool {
        !self.is_unrecoverable()
    }
}
