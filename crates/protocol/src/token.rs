//! Opaque upload credential.

use std::fmt;

/// An upload token authorizing all calls within one upload session.
///
/// The token is issued by the credential layer and carries bucket/key-policy
/// metadata that only the server interprets; this crate treats it as an
/// immutable string.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadToken(String);

impl UploadToken {
    /// Wraps a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the value for the `Authorization` header of upload calls.
    pub fn authorization(&self) -> String {
        format!("UpToken {}", self.0)
    }
}

// Token contents stay out of logs.
impl fmt::Debug for UploadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UploadToken(..)")
    }
}
