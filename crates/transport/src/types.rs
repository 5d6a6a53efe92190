//! Request/response types shared by all transports.

use serde::de::DeserializeOwned;

use crate::TransportError;

/// HTTP method. The upload protocol only ever issues GET and POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

impl Request {
    /// Starts a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
            content_type: None,
        }
    }

    /// Starts a POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
            content_type: None,
        }
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the raw body and content type.
    pub fn body(mut self, body: Vec<u8>, content_type: &str) -> Self {
        self.body = body;
        self.content_type = Some(content_type.to_string());
        self
    }
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Callback-style status the remote uses for "accepted but the downstream
/// notification failed"; retrying would re-run side effects.
const STATUS_CALLBACK_FAILED: u16 = 579;

impl Response {
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the server outcome is transient enough to retry the same
    /// request: 5xx, except the callback-failure status.
    pub fn needs_retry(&self) -> bool {
        self.status >= 500 && self.status != STATUS_CALLBACK_FAILED
    }

    /// Whether the retry should move to a different host: gateway-class
    /// failures where the specific host, not the request, is the problem.
    pub fn needs_switch_server(&self) -> bool {
        matches!(self.status, 502 | 503 | 504 | 571 | 599)
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| TransportError::Malformed(format!("status {}: {e}", self.status)))
    }

    /// Body as UTF-8 for error reporting, lossy on purpose.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(status: u16) -> Response {
        Response {
            status,
            body: Vec::new(),
        }
    }

    #[test]
    fn ok_range() {
        assert!(resp(200).is_ok());
        assert!(resp(204).is_ok());
        assert!(resp(299).is_ok());
        assert!(!resp(300).is_ok());
        assert!(!resp(404).is_ok());
    }

    #[test]
    fn five_xx_needs_retry_except_callback_status() {
        assert!(resp(500).needs_retry());
        assert!(resp(503).needs_retry());
        assert!(resp(599).needs_retry());
        assert!(!resp(579).needs_retry());
        assert!(!resp(404).needs_retry());
        assert!(!resp(200).needs_retry());
    }

    #[test]
    fn gateway_failures_need_switch() {
        for status in [502, 503, 504, 571, 599] {
            assert!(resp(status).needs_switch_server(), "status {status}");
        }
        assert!(!resp(500).needs_switch_server());
        assert!(!resp(401).needs_switch_server());
    }

    #[test]
    fn json_decodes_body() {
        let response = Response {
            status: 200,
            body: br#"{"ctx":"abc"}"#.to_vec(),
        };
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["ctx"], "abc");
    }

    #[test]
    fn json_malformed_is_typed() {
        let response = Response {
            status: 200,
            body: b"not json".to_vec(),
        };
        let err = response.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
        assert!(err.needs_retry());
    }

    #[test]
    fn request_builder_accumulates() {
        let req = Request::post("https://up.example.com/mkblk/4")
            .header("Authorization", "UpToken t")
            .body(vec![1, 2, 3, 4], "application/octet-stream");
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.body.len(), 4);
        assert_eq!(req.content_type.as_deref(), Some("application/octet-stream"));
    }
}
