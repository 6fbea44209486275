use std::time::Duration;

use bytes::Bytes;
use loadr_metrics::ErrorKind;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: http::Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    pub fn post(url: impl Into<String>, body: Bytes) -> Self {
        Self {
            method: http::Method::POST,
            body,
            ..Self::get(url)
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: ErrorKind,
    pub message: String,
}

/// What an iteration sees after a send. Transport failures are folded in (with `status == 0`)
/// rather than returned as errors, so a refused connection never aborts the iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// `0` when the exchange failed before a status line was received.
    pub status: u16,
    pub body: Bytes,
    /// Lowercased header names. Multiple values are joined with ", ".
    pub headers: Vec<(String, String)>,
    pub duration: Duration,
    /// Estimated bytes on the wire (HTTP/1.1 framing + body).
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub error: Option<TransportError>,
}

impl HttpResponse {
    pub(crate) fn failed(
        duration: Duration,
        bytes_sent: u64,
        kind: ErrorKind,
        message: String,
    ) -> Self {
        Self {
            status: 0,
            body: Bytes::new(),
            headers: Vec::new(),
            duration,
            bytes_sent,
            bytes_received: 0,
            error: Some(TransportError { kind, message }),
        }
    }

    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
