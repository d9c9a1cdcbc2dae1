//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! Requests and responses are plain data. `StripeClient` builds `HttpRequest`
//! values and classifies `HttpResponse` values; the `Transport` trait is the
//! single seam where bytes actually move. Hosts either hand requests to their
//! own HTTP stack or plug in [`UreqTransport`](crate::transport::UreqTransport).

use std::fmt;
use std::str::FromStr;

/// Semantic verb of a call. Drives URL shape, body encoding and headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Read. Parameters travel in the query string.
    Get,
    /// Create. Parameters travel in a form body.
    Post,
    /// Update. Parameters travel in a form body.
    Put,
    /// Delete. Parameters travel in the query string.
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Post => "post",
            Action::Put => "put",
            Action::Delete => "delete",
        }
    }

    /// True for actions that carry a form-encoded body.
    pub fn is_write(self) -> bool {
        matches!(self, Action::Post | Action::Put)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names none of the four actions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action `{0}`, expected one of get, post, put, delete")]
pub struct ParseActionError(pub String);

impl FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Action::Get),
            "post" => Ok(Action::Post),
            "put" => Ok(Action::Put),
            "delete" => Ok(Action::Delete),
            _ => Err(ParseActionError(s.to_string())),
        }
    }
}

/// An HTTP request described as plain data.
///
/// `body` is empty for read and delete actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub action: Action,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    /// First header value matching `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// The request never produced a response (DNS, TLS, timeout, reset, ...).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct TransportError {
    pub reason: String,
}

impl TransportError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Executes one request. Implementations must return 4xx/5xx responses as
/// `Ok`, leaving status interpretation to the client.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}
