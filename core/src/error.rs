//! Error types for the Stripe client.
//!
//! # Design
//! Each variant matches one class of Stripe failure and carries only the
//! fields that class defines. Every variant is built in one of two places:
//! the client's status-code classification, or secret-key resolution (which
//! fails before any request is sent). `MalformedResponse` covers bodies that
//! break the API's documented JSON shape. They are reported rather than
//! patched with defaults.

/// Errors returned by `StripeClient`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StripeError {
    /// No secret key is configured, or the API rejected it (401).
    #[error("authentication error: {message}")]
    Authentication { message: String },

    /// The payment instrument was declined or failed validation (402).
    #[error("card error: {message}")]
    Card {
        message: String,
        code: Option<String>,
        param: Option<String>,
    },

    /// Too many requests in too short a time (429).
    #[error("rate limit error: {message}")]
    RateLimit { message: String },

    /// Any other 4xx. `param` names the offending parameter when Stripe
    /// reports one.
    #[error("invalid request error: {message}")]
    InvalidRequest {
        message: String,
        param: Option<String>,
    },

    /// The request never produced a response.
    #[error("{message}")]
    ApiConnection { message: String },

    /// 5xx or any status not covered above.
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body is not JSON, or an error body lacks
    /// `error.message`.
    #[error("malformed response ({status}): {message}")]
    MalformedResponse { status: u16, message: String },
}

impl StripeError {
    /// The human-readable message carried by every variant.
    pub fn message(&self) -> &str {
        match self {
            StripeError::Authentication { message }
            | StripeError::Card { message, .. }
            | StripeError::RateLimit { message }
            | StripeError::InvalidRequest { message, .. }
            | StripeError::ApiConnection { message }
            | StripeError::Api { message, .. }
            | StripeError::MalformedResponse { message, .. } => message,
        }
    }
}
