//! Synchronous client core for the Stripe HTTP API.
//!
//! # Overview
//! Turns an action, a relative endpoint, ordered parameters and per-request
//! options into an authenticated `HttpRequest`, hands it to a `Transport`,
//! and classifies the response into the decoded JSON body or a typed
//! `StripeError`.
//!
//! # Design
//! - `StripeClient` holds an immutable `Config` plus a transport; the secret
//!   key and base URL are re-resolved (environment first) on every call.
//! - Building (`build_request`) and classifying (`parse_response`) are usable
//!   on their own, so hosts that own their HTTP stack can skip `send`.
//! - Parameters are `serde_json` values flattened into bracketed form keys by
//!   `encode`.
//! - `UreqTransport` (feature `ureq`, default) is the bundled blocking
//!   transport.

pub mod client;
pub mod config;
pub mod encode;
pub mod error;
pub mod http;
#[cfg(feature = "ureq")]
pub mod transport;
pub mod types;

pub use client::{classify, StripeClient, USER_AGENT};
pub use config::{
    Config, API_ENDPOINT_ENV, DEFAULT_API_ENDPOINT, MISSING_SECRET_KEY_MESSAGE, SECRET_KEY_ENV,
};
pub use encode::{decode_pairs, encode_params, flatten_params, Params};
pub use error::StripeError;
pub use http::{Action, HttpRequest, HttpResponse, ParseActionError, Transport, TransportError};
#[cfg(feature = "ureq")]
pub use transport::UreqTransport;
pub use types::RequestOptions;
