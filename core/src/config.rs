//! Client configuration and credential/endpoint resolution.
//!
//! # Design
//! `Config` is an immutable value handed to `StripeClient`. Environment
//! variables override it and are re-read on every call, so a running
//! process can be repointed (tests do this) without rebuilding the client.
//! The environment itself is reached through a lookup function, so callers
//! and tests can substitute their own.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::StripeError;

/// Overrides `Config::secret_key`.
pub const SECRET_KEY_ENV: &str = "STRIPE_SECRET_KEY";

/// Overrides `Config::api_endpoint`.
pub const API_ENDPOINT_ENV: &str = "STRIPE_API_ENDPOINT";

pub const DEFAULT_API_ENDPOINT: &str = "https://api.stripe.com/v1/";

/// Returned as an `Authentication` error when no secret key is available.
pub const MISSING_SECRET_KEY_MESSAGE: &str = "No API key provided. Set your secret key \
     with the STRIPE_SECRET_KEY environment variable or the `secret_key` configuration \
     setting. Your API keys are listed in the Stripe dashboard.";

/// Source of environment variables.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads the real process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Process-wide client settings.
///
/// Deserializes from any serde format with every field optional, so it can
/// sit inside a host application's own config file.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub secret_key: Option<String>,
    pub api_endpoint: Option<String>,
    /// Echo each request and raw response body to stderr.
    pub log_requests: bool,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret_key(mut self, secret_key: impl Into<String>) -> Self {
        self.secret_key = Some(secret_key.into());
        self
    }

    pub fn with_api_endpoint(mut self, api_endpoint: impl Into<String>) -> Self {
        self.api_endpoint = Some(api_endpoint.into());
        self
    }

    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    /// Secret key from `STRIPE_SECRET_KEY`, else from this config.
    pub fn resolve_secret_key(&self) -> Result<String, StripeError> {
        self.resolve_secret_key_with(process_env)
    }

    /// Like [`resolve_secret_key`](Self::resolve_secret_key) with an explicit
    /// environment. Empty values count as unset.
    pub fn resolve_secret_key_with<F>(&self, lookup: F) -> Result<String, StripeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty(lookup(SECRET_KEY_ENV))
            .or_else(|| non_empty(self.secret_key.clone()))
            .ok_or_else(|| StripeError::Authentication {
                message: MISSING_SECRET_KEY_MESSAGE.to_string(),
            })
    }

    /// Base URL from `STRIPE_API_ENDPOINT`, else this config, else
    /// [`DEFAULT_API_ENDPOINT`].
    pub fn resolve_endpoint(&self) -> String {
        self.resolve_endpoint_with(process_env)
    }

    pub fn resolve_endpoint_with<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        non_empty(lookup(API_ENDPOINT_ENV))
            .or_else(|| non_empty(self.api_endpoint.clone()))
            .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("api_endpoint", &self.api_endpoint)
            .field("log_requests", &self.log_requests)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
