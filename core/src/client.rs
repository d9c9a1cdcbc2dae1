//! Request assembly, dispatch and response classification for the Stripe API.
//!
//! # Design
//! `StripeClient` splits building from parsing: `build_request` produces an
//! `HttpRequest`, `parse_response` consumes the transport's result. `send`
//! runs both around a single `Transport::execute` call, which is the only
//! place a call can block. Credentials and the base URL are re-resolved on
//! every call, and nothing is mutated between calls.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::{process_env, Config, EnvLookup};
use crate::encode::{encode_params, Params};
use crate::error::StripeError;
use crate::http::{Action, HttpRequest, HttpResponse, Transport, TransportError};
use crate::types::RequestOptions;

pub const USER_AGENT: &str = concat!("stripe-core/", env!("CARGO_PKG_VERSION"));

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Synchronous Stripe client over a pluggable transport.
#[derive(Clone)]
pub struct StripeClient<T> {
    config: Config,
    transport: T,
    env: EnvLookup,
}

impl<T> StripeClient<T> {
    pub fn new(config: Config, transport: T) -> Self {
        Self {
            config,
            transport,
            env: Arc::new(process_env),
        }
    }

    /// Replace the process environment as the source of
    /// `STRIPE_SECRET_KEY` / `STRIPE_API_ENDPOINT` overrides.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Base endpoint joined with `endpoint`. Read and delete actions with
    /// parameters get them appended as a query string.
    pub fn build_url(&self, endpoint: &str, data: &Params, action: Action) -> String {
        let base = self.config.resolve_endpoint_with(self.env.as_ref());
        let url = join_url(&base, endpoint);
        if action.is_write() || data.is_empty() {
            return url;
        }
        let query = encode_params(data);
        if query.is_empty() {
            return url;
        }
        format!("{url}?{query}")
    }

    /// Form-encoded `data` for create/update, empty otherwise.
    pub fn build_body(&self, data: &Params, action: Action) -> String {
        if action.is_write() {
            encode_params(data)
        } else {
            String::new()
        }
    }

    /// Fails with `StripeError::Authentication` when no secret key resolves.
    pub fn build_headers(
        &self,
        options: &RequestOptions,
        action: Action,
    ) -> Result<Vec<(String, String)>, StripeError> {
        let secret_key = self.config.resolve_secret_key_with(self.env.as_ref())?;

        let mut headers = vec![
            ("Authorization".to_string(), format!("Bearer {secret_key}")),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ];
        if action.is_write() {
            headers.push(("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()));
        }

        let optional = [
            ("Stripe-Account", &options.account),
            ("Stripe-Version", &options.api_version),
            ("Idempotency-Key", &options.idempotency_key),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                headers.push((name.to_string(), value.clone()));
            }
        }
        Ok(headers)
    }

    /// Assemble the full request. Headers go first, so a missing secret key
    /// is reported before any other work.
    pub fn build_request(
        &self,
        action: Action,
        endpoint: &str,
        data: &Params,
        options: &RequestOptions,
    ) -> Result<HttpRequest, StripeError> {
        let headers = self.build_headers(options, action)?;
        Ok(HttpRequest {
            action,
            url: self.build_url(endpoint, data, action),
            headers,
            body: self.build_body(data, action),
        })
    }

    /// Classify a transport result, echoing the raw body to stderr when
    /// request logging is on.
    pub fn parse_response(
        &self,
        result: Result<HttpResponse, TransportError>,
    ) -> Result<Value, StripeError> {
        if self.config.log_requests {
            if let Ok(response) = &result {
                let _ = write_response_log(&mut io::stderr().lock(), response);
            }
        }
        classify(result)
    }
}

impl<T: Transport> StripeClient<T> {
    /// Resolve, assemble, execute and classify one API call.
    ///
    /// ```
    /// use stripe_core::{
    ///     Action, Config, HttpRequest, HttpResponse, Params, RequestOptions, StripeClient,
    ///     Transport, TransportError,
    /// };
    ///
    /// struct Canned;
    ///
    /// impl Transport for Canned {
    ///     fn execute(&self, _: &HttpRequest) -> Result<HttpResponse, TransportError> {
    ///         Ok(HttpResponse {
    ///             status: 200,
    ///             headers: Vec::new(),
    ///             body: r#"{"id":"cus_1"}"#.to_string(),
    ///         })
    ///     }
    /// }
    ///
    /// let config = Config::new().with_secret_key("sk_test_123");
    /// let client = StripeClient::new(config, Canned);
    /// let mut data = Params::new();
    /// data.insert("email".into(), "jo@example.com".into());
    /// let customer = client.send(Action::Post, "customers", &data, &RequestOptions::new())?;
    /// assert_eq!(customer["id"], "cus_1");
    /// # Ok::<(), stripe_core::StripeError>(())
    /// ```
    pub fn send(
        &self,
        action: Action,
        endpoint: &str,
        data: &Params,
        options: &RequestOptions,
    ) -> Result<Value, StripeError> {
        let request = self.build_request(action, endpoint, data, options)?;

        if self.config.log_requests {
            let _ = write_request_log(&mut io::stderr().lock(), &request);
        }
        debug!(action = %request.action, url = %request.url, "sending stripe request");

        let result = self.transport.execute(&request);
        self.parse_response(result)
    }
}

impl<T: fmt::Debug> fmt::Debug for StripeClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeClient")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

/// `"{action} {url}\n{body}\n\n"`, written before a request is sent.
fn write_request_log<W: Write>(w: &mut W, request: &HttpRequest) -> io::Result<()> {
    write!(w, "{} {}\n{}\n\n", request.action, request.url, request.body)
}

/// `"response: {body}\n"`, written once the raw body arrives.
fn write_response_log<W: Write>(w: &mut W, response: &HttpResponse) -> io::Result<()> {
    writeln!(w, "response: {}", response.body)
}

/// Map a transport result to the decoded body or a typed error.
pub fn classify(result: Result<HttpResponse, TransportError>) -> Result<Value, StripeError> {
    let response = result.map_err(|e| {
        debug!(reason = %e.reason, "stripe request failed in transport");
        StripeError::ApiConnection {
            message: format!("Network Error: {}", e.reason),
        }
    })?;
    let status = response.status;

    let decoded: Value =
        serde_json::from_str(&response.body).map_err(|e| StripeError::MalformedResponse {
            status,
            message: format!("response body is not valid JSON: {e}"),
        })?;

    if (200..300).contains(&status) {
        return Ok(decoded);
    }
    let err = classify_error(status, &decoded);
    debug!(status, error = %err, "stripe returned an error");
    Err(err)
}

fn classify_error(status: u16, body: &Value) -> StripeError {
    let error = body.get("error");
    let field = |name: &str| {
        error
            .and_then(|e| e.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let Some(message) = field("message") else {
        return StripeError::MalformedResponse {
            status,
            message: "error response has no `error.message`".to_string(),
        };
    };

    match status {
        401 => StripeError::Authentication { message },
        402 => StripeError::Card {
            message,
            code: field("code"),
            param: field("param"),
        },
        429 => StripeError::RateLimit { message },
        400..=499 => StripeError::InvalidRequest {
            message,
            param: field("param"),
        },
        _ => StripeError::Api { status, message },
    }
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::config::MISSING_SECRET_KEY_MESSAGE;

    const BASE_URL: &str = "http://localhost:12111/v1/";

    /// Records requests and replays one canned result.
    struct StubTransport {
        result: Result<HttpResponse, TransportError>,
        seen: RefCell<Vec<HttpRequest>>,
    }

    impl StubTransport {
        fn responding(status: u16, body: &str) -> Self {
            Self {
                result: Ok(response(status, body)),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                result: Err(TransportError::new(reason)),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for StubTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.borrow_mut().push(request.clone());
            self.result.clone()
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn config() -> Config {
        Config::new()
            .with_secret_key("sk_test_123")
            .with_api_endpoint(BASE_URL)
    }

    fn client_with(config: Config, transport: StubTransport) -> StripeClient<StubTransport> {
        StripeClient::new(config, transport).with_env_lookup(|_| None)
    }

    fn client() -> StripeClient<StubTransport> {
        client_with(config(), StubTransport::responding(200, "{}"))
    }

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    // --- build_url ---

    #[test]
    fn write_actions_never_get_a_query_string() {
        let data = params(json!({"email": "jo@example.com"}));
        for action in [Action::Post, Action::Put] {
            assert_eq!(
                client().build_url("customers", &data, action),
                "http://localhost:12111/v1/customers"
            );
        }
    }

    #[test]
    fn read_and_delete_append_encoded_query() {
        let data = params(json!({"limit": 3, "expand": ["data.customer"]}));
        for action in [Action::Get, Action::Delete] {
            assert_eq!(
                client().build_url("charges", &data, action),
                "http://localhost:12111/v1/charges?limit=3&expand%5B0%5D=data.customer"
            );
        }
    }

    #[test]
    fn empty_data_never_appends_query() {
        for action in [Action::Get, Action::Post, Action::Put, Action::Delete] {
            assert_eq!(
                client().build_url("customers/cus_1", &Params::new(), action),
                "http://localhost:12111/v1/customers/cus_1"
            );
        }
    }

    #[test]
    fn data_that_flattens_to_nothing_adds_no_question_mark() {
        let data = params(json!({"metadata": {}}));
        assert_eq!(
            client().build_url("customers", &data, Action::Get),
            "http://localhost:12111/v1/customers"
        );
    }

    #[test]
    fn url_join_collapses_slashes() {
        let c = client_with(
            Config::new().with_secret_key("sk").with_api_endpoint("http://h/v1"),
            StubTransport::responding(200, "{}"),
        );
        assert_eq!(c.build_url("/customers", &Params::new(), Action::Get), "http://h/v1/customers");
    }

    #[test]
    fn url_defaults_to_public_api() {
        let c = client_with(Config::new().with_secret_key("sk"), StubTransport::responding(200, "{}"));
        assert_eq!(
            c.build_url("customers", &Params::new(), Action::Get),
            "https://api.stripe.com/v1/customers"
        );
    }

    #[test]
    fn env_lookup_overrides_configured_endpoint() {
        let c = StripeClient::new(config(), StubTransport::responding(200, "{}")).with_env_lookup(
            |key: &str| (key == "STRIPE_API_ENDPOINT").then(|| "http://override:1/v1/".to_string()),
        );
        assert_eq!(
            c.build_url("customers", &Params::new(), Action::Get),
            "http://override:1/v1/customers"
        );
    }

    // --- build_body ---

    #[test]
    fn write_actions_form_encode_body() {
        let data = params(json!({"email": "jo@example.com", "metadata": {"plan": "gold"}}));
        for action in [Action::Post, Action::Put] {
            assert_eq!(
                client().build_body(&data, action),
                "email=jo%40example.com&metadata%5Bplan%5D=gold"
            );
        }
    }

    #[test]
    fn read_and_delete_have_empty_body() {
        let data = params(json!({"limit": 3}));
        for action in [Action::Get, Action::Delete] {
            assert_eq!(client().build_body(&data, action), "");
        }
    }

    // --- build_headers ---

    #[test]
    fn read_headers_carry_auth_and_user_agent_only() {
        let headers = client()
            .build_headers(&RequestOptions::new(), Action::Get)
            .unwrap();
        assert_eq!(
            headers,
            vec![
                ("Authorization".to_string(), "Bearer sk_test_123".to_string()),
                ("User-Agent".to_string(), USER_AGENT.to_string()),
            ]
        );
    }

    #[test]
    fn write_headers_add_content_type_and_options_in_order() {
        let options = RequestOptions::new()
            .with_idempotency_key("idem_1")
            .with_account("acct_1")
            .with_api_version("2024-06-20");
        let headers = client().build_headers(&options, Action::Post).unwrap();
        let names: Vec<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Authorization",
                "User-Agent",
                "Content-Type",
                "Stripe-Account",
                "Stripe-Version",
                "Idempotency-Key",
            ]
        );
        assert_eq!(headers[2].1, "application/x-www-form-urlencoded");
        assert_eq!(headers[3].1, "acct_1");
        assert_eq!(headers[4].1, "2024-06-20");
        assert_eq!(headers[5].1, "idem_1");
    }

    #[test]
    fn user_agent_names_crate_and_version() {
        assert_eq!(USER_AGENT, format!("stripe-core/{}", env!("CARGO_PKG_VERSION")));
    }

    // --- build_request / send ---

    #[test]
    fn build_request_assembles_all_parts() {
        let data = params(json!({"amount": 2000, "currency": "usd"}));
        let req = client()
            .build_request(Action::Post, "charges", &data, &RequestOptions::new())
            .unwrap();
        assert_eq!(req.action, Action::Post);
        assert_eq!(req.url, "http://localhost:12111/v1/charges");
        assert_eq!(req.body, "amount=2000&currency=usd");
        assert_eq!(req.header("content-type"), Some("application/x-www-form-urlencoded"));
    }

    #[test]
    fn missing_secret_key_fails_before_transport() {
        let c = client_with(
            Config::new().with_api_endpoint(BASE_URL),
            StubTransport::responding(200, "{}"),
        );
        let err = c
            .send(Action::Get, "customers", &Params::new(), &RequestOptions::new())
            .unwrap_err();
        assert_eq!(
            err,
            StripeError::Authentication {
                message: MISSING_SECRET_KEY_MESSAGE.to_string()
            }
        );
        assert!(c.transport().seen.borrow().is_empty());
    }

    #[test]
    fn send_executes_built_request_and_returns_decoded_body() {
        let c = client_with(config(), StubTransport::responding(200, r#"{"id":"cus_1"}"#));
        let data = params(json!({"limit": 1}));
        let body = c
            .send(Action::Get, "customers", &data, &RequestOptions::new())
            .unwrap();
        assert_eq!(body, json!({"id": "cus_1"}));

        let seen = c.transport().seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "http://localhost:12111/v1/customers?limit=1");
        assert_eq!(seen[0].body, "");
    }

    #[test]
    fn send_with_logging_enabled_still_classifies() {
        let c = client_with(
            config().with_request_logging(true),
            StubTransport::responding(429, r#"{"error":{"message":"slow down"}}"#),
        );
        let err = c
            .send(Action::Get, "customers", &Params::new(), &RequestOptions::new())
            .unwrap_err();
        assert!(matches!(err, StripeError::RateLimit { .. }));
    }

    #[test]
    fn send_maps_transport_failure_to_connection_error() {
        let c = client_with(config(), StubTransport::failing("connection reset"));
        let err = c
            .send(Action::Delete, "customers/cus_1", &Params::new(), &RequestOptions::new())
            .unwrap_err();
        assert_eq!(
            err,
            StripeError::ApiConnection {
                message: "Network Error: connection reset".to_string()
            }
        );
    }

    // --- request log ---

    #[test]
    fn request_log_has_action_url_and_body() {
        let data = params(json!({"a": "b"}));
        let req = client()
            .build_request(Action::Post, "customers", &data, &RequestOptions::new())
            .unwrap();
        let mut out = Vec::new();
        write_request_log(&mut out, &req).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "post http://localhost:12111/v1/customers\na=b\n\n"
        );
    }

    #[test]
    fn request_log_for_read_has_empty_body_line() {
        let data = params(json!({"limit": 1}));
        let req = client()
            .build_request(Action::Get, "customers", &data, &RequestOptions::new())
            .unwrap();
        let mut out = Vec::new();
        write_request_log(&mut out, &req).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "get http://localhost:12111/v1/customers?limit=1\n\n\n"
        );
    }

    #[test]
    fn response_log_prefixes_raw_body() {
        let mut out = Vec::new();
        write_response_log(&mut out, &response(200, r#"{"id":"x"}"#)).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "response: {\"id\":\"x\"}\n");
    }

    // --- classify ---

    #[test]
    fn success_status_decodes_body() {
        let value = classify(Ok(response(200, r#"{"id":"cus_1"}"#))).unwrap();
        assert_eq!(value, json!({"id": "cus_1"}));

        let value = classify(Ok(response(201, r#"{"deleted":true}"#))).unwrap();
        assert_eq!(value["deleted"], true);
    }

    #[test]
    fn transport_timeout_is_connection_error() {
        let err = classify(Err(TransportError::new("timeout"))).unwrap_err();
        assert_eq!(
            err,
            StripeError::ApiConnection {
                message: "Network Error: timeout".to_string()
            }
        );
    }

    #[test]
    fn status_401_is_authentication_error() {
        let err = classify(Ok(response(401, r#"{"error":{"message":"invalid api key"}}"#))).unwrap_err();
        assert_eq!(
            err,
            StripeError::Authentication {
                message: "invalid api key".to_string()
            }
        );
    }

    #[test]
    fn status_402_is_card_error_with_code_and_param() {
        let body = r#"{"error":{"message":"card declined","code":"card_declined","param":"card"}}"#;
        let err = classify(Ok(response(402, body))).unwrap_err();
        assert_eq!(
            err,
            StripeError::Card {
                message: "card declined".to_string(),
                code: Some("card_declined".to_string()),
                param: Some("card".to_string()),
            }
        );
    }

    #[test]
    fn card_error_without_code_or_param_keeps_them_absent() {
        let err = classify(Ok(response(402, r#"{"error":{"message":"declined"}}"#))).unwrap_err();
        assert_eq!(
            err,
            StripeError::Card {
                message: "declined".to_string(),
                code: None,
                param: None,
            }
        );
    }

    #[test]
    fn status_429_is_rate_limit_error() {
        let err = classify(Ok(response(429, r#"{"error":{"message":"too many"}}"#))).unwrap_err();
        assert!(matches!(err, StripeError::RateLimit { message } if message == "too many"));
    }

    #[test]
    fn other_4xx_is_invalid_request_with_param() {
        let body = r#"{"error":{"message":"No such customer: 'cus_x'","param":"id"}}"#;
        let err = classify(Ok(response(404, body))).unwrap_err();
        assert_eq!(
            err,
            StripeError::InvalidRequest {
                message: "No such customer: 'cus_x'".to_string(),
                param: Some("id".to_string()),
            }
        );

        let err = classify(Ok(response(400, r#"{"error":{"message":"bad"}}"#))).unwrap_err();
        assert!(matches!(err, StripeError::InvalidRequest { param: None, .. }));
    }

    #[test]
    fn server_and_unrecognized_statuses_are_api_errors() {
        for status in [500, 503, 302] {
            let err = classify(Ok(response(status, r#"{"error":{"message":"boom"}}"#))).unwrap_err();
            assert_eq!(
                err,
                StripeError::Api {
                    status,
                    message: "boom".to_string()
                }
            );
        }
    }

    #[test]
    fn non_json_body_is_malformed_response() {
        let err = classify(Ok(response(502, "<html>Bad Gateway</html>"))).unwrap_err();
        assert!(matches!(err, StripeError::MalformedResponse { status: 502, .. }));

        let err = classify(Ok(response(200, ""))).unwrap_err();
        assert!(matches!(err, StripeError::MalformedResponse { status: 200, .. }));
    }

    #[test]
    fn error_body_without_message_is_malformed_response() {
        for body in [r#"{}"#, r#"{"error":{"code":"x"}}"#, r#"{"error":"flat"}"#] {
            let err = classify(Ok(response(400, body))).unwrap_err();
            assert!(
                matches!(err, StripeError::MalformedResponse { status: 400, .. }),
                "{body}: {err:?}"
            );
        }
    }
}
