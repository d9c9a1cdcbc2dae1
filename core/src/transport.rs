//! Blocking transport backed by `ureq`.

use ureq::{Agent, RequestBuilder};

use crate::http::{Action, HttpRequest, HttpResponse, Transport, TransportError};

/// Executes `HttpRequest`s with a `ureq::Agent`.
///
/// The agent is built with `http_status_as_error(false)` so 4xx/5xx responses
/// come back as data and the client can classify them.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Use a caller-configured agent (timeouts, proxies, TLS). The agent
    /// must not treat HTTP status codes as errors.
    pub fn with_agent(agent: Agent) -> Self {
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.as_str();
        let result = match request.action {
            Action::Get => with_headers(self.agent.get(url), &request.headers).call(),
            Action::Delete => with_headers(self.agent.delete(url), &request.headers).call(),
            Action::Post => {
                with_headers(self.agent.post(url), &request.headers).send(request.body.as_bytes())
            }
            Action::Put => {
                with_headers(self.agent.put(url), &request.headers).send(request.body.as_bytes())
            }
        };
        let mut response = result.map_err(|e| TransportError::new(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TransportError::new(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}
