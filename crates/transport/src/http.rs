use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use snafu::ResultExt;

use super::error::{RequestSnafu, TransportResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub const HEADER_API_KEY: &str = "X-Api-Key";
pub const HEADER_ROLE: &str = "X-Role";
pub const HEADER_PROFILE: &str = "X-Profile";
pub const HEADER_CORRELATION_ID: &str = "X-Correlation-Id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Creates a request with no headers and no body.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Appends one header; existing headers with the same name are kept.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body and a JSON content type.
    pub fn with_json_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self.with_header("Content-Type", "application/json")
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Creates a response from a status code and a text body.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network capability injected into the transport.
///
/// Implementations resolve with whatever status the server answered; only failures that
/// prevent a status from being read are errors.
pub trait HttpClient: Send + Sync {
    fn send<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, TransportResult<HttpResponse>>;
}

#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Creates a reqwest client, bounded by `timeout` when one is given.
    pub fn new(timeout: Option<Duration>) -> TransportResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context(RequestSnafu {
            stage: "build-http-client",
        })?;
        Ok(Self { client })
    }

    /// Client that ignores proxy environment variables, for loopback servers in tests.
    #[cfg(test)]
    pub(crate) fn direct() -> Self {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("reqwest client builds without a proxy");
        Self { client }
    }

    pub(crate) fn build(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        builder
    }
}

impl HttpClient for ReqwestHttpClient {
    fn send<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, TransportResult<HttpResponse>> {
        Box::pin(async move {
            let response = self.build(&request).send().await.context(RequestSnafu {
                stage: "send-http-request",
            })?;
            let status = response.status().as_u16();
            let body = response.text().await.context(RequestSnafu {
                stage: "read-http-response",
            })?;
            Ok(HttpResponse { status, body })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let request = HttpRequest::new(HttpMethod::Post, "http://bff.test/api/chat")
            .with_header(HEADER_API_KEY, "k123")
            .with_json_body("{}".to_string());

        assert_eq!(request.header("x-api-key"), Some("k123"));
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header(HEADER_ROLE), None);
    }

    #[test]
    fn only_2xx_counts_as_success() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(302, "").is_success());
        assert!(!HttpResponse::new(403, "").is_success());
    }
}
