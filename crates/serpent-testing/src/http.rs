//! HTTP mocking for the outbound API clients.

use std::{collections::HashMap, time::Duration};

use http::StatusCode;
use serde_json::Value;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer as WiremockServer, Request, ResponseTemplate,
};

/// HTTP mock server standing in for the provider and key-value APIs.
pub struct MockServer {
    server: WiremockServer,
}

impl MockServer {
    /// Starts a new mock server on a random port.
    pub async fn start() -> Self {
        Self { server: WiremockServer::start().await }
    }

    /// Returns the base URL of the mock server.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Returns the full URL for `path`.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{path}", self.server.uri())
    }

    /// Configures an endpoint to return a specific response.
    pub async fn mock_endpoint(&self, endpoint: MockEndpoint) {
        let response = match endpoint.response {
            MockResponse::Json { status, body } => {
                ResponseTemplate::new(status.as_u16()).set_body_json(body)
            },
            MockResponse::Status(status) => ResponseTemplate::new(status.as_u16()),
            MockResponse::Delayed { status, delay } => {
                ResponseTemplate::new(status.as_u16()).set_delay(delay)
            },
        };

        let mut mock =
            Mock::given(method(endpoint.method.as_str())).and(path(endpoint.path.as_str()));

        for (key, value) in &endpoint.query {
            mock = mock.and(query_param(key.as_str(), value.as_str()));
        }
        for (key, value) in &endpoint.expected_headers {
            mock = mock.and(header(key.as_str(), value.as_str()));
        }

        let mock = match endpoint.times {
            Some(n) => mock.respond_with(response).up_to_n_times(n),
            None => mock.respond_with(response),
        };
        mock.mount(&self.server).await;
    }

    /// Shorthand for a JSON response to `GET path`.
    pub async fn mock_get_json(&self, path: &str, body: Value) {
        self.mock_endpoint(MockEndpoint::get(path).respond_json(StatusCode::OK, body)).await;
    }

    /// Returns all requests received by the server.
    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Asserts that exactly n requests were received.
    pub async fn assert_request_count(&self, expected: usize) {
        let requests = self.received_requests().await;
        assert_eq!(
            requests.len(),
            expected,
            "Expected {} requests, received {}",
            expected,
            requests.len()
        );
    }
}

/// Configuration for a mock endpoint.
pub struct MockEndpoint {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    expected_headers: HashMap<String, String>,
    response: MockResponse,
    times: Option<u64>,
}

impl MockEndpoint {
    fn new(method: &str, path: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            path: path.into(),
            query: Vec::new(),
            expected_headers: HashMap::new(),
            response: MockResponse::Status(StatusCode::OK),
            times: None,
        }
    }

    /// Matches `GET path`.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    /// Matches `DELETE path`.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new("DELETE", path)
    }

    /// Requires a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Requires a request header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.expected_headers.insert(key.into(), value.into());
        self
    }

    /// Responds with a JSON body.
    #[must_use]
    pub fn respond_json(mut self, status: StatusCode, body: Value) -> Self {
        self.response = MockResponse::Json { status, body };
        self
    }

    /// Responds with an empty body.
    #[must_use]
    pub fn respond_status(mut self, status: StatusCode) -> Self {
        self.response = MockResponse::Status(status);
        self
    }

    /// Responds after `delay`.
    #[must_use]
    pub fn respond_after(mut self, status: StatusCode, delay: Duration) -> Self {
        self.response = MockResponse::Delayed { status, delay };
        self
    }

    /// Matches at most `n` requests.
    #[must_use]
    pub fn times(mut self, n: u64) -> Self {
        self.times = Some(n);
        self
    }
}

/// Types of mock responses.
pub enum MockResponse {
    /// JSON body with status.
    Json {
        /// Response status
        status: StatusCode,
        /// Response body
        body: Value,
    },
    /// Empty body with status.
    Status(StatusCode),
    /// Empty body sent after a delay.
    Delayed {
        /// Response status
        status: StatusCode,
        /// Delay before responding
        delay: Duration,
    },
}
