//! Shared HTTP plumbing for the outbound API clients.
//!
//! Builds the pooled `reqwest` client and turns transport failures and
//! non-success responses into categorized `SyncError`s.

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::{Result, SyncError};

/// Longest response body kept in an `ApiError`.
const MAX_ERROR_BODY: usize = 1024;

/// HTTP settings shared by every outbound client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("serpent/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Builds a pooled HTTP client with these settings.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ConfigurationError` if the TLS backend cannot be
    /// initialised.
    pub(crate) fn build(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| SyncError::configuration(format!("failed to build HTTP client: {e}")))
    }
}

/// Sends a request and decodes a successful JSON response.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    timeout: Duration,
) -> Result<T> {
    let response = send(request, timeout).await?;
    let response = ensure_success(response).await?;
    response.json::<T>().await.map_err(|e| SyncError::decode(e.to_string()))
}

/// Sends a request, categorizing transport failures.
pub(crate) async fn send(request: RequestBuilder, timeout: Duration) -> Result<Response> {
    match request.send().await {
        Ok(response) => {
            tracing::debug!(status = response.status().as_u16(), url = %response.url(), "Received response");
            Ok(response)
        },
        Err(e) => {
            tracing::warn!("Request failed: {}", e);
            if e.is_timeout() {
                return Err(SyncError::timeout(timeout.as_secs()));
            }
            if e.is_connect() {
                return Err(SyncError::network(format!("connection failed: {e}")));
            }
            Err(SyncError::network(e.to_string()))
        },
    }
}

/// Passes 2xx responses through and turns everything else into `ApiError`.
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(text) if text.len() > MAX_ERROR_BODY => {
            let mut end = MAX_ERROR_BODY;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated)", &text[..end])
        },
        Ok(text) => text,
        Err(e) => format!("[Failed to read response body: {e}]"),
    };

    Err(SyncError::api(status.as_u16(), body))
}
