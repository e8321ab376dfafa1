//! Edge key-value namespace maintenance.
//!
//! Lists every key in a namespace (following cursor pagination) and deletes
//! them one by one. A failed delete is recorded and the sweep continues.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};

use crate::{
    client::{self, ClientConfig},
    error::{Result, SyncError},
    secret::Secret,
};

/// Default key-value API origin.
pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Keys requested per listing page.
const PAGE_SIZE: &str = "1000";

/// Progress is logged every this many deletions.
const PROGRESS_EVERY: usize = 10;

/// Connection settings for one key-value namespace.
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// API origin, without a trailing slash.
    pub api_base: String,
    /// Owning account.
    pub account_id: String,
    /// Namespace to operate on.
    pub namespace_id: String,
    /// API token sent as a bearer token.
    pub api_token: Secret,
    /// HTTP client settings.
    pub client: ClientConfig,
}

/// Outcome of clearing a namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    /// Keys present before deletion started.
    pub found: usize,
    /// Keys deleted successfully.
    pub deleted: usize,
    /// Keys whose deletion failed, with the error message.
    pub failed: Vec<(String, String)>,
    /// Keys still listed after the sweep, when a sweep ran.
    pub remaining: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    #[serde(default)]
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeyEntry {
    name: String,
}

/// Client for a single key-value namespace.
#[derive(Debug, Clone)]
pub struct KvClient {
    http: reqwest::Client,
    config: KvConfig,
}

impl KvClient {
    /// Creates a namespace client.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ConfigurationError` if the token, account or
    /// namespace is empty, or the HTTP client cannot be built.
    pub fn new(config: KvConfig) -> Result<Self> {
        if config.api_token.is_empty() {
            return Err(SyncError::configuration("key-value API token is not set"));
        }
        if config.account_id.is_empty() || config.namespace_id.is_empty() {
            return Err(SyncError::configuration("key-value account and namespace ids are required"));
        }
        let http = config.client.build()?;
        Ok(Self { http, config })
    }

    fn namespace_url(&self, suffix: &str) -> String {
        format!(
            "{}/accounts/{}/storage/kv/namespaces/{}{suffix}",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_id,
            self.config.namespace_id,
        )
    }

    fn timeout(&self) -> Duration {
        self.config.client.timeout
    }

    /// Lists every key name in the namespace.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ApiError` when the API rejects the request or
    /// reports `success: false`.
    pub async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.namespace_url("/keys"))
                .bearer_auth(self.config.api_token.expose())
                .query(&[("limit", PAGE_SIZE)]);
            if let Some(cursor) = cursor.as_deref() {
                request = request.query(&[("cursor", cursor)]);
            }

            let envelope: Envelope<Vec<KeyEntry>> = client::send_json(request, self.timeout())
                .instrument(info_span!("list_keys", page_start = keys.len()))
                .await?;
            let (page, info) = unwrap_envelope(envelope)?;
            keys.extend(page.unwrap_or_default().into_iter().map(|entry| entry.name));

            cursor = info.and_then(|i| i.cursor).filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        Ok(keys)
    }

    /// Deletes one key. The name is percent-encoded into the path.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ApiError` when the delete is rejected.
    pub async fn delete_key(&self, name: &str) -> Result<()> {
        let url = self.namespace_url(&format!("/values/{}", urlencoding::encode(name)));
        let request = self.http.delete(url).bearer_auth(self.config.api_token.expose());

        let envelope: Envelope<serde_json::Value> =
            client::send_json(request, self.timeout()).await?;
        unwrap_envelope(envelope)?;
        Ok(())
    }

    /// Deletes the given keys, recording failures without stopping.
    pub async fn delete_keys(&self, keys: &[String]) -> ClearReport {
        let mut report = ClearReport { found: keys.len(), ..ClearReport::default() };

        for key in keys {
            match self.delete_key(key).await {
                Ok(()) => {
                    report.deleted += 1;
                    if report.deleted % PROGRESS_EVERY == 0 {
                        info!(deleted = report.deleted, total = keys.len(), "Deleting keys");
                    }
                },
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to delete key");
                    report.failed.push((key.clone(), e.to_string()));
                },
            }
        }

        report
    }

    /// Lists and, when `confirm` is set, deletes every key in the namespace.
    ///
    /// Without confirmation only `found` is filled in. After a sweep the
    /// namespace is listed again to report what remains.
    ///
    /// # Errors
    ///
    /// Returns an error only if listing fails; individual delete failures
    /// are reported in `ClearReport::failed`.
    pub async fn clear_namespace(&self, confirm: bool) -> Result<ClearReport> {
        let keys = self.list_keys().await?;
        info!(found = keys.len(), "Listed namespace keys");

        if !confirm || keys.is_empty() {
            return Ok(ClearReport { found: keys.len(), ..ClearReport::default() });
        }

        let mut report = self.delete_keys(&keys).await;
        let remaining = self.list_keys().await?.len();
        report.remaining = Some(remaining);

        info!(
            found = report.found,
            deleted = report.deleted,
            failed = report.failed.len(),
            remaining,
            "Namespace cleared"
        );
        Ok(report)
    }
}

fn unwrap_envelope<T>(
    envelope: Envelope<T>,
) -> Result<(Option<T>, Option<ResultInfo>)> {
    if !envelope.success {
        let message = envelope
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(SyncError::api(200, format!("request reported failure: {message}")));
    }
    Ok((envelope.result, envelope.result_info))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> KvConfig {
        KvConfig {
            api_base: "https://kv.example/client/v4/".to_string(),
            account_id: "acct".to_string(),
            namespace_id: "ns".to_string(),
            api_token: Secret::new("token-abcdefghijkl"),
            client: ClientConfig::default(),
        }
    }

    #[test]
    fn namespace_url_trims_trailing_slash() {
        let client = KvClient::new(config()).unwrap();
        assert_eq!(
            client.namespace_url("/keys"),
            "https://kv.example/client/v4/accounts/acct/storage/kv/namespaces/ns/keys"
        );
    }

    #[test]
    fn missing_settings_rejected() {
        let mut no_token = config();
        no_token.api_token = Secret::new("");
        assert_eq!(KvClient::new(no_token).unwrap_err().code(), "E3001");

        let mut no_namespace = config();
        no_namespace.namespace_id.clear();
        assert_eq!(KvClient::new(no_namespace).unwrap_err().code(), "E3001");
    }

    #[test]
    fn failed_envelope_becomes_api_error() {
        let envelope: Envelope<serde_json::Value> = serde_json::from_value(serde_json::json!({
            "success": false,
            "errors": [{"code": 10009, "message": "key not found"}],
            "result": null
        }))
        .unwrap();

        let err = unwrap_envelope(envelope).unwrap_err();
        assert!(err.to_string().contains("10009: key not found"));
    }
}
