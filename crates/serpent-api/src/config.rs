//! Configuration management for the serpent services.

use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use serpent_core::DuplicatePolicy;
use serpent_sync::{ClientConfig, KvConfig, ProviderConfig, Secret};

const CONFIG_FILE: &str = "serpent.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`serpent.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Every service starts with no file and no environment at all; the catalog
/// and key-value commands additionally need their credentials.
///
/// # Example
///
/// ```no_run
/// use serpent_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Webhook service will bind to {}", config.webhook_addr().unwrap());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server
    /// Bind address shared by both services.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Webhook service port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// Upload service port.
    ///
    /// Environment variable: `UPLOAD_PORT`
    #[serde(default = "default_upload_port", alias = "UPLOAD_PORT")]
    pub upload_port: u16,
    /// Per-request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_SECS`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    // Webhook
    /// Purchase ledger file.
    ///
    /// Environment variable: `LEDGER_PATH`
    #[serde(default = "default_ledger_path", alias = "LEDGER_PATH")]
    pub ledger_path: PathBuf,
    /// What to do with a second record for the same assignment id:
    /// `skip` or `append`.
    ///
    /// Environment variable: `LEDGER_DUPLICATES`
    #[serde(default = "default_ledger_duplicates", alias = "LEDGER_DUPLICATES")]
    pub ledger_duplicates: String,
    /// Webhook signing secret; verification is off when unset.
    ///
    /// Environment variable: `STRIPE_WEBHOOK_SECRET`
    #[serde(default, alias = "STRIPE_WEBHOOK_SECRET")]
    pub stripe_webhook_secret: Option<Secret>,
    /// Maximum age of a signed webhook in seconds.
    ///
    /// Environment variable: `SIGNATURE_TOLERANCE_SECS`
    #[serde(default = "default_signature_tolerance", alias = "SIGNATURE_TOLERANCE_SECS")]
    pub signature_tolerance_secs: u64,
    /// Largest accepted webhook body in bytes.
    ///
    /// Environment variable: `WEBHOOK_MAX_BYTES`
    #[serde(default = "default_webhook_max_bytes", alias = "WEBHOOK_MAX_BYTES")]
    pub webhook_max_bytes: usize,

    // Upload
    /// Directory receiving uploaded files.
    ///
    /// Environment variable: `UPLOAD_DIR`
    #[serde(default = "default_upload_dir", alias = "UPLOAD_DIR")]
    pub upload_dir: PathBuf,
    /// Largest accepted upload body in bytes.
    ///
    /// Environment variable: `UPLOAD_MAX_BYTES`
    #[serde(default = "default_upload_max_bytes", alias = "UPLOAD_MAX_BYTES")]
    pub upload_max_bytes: u64,

    // Catalog sync
    /// Provider secret API key.
    ///
    /// Environment variable: `STRIPE_SECRET_KEY`
    #[serde(default, alias = "STRIPE_SECRET_KEY")]
    pub stripe_secret_key: Option<Secret>,
    /// Provider API origin.
    ///
    /// Environment variable: `STRIPE_API_BASE`
    #[serde(default = "default_stripe_api_base", alias = "STRIPE_API_BASE")]
    pub stripe_api_base: String,
    /// Generated catalog file.
    ///
    /// Environment variable: `CATALOG_PATH`
    #[serde(default = "default_catalog_path", alias = "CATALOG_PATH")]
    pub catalog_path: PathBuf,

    // Key-value store
    /// Key-value API token.
    ///
    /// Environment variable: `CLOUDFLARE_API_TOKEN`
    #[serde(default, alias = "CLOUDFLARE_API_TOKEN")]
    pub cloudflare_api_token: Option<Secret>,
    /// Key-value account id.
    ///
    /// Environment variable: `CLOUDFLARE_ACCOUNT_ID`
    #[serde(default, alias = "CLOUDFLARE_ACCOUNT_ID")]
    pub cloudflare_account_id: Option<String>,
    /// Key-value namespace id.
    ///
    /// Environment variable: `CLOUDFLARE_KV_NAMESPACE_ID`
    #[serde(default, alias = "CLOUDFLARE_KV_NAMESPACE_ID")]
    pub cloudflare_kv_namespace_id: Option<String>,
    /// Key-value API origin.
    ///
    /// Environment variable: `CLOUDFLARE_API_BASE`
    #[serde(default = "default_cloudflare_api_base", alias = "CLOUDFLARE_API_BASE")]
    pub cloudflare_api_base: String,

    // Client
    /// Timeout for outbound API requests in seconds.
    ///
    /// Environment variable: `OUTBOUND_TIMEOUT_SECS`
    #[serde(default = "default_outbound_timeout", alias = "OUTBOUND_TIMEOUT_SECS")]
    pub outbound_timeout_secs: u64,

    // Logging
    /// Log filter directive.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// The layered configuration sources used by [`Config::load`].
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""))
    }

    /// Extracts and validates configuration from arbitrary sources.
    ///
    /// # Errors
    ///
    /// Returns an error if extraction or validation fails.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Webhook service socket address.
    pub fn webhook_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.host, self.port)
    }

    /// Upload service socket address.
    pub fn upload_addr(&self) -> Result<SocketAddr> {
        parse_addr(&self.host, self.upload_port)
    }

    /// Parsed ledger duplicate policy.
    pub fn duplicate_policy(&self) -> Result<DuplicatePolicy> {
        DuplicatePolicy::from_str(&self.ledger_duplicates)
            .map_err(|e| anyhow::anyhow!("invalid ledger_duplicates: {e}"))
    }

    /// Accepted clock skew for signed webhooks.
    pub fn signature_tolerance(&self) -> Duration {
        Duration::from_secs(self.signature_tolerance_secs)
    }

    /// Per-request timeout for both services.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Webhook secret masked for logging, or `"<unset>"`.
    pub fn masked_secret(&self) -> String {
        self.stripe_webhook_secret
            .as_ref()
            .filter(|s| !s.is_empty())
            .map_or_else(|| "<unset>".to_string(), Secret::masked)
    }

    /// Convert to client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.outbound_timeout_secs),
            ..ClientConfig::default()
        }
    }

    /// Provider settings for catalog sync.
    ///
    /// # Errors
    ///
    /// Returns an error if `STRIPE_SECRET_KEY` is not set.
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        let api_key = self
            .stripe_secret_key
            .clone()
            .filter(|k| !k.is_empty())
            .context("STRIPE_SECRET_KEY is not set")?;

        Ok(ProviderConfig {
            api_base: self.stripe_api_base.clone(),
            api_key,
            client: self.to_client_config(),
        })
    }

    /// Key-value namespace settings.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing credential.
    pub fn kv_config(&self) -> Result<KvConfig> {
        let api_token = self
            .cloudflare_api_token
            .clone()
            .filter(|t| !t.is_empty())
            .context("CLOUDFLARE_API_TOKEN is not set")?;
        let account_id = self
            .cloudflare_account_id
            .clone()
            .filter(|a| !a.is_empty())
            .context("CLOUDFLARE_ACCOUNT_ID is not set")?;
        let namespace_id = self
            .cloudflare_kv_namespace_id
            .clone()
            .filter(|n| !n.is_empty())
            .context("CLOUDFLARE_KV_NAMESPACE_ID is not set")?;

        Ok(KvConfig {
            api_base: self.cloudflare_api_base.clone(),
            account_id,
            namespace_id,
            api_token,
            client: self.to_client_config(),
        })
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.port == 0 || self.upload_port == 0 {
            anyhow::bail!("ports must be greater than 0");
        }

        if self.port == self.upload_port {
            anyhow::bail!("port and upload_port must differ");
        }

        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.signature_tolerance_secs == 0 {
            anyhow::bail!("signature_tolerance_secs must be greater than 0");
        }

        if self.webhook_max_bytes == 0 || self.upload_max_bytes == 0 {
            anyhow::bail!("body limits must be greater than 0");
        }

        if self.outbound_timeout_secs == 0 {
            anyhow::bail!("outbound_timeout_secs must be greater than 0");
        }

        self.duplicate_policy()?;

        Ok(())
    }
}

fn parse_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let addr_str = format!("{host}:{port}");
    SocketAddr::from_str(&addr_str).context("Invalid server address")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upload_port: default_upload_port(),
            request_timeout_secs: default_request_timeout(),
            ledger_path: default_ledger_path(),
            ledger_duplicates: default_ledger_duplicates(),
            stripe_webhook_secret: None,
            signature_tolerance_secs: default_signature_tolerance(),
            webhook_max_bytes: default_webhook_max_bytes(),
            upload_dir: default_upload_dir(),
            upload_max_bytes: default_upload_max_bytes(),
            stripe_secret_key: None,
            stripe_api_base: default_stripe_api_base(),
            catalog_path: default_catalog_path(),
            cloudflare_api_token: None,
            cloudflare_account_id: None,
            cloudflare_kv_namespace_id: None,
            cloudflare_api_base: default_cloudflare_api_base(),
            outbound_timeout_secs: default_outbound_timeout(),
            rust_log: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_upload_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/user-products.json")
}

fn default_ledger_duplicates() -> String {
    DuplicatePolicy::default().to_string()
}

fn default_signature_tolerance() -> u64 {
    300
}

fn default_webhook_max_bytes() -> usize {
    1024 * 1024
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_upload_max_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_stripe_api_base() -> String {
    serpent_sync::catalog::DEFAULT_API_BASE.to_string()
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("data/products.json")
}

fn default_cloudflare_api_base() -> String {
    serpent_sync::kv::DEFAULT_API_BASE.to_string()
}

fn default_outbound_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info,serpent=debug,tower_http=debug".to_string()
}
