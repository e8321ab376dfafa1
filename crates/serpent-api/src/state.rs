//! Shared handler state for the two services.

use std::{path::PathBuf, sync::Arc};

use serpent_core::{Clock, LedgerStore};
use tracing::{info, warn};

use crate::{config::Config, crypto::SignatureVerifier};

/// State of the purchase webhook service.
#[derive(Clone)]
pub struct WebhookState {
    /// Purchase ledger
    pub ledger: Arc<LedgerStore>,
    /// Signature check; `None` accepts unsigned events
    pub verifier: Option<Arc<SignatureVerifier>>,
    /// Time source for record timestamps and signature tolerance
    pub clock: Arc<dyn Clock>,
    /// Largest accepted body in bytes
    pub max_body_bytes: usize,
}

impl WebhookState {
    /// Creates state without signature verification and a 1 MiB body limit.
    pub fn new(ledger: LedgerStore, clock: Arc<dyn Clock>) -> Self {
        Self { ledger: Arc::new(ledger), verifier: None, clock, max_body_bytes: 1024 * 1024 }
    }

    /// Enables signature verification.
    #[must_use]
    pub fn with_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    /// Overrides the body limit.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Builds state from loaded configuration.
    ///
    /// Logs a warning when no webhook secret is configured, since every
    /// event is then trusted as-is.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let ledger = LedgerStore::new(&config.ledger_path, config.duplicate_policy()?);
        let mut state = Self::new(ledger, clock.clone()).with_max_body_bytes(config.webhook_max_bytes);

        match config.stripe_webhook_secret.as_ref().filter(|s| !s.is_empty()) {
            Some(secret) => {
                info!(secret = %secret, "Webhook signature verification enabled");
                state = state.with_verifier(SignatureVerifier::new(
                    secret.expose(),
                    config.signature_tolerance(),
                    clock,
                ));
            },
            None => {
                warn!("STRIPE_WEBHOOK_SECRET is not set; webhook signatures will not be verified");
            },
        }

        Ok(state)
    }
}

/// State of the upload intake service.
#[derive(Clone)]
pub struct UploadState {
    /// Destination directory for uploaded files
    pub upload_dir: Arc<PathBuf>,
    /// Time source for health responses
    pub clock: Arc<dyn Clock>,
    /// Largest accepted body in bytes
    pub max_body_bytes: u64,
}

impl UploadState {
    /// Creates state with a 64 MiB body limit.
    pub fn new(upload_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self { upload_dir: Arc::new(upload_dir.into()), clock, max_body_bytes: 64 * 1024 * 1024 }
    }

    /// Overrides the body limit.
    #[must_use]
    pub fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Builds state from loaded configuration.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::new(&config.upload_dir, clock).with_max_body_bytes(config.upload_max_bytes)
    }
}
