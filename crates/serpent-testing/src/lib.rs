//! Test infrastructure for the serpent crates.
//!
//! Provides an isolated on-disk environment with a controllable clock,
//! builders for webhook events and multipart bodies, and an HTTP mock
//! server for the outbound API clients.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

pub mod fixtures;
pub mod http;

pub use fixtures::{sign_payload, CheckoutEventBuilder, MultipartBuilder};
pub use http::{MockEndpoint, MockResponse, MockServer};
pub use serpent_core::{Clock, TestClock};

/// Isolated filesystem and clock for one test.
///
/// The ledger and upload paths live inside a temporary directory that is
/// removed when the environment is dropped.
pub struct TestEnv {
    /// Deterministic clock for time-based testing
    pub clock: TestClock,
    dir: tempfile::TempDir,
}

impl TestEnv {
    /// Creates a fresh environment.
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create temp dir")?;
        Ok(Self { clock: TestClock::new(), dir })
    }

    /// Root of the temporary directory.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Ledger location; the file does not exist until the first append.
    pub fn ledger_path(&self) -> PathBuf {
        self.dir.path().join("data").join("user-products.json")
    }

    /// Upload directory; created lazily by the upload service.
    pub fn upload_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    /// Returns whether the ledger file has been created.
    pub fn ledger_exists(&self) -> bool {
        self.ledger_path().exists()
    }

    /// Reads the raw ledger text.
    pub fn ledger_text(&self) -> Result<String> {
        std::fs::read_to_string(self.ledger_path()).context("failed to read ledger")
    }

    /// Reads the ledger as JSON entries.
    pub fn ledger_entries(&self) -> Result<Vec<Value>> {
        let text = self.ledger_text()?;
        serde_json::from_str(&text).context("ledger is not a JSON array")
    }

    /// Reads an uploaded file by name.
    pub fn uploaded(&self, name: &str) -> Result<Vec<u8>> {
        std::fs::read(self.upload_dir().join(name))
            .with_context(|| format!("upload {name} not found"))
    }
}
