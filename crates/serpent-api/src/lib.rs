//! Serpent HTTP services.
//!
//! Two small services share this crate: the purchase webhook, which turns
//! completed checkouts into ledger records, and the upload intake, which
//! streams browser uploads to disk.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

pub use config::Config;
pub use crypto::{SignatureError, SignatureVerifier};
pub use error::ApiError;
pub use server::{serve_until, shutdown_signal, start_server, upload_router, webhook_router};
pub use state::{UploadState, WebhookState};
