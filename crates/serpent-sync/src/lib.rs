//! Outbound synchronisation with the storefront's external services.
//!
//! Pulls the active product catalog from the payment provider and rewrites
//! it into the storefront's catalog file, and clears the edge key-value
//! namespace that caches storefront pages.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod client;
pub mod error;
pub mod kv;
pub mod secret;

pub use catalog::{sync_catalog, to_catalog_item, CatalogClient, CatalogItem, ProviderConfig};
pub use client::ClientConfig;
pub use error::{Result, SyncError};
pub use kv::{ClearReport, KvClient, KvConfig};
pub use secret::Secret;
