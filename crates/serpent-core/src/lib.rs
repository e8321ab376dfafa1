//! Core domain models for the serpent storefront services.
//!
//! Provides the purchase record and its deterministic assignment identifier,
//! the append-only purchase ledger, the streaming multipart scanner used by
//! the upload intake, and the clock abstraction shared by every service.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod ledger;
pub mod models;
pub mod multipart;
pub mod time;
pub mod upload;

pub use error::{CoreError, Result};
pub use ledger::{AppendOutcome, DuplicatePolicy, LedgerStore};
pub use models::{
    AssignmentId, CheckoutSession, GameStats, PurchaseRecord, StripeEvent, CHECKOUT_COMPLETED,
};
pub use multipart::{MultipartError, MultipartScanner, PartHeaders, ScanEvent};
pub use time::{Clock, RealClock, TestClock};
pub use upload::{validate_filename, FileSink};
