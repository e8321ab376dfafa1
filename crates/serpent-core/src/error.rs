//! Error types for purchase recording and upload intake.
//!
//! Every variant carries a stable code so that plain-text error bodies stay
//! greppable in logs and in the payment provider's delivery dashboard.

use std::path::PathBuf;

use thiserror::Error;

use crate::multipart::MultipartError;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for ledger, event and upload operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Webhook event could not be parsed or is missing required fields (E1001).
    #[error("[E1001] Invalid event: {0}")]
    InvalidEvent(String),

    /// Ledger file could not be read or written (E1002).
    #[error("[E1002] Ledger I/O failed for {}: {source}", path.display())]
    LedgerIo {
        /// Path of the ledger file or its temporary sibling
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Ledger records could not be serialized (E1003).
    #[error("[E1003] Ledger serialization failed: {0}")]
    LedgerSerialization(#[source] serde_json::Error),

    /// Multipart body framing is malformed (E1004).
    #[error("[E1004] Malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    /// Upload filename is empty or escapes the upload directory (E1005).
    #[error("[E1005] Invalid upload filename: {filename:?}")]
    InvalidFilename {
        /// The filename as supplied by the client
        filename: String,
    },

    /// Multipart body carried no part with a filename (E1006).
    #[error("[E1006] No file part found in upload")]
    MissingFile,

    /// Upload could not be written to disk (E1007).
    #[error("[E1007] Upload I/O failed for {}: {source}", path.display())]
    UploadIo {
        /// Destination or temporary path
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },
}

impl CoreError {
    /// Returns the error code (E1001-E1007).
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_) => "E1001",
            Self::LedgerIo { .. } => "E1002",
            Self::LedgerSerialization(_) => "E1003",
            Self::Multipart(_) => "E1004",
            Self::InvalidFilename { .. } => "E1005",
            Self::MissingFile => "E1006",
            Self::UploadIo { .. } => "E1007",
        }
    }

    /// Returns whether the caller sent something that can never succeed.
    ///
    /// Server-side failures (disk, serialization) return `false`; a retry by
    /// the caller may succeed once the cause is fixed.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidEvent(_)
                | Self::Multipart(_)
                | Self::InvalidFilename { .. }
                | Self::MissingFile
        )
    }
}
