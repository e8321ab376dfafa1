//! Error types for outbound synchronisation.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors raised while talking to the provider or key-value APIs.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Required settings are missing or invalid (E3001).
    #[error("[E3001] configuration error: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },

    /// Connection could not be established or was reset (E3002).
    #[error("[E3002] network error: {message}")]
    NetworkError {
        /// Network error details
        message: String,
    },

    /// Request did not complete in time (E3003).
    #[error("[E3003] request timed out after {timeout_seconds}s")]
    Timeout {
        /// Timeout duration in seconds
        timeout_seconds: u64,
    },

    /// Remote API answered with a non-success status (E3004).
    #[error("[E3004] API returned HTTP {status_code}: {body}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Response body, truncated
        body: String,
    },

    /// Response body did not have the expected shape (E3005).
    #[error("[E3005] unexpected response: {message}")]
    DecodeError {
        /// Decode failure details
        message: String,
    },

    /// Output file could not be written (E3006).
    #[error("[E3006] failed to write {}: {source}", path.display())]
    OutputError {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates an API error from an HTTP response.
    pub fn api(status_code: u16, body: impl Into<String>) -> Self {
        Self::ApiError { status_code, body: body.into() }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::DecodeError { message: message.into() }
    }

    /// Returns the error code (E3001-E3006).
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConfigurationError { .. } => "E3001",
            Self::NetworkError { .. } => "E3002",
            Self::Timeout { .. } => "E3003",
            Self::ApiError { .. } => "E3004",
            Self::DecodeError { .. } => "E3005",
            Self::OutputError { .. } => "E3006",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_build_matching_variants() {
        assert_eq!(SyncError::configuration("missing key").code(), "E3001");
        assert_eq!(SyncError::network("reset").code(), "E3002");
        assert_eq!(SyncError::timeout(30).code(), "E3003");
        assert_eq!(SyncError::api(401, "denied").code(), "E3004");
        assert_eq!(SyncError::decode("not json").code(), "E3005");
    }

    #[test]
    fn api_error_message_includes_status() {
        let err = SyncError::api(404, "no such namespace");
        assert_eq!(err.to_string(), "[E3004] API returned HTTP 404: no such namespace");
    }
}
