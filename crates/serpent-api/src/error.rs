//! HTTP error responses.
//!
//! Errors are returned as plain text carrying the underlying error code, so
//! the provider's delivery log and our own logs show the same message.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serpent_core::CoreError;
use thiserror::Error;

use crate::crypto::SignatureError;

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Domain, ledger or upload failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Webhook signature rejected (E2001).
    #[error("[E2001] {0}")]
    Signature(#[from] SignatureError),

    /// Request body could not be read (E2002).
    #[error("[E2002] Request body could not be read: {0}")]
    Body(String),

    /// Request body exceeds the configured limit (E2003).
    #[error("[E2003] Request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit in bytes
        limit: u64,
    },
}

impl ApiError {
    /// Returns the error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Core(e) => e.code(),
            Self::Signature(_) => "E2001",
            Self::Body(_) => "E2002",
            Self::PayloadTooLarge { .. } => "E2003",
        }
    }

    /// Status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Core(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Signature(_) | Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Renders the error as a plain-text response with an explicit status.
    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], self.to_string())
            .into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        self.into_response_with(status)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serpent_core::MultipartError;

    use super::*;

    #[test]
    fn status_mapping() {
        let client = ApiError::from(CoreError::Multipart(MultipartError::MissingBoundary));
        assert_eq!(client.status(), StatusCode::BAD_REQUEST);

        let server = ApiError::from(CoreError::UploadIo {
            path: PathBuf::from("uploads/a.bin"),
            source: std::io::Error::other("disk full"),
        });
        assert_eq!(server.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(ApiError::from(SignatureError::VerificationFailed).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::PayloadTooLarge { limit: 10 }.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn codes_pass_through() {
        assert_eq!(ApiError::from(CoreError::MissingFile).code(), "E1006");
        assert_eq!(ApiError::from(SignatureError::MissingSignature).code(), "E2001");
        assert_eq!(
            ApiError::from(SignatureError::MissingSignature).to_string(),
            "[E2001] signature header missing"
        );
    }
}
