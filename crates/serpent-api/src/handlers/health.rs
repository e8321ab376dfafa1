//! Health check handlers for service monitoring.
//!
//! The webhook service reports the ledger's record count; a ledger that
//! cannot be read makes it unhealthy. The upload service has no
//! dependencies to check.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serpent_core::{Clock, LedgerStore};
use tracing::{debug, error, instrument};

use crate::state::{UploadState, WebhookState};

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Timestamp when health check was performed
    pub timestamp: DateTime<Utc>,
    /// Which service answered
    pub service: &'static str,
    /// Service version information
    pub version: &'static str,
    /// Number of records in the ledger
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_records: Option<usize>,
    /// Why the ledger could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_error: Option<String>,
}

/// Overall health status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// A required component is failing
    Unhealthy,
}

/// Health service that encapsulates the clock for testable health checks.
pub struct HealthService {
    clock: Arc<dyn Clock>,
    service: &'static str,
}

impl HealthService {
    /// Creates a new health service with the given clock.
    pub fn new(clock: Arc<dyn Clock>, service: &'static str) -> Self {
        Self { clock, service }
    }

    /// Performs the service's health checks.
    pub async fn health_check(&self, ledger: Option<&LedgerStore>) -> HealthResponse {
        debug!(service = self.service, "Performing health check");

        let mut response = HealthResponse {
            status: HealthStatus::Healthy,
            timestamp: self.clock.now_utc(),
            service: self.service,
            version: env!("CARGO_PKG_VERSION"),
            ledger_records: None,
            ledger_error: None,
        };

        if let Some(ledger) = ledger {
            match ledger.len().await {
                Ok(count) => response.ledger_records = Some(count),
                Err(e) => {
                    error!("Ledger health check failed: {}", e);
                    response.status = HealthStatus::Unhealthy;
                    response.ledger_error = Some(e.to_string());
                },
            }
        }

        response
    }
}

fn respond(response: HealthResponse) -> Response {
    let status_code = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response)).into_response()
}

/// Health endpoint of the webhook service.
#[instrument(name = "health_check", skip(state))]
pub async fn webhook_health(State(state): State<WebhookState>) -> Response {
    let service = HealthService::new(state.clock.clone(), "serpent-webhook");
    respond(service.health_check(Some(state.ledger.as_ref())).await)
}

/// Health endpoint of the upload service.
#[instrument(name = "health_check", skip(state))]
pub async fn upload_health(State(state): State<UploadState>) -> Response {
    let service = HealthService::new(state.clock.clone(), "serpent-upload");
    respond(service.health_check(None).await)
}
