//! Purchase webhook handler.
//!
//! Accepts provider events, verifies their signature when a secret is
//! configured, and records completed checkouts in the ledger. Every failure
//! is answered with 400 so the provider marks the delivery as failed and
//! retries it.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serpent_core::{AppendOutcome, PurchaseRecord, StripeEvent};
use tracing::{debug, info, instrument, warn, Span};

use crate::{crypto::SIGNATURE_HEADER, error::ApiError, state::WebhookState};

/// Response body for accepted events.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Always `success`
    pub status: &'static str,
}

/// What happened to an accepted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event type has no side effect.
    Ignored,
    /// Purchase recorded, or already present.
    Recorded(AppendOutcome),
}

/// Handles `POST /webhook/stripe`.
#[instrument(
    name = "stripe_webhook",
    skip(state, headers, body),
    fields(
        content_length = body.len(),
        event_type = tracing::field::Empty,
        assignment_id = tracing::field::Empty,
    )
)]
pub async fn stripe_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match process_event(&state, &headers, &body).await {
        Ok(outcome) => {
            debug!(?outcome, "Webhook accepted");
            (StatusCode::OK, Json(WebhookResponse { status: "success" })).into_response()
        },
        Err(e) => {
            warn!(code = e.code(), error = %e, "Webhook rejected");
            e.into_response_with(StatusCode::BAD_REQUEST)
        },
    }
}

/// Verifies, parses and records one event.
///
/// # Errors
///
/// Returns the signature, parse, validation or ledger error that stopped
/// processing. The ledger is only written after every check has passed.
pub async fn process_event(
    state: &WebhookState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookOutcome, ApiError> {
    if let Some(verifier) = &state.verifier {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        verifier.verify(body, signature)?;
    }

    let event = StripeEvent::parse(body)?;
    Span::current().record("event_type", event.event_type.as_str());
    info!(event_id = event.id.as_deref().unwrap_or("-"), "Received webhook event");

    if !event.is_checkout_completed() {
        debug!("Event type has no handler");
        return Ok(WebhookOutcome::Ignored);
    }

    let session = event.checkout_session()?;
    let record = PurchaseRecord::from_checkout(&session, state.clock.now_utc())?;
    Span::current().record("assignment_id", record.assignment_id.as_str());

    let product_id = record.product_id.clone();
    let user_id = record.user_id.clone();
    let outcome = state.ledger.append(record).await?;

    match outcome {
        AppendOutcome::Appended { position } => {
            info!(%product_id, %user_id, position, "Purchase recorded");
        },
        AppendOutcome::Duplicate { position } => {
            info!(%product_id, %user_id, position, "Purchase already recorded");
        },
    }

    Ok(WebhookOutcome::Recorded(outcome))
}
