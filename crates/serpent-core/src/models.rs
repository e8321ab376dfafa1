//! Purchase records and the payment provider's checkout event shape.
//!
//! A checkout-completed event becomes exactly one `PurchaseRecord`. The
//! record's `AssignmentId` is derived from the payment identifier alone, so
//! redelivery of the same payment always maps to the same assignment.

use std::{collections::HashMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// Event type that triggers purchase recording.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

const DEFAULT_USER_ID: &str = "user_unknown";
const DEFAULT_PRODUCT_ID: &str = "unknown";
const DEFAULT_PAYMENT_ID: &str = "unknown";
const DEFAULT_CURRENCY: &str = "usd";
const PRODUCT_TYPE_REAL: &str = "real";
const DEFAULT_NICKNAME: &str = "My Snake";
const ACQUISITION_STRIPE: &str = "stripe_purchase";

/// Deterministic assignment identifier.
///
/// `assign_` followed by the first 8 hex characters of the SHA-256 digest of
/// the payment identifier.
///
/// # Example
///
/// ```
/// use serpent_core::AssignmentId;
///
/// let id = AssignmentId::from_payment_id("pi_123");
/// assert!(id.as_str().starts_with("assign_"));
/// assert_eq!(id.as_str().len(), 15);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentId(String);

impl AssignmentId {
    /// Derives the assignment identifier for a payment.
    pub fn from_payment_id(payment_id: &str) -> Self {
        let digest = hex::encode(Sha256::digest(payment_id.as_bytes()));
        Self(format!("assign_{}", &digest[..8]))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Initial gameplay state for a newly acquired animal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStats {
    /// Hunger meter (0-100)
    pub hunger: u8,
    /// Water meter (0-100)
    pub water: u8,
    /// Enclosure temperature comfort (0-100)
    pub temperature: u8,
    /// Enclosure humidity comfort (0-100)
    pub humidity: u8,
    /// Overall health (0-100)
    pub health: u8,
    /// Stress level (0-100, lower is better)
    pub stress: u8,
    /// Enclosure cleanliness (0-100)
    pub cleanliness: u8,
    /// Happiness (0-100)
    pub happiness: u8,
}

impl Default for GameStats {
    fn default() -> Self {
        Self {
            hunger: 80,
            water: 90,
            temperature: 85,
            humidity: 60,
            health: 100,
            stress: 20,
            cleanliness: 90,
            happiness: 80,
        }
    }
}

/// One entry of the purchase ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Deterministic identifier derived from `payment_id`
    pub assignment_id: AssignmentId,
    /// Buyer reference supplied at checkout
    pub user_id: String,
    /// Catalog item identifier
    pub product_id: String,
    /// Always `real` for provider purchases
    pub product_type: String,
    /// Display name shown in the game
    pub nickname: String,
    /// Processing time, ISO-8601 UTC with trailing `Z`
    pub acquired_at: String,
    /// How the item was acquired
    pub acquisition_type: String,
    /// Provider payment-intent identifier
    pub payment_id: String,
    /// Amount in major currency units
    pub price_paid: f64,
    /// ISO currency code
    pub currency: String,
    /// Initial gameplay state
    pub stats: GameStats,
}

impl PurchaseRecord {
    /// Builds the ledger record for a completed checkout session.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidEvent` if `amount_total` is negative.
    pub fn from_checkout(session: &CheckoutSession, acquired_at: DateTime<Utc>) -> Result<Self> {
        let payment_id = session.payment_intent.as_deref().unwrap_or(DEFAULT_PAYMENT_ID);
        let amount_minor = session.amount_total.unwrap_or(0);
        if amount_minor < 0 {
            return Err(CoreError::InvalidEvent(format!(
                "amount_total must not be negative, got {amount_minor}"
            )));
        }

        Ok(Self {
            assignment_id: AssignmentId::from_payment_id(payment_id),
            user_id: session.client_reference_id.as_deref().unwrap_or(DEFAULT_USER_ID).to_string(),
            product_id: session.product_id().unwrap_or(DEFAULT_PRODUCT_ID).to_string(),
            product_type: PRODUCT_TYPE_REAL.to_string(),
            nickname: DEFAULT_NICKNAME.to_string(),
            acquired_at: format_timestamp(acquired_at),
            acquisition_type: ACQUISITION_STRIPE.to_string(),
            payment_id: payment_id.to_string(),
            price_paid: minor_to_major(amount_minor),
            currency: session.currency.as_deref().unwrap_or(DEFAULT_CURRENCY).to_string(),
            stats: GameStats::default(),
        })
    }
}

/// Converts an amount in cents to major units.
#[allow(clippy::cast_precision_loss)]
pub fn minor_to_major(amount_minor: i64) -> f64 {
    amount_minor as f64 / 100.0
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Checkout session object nested at `data.object`.
///
/// Every field is optional; absent and `null` values fall back to the ledger
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutSession {
    /// Buyer reference set by the storefront
    #[serde(default)]
    pub client_reference_id: Option<String>,
    /// Free-form metadata attached to the session
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    /// Payment-intent identifier
    #[serde(default)]
    pub payment_intent: Option<String>,
    /// Amount in minor units
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// ISO currency code
    #[serde(default)]
    pub currency: Option<String>,
}

impl CheckoutSession {
    /// Returns `metadata.product_id` when it is a string.
    pub fn product_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.get("product_id")?.as_str()
    }
}

/// Webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    /// Provider event identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Event type, e.g. `checkout.session.completed`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload; only required for checkout events
    #[serde(default)]
    pub data: Option<EventData>,
}

/// Payload wrapper of a webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    /// The object the event is about
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// Parses a raw webhook body.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidEvent` for invalid JSON or a missing `type`.
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(|e| CoreError::InvalidEvent(e.to_string()))
    }

    /// Returns whether this event should record a purchase.
    pub fn is_checkout_completed(&self) -> bool {
        self.event_type == CHECKOUT_COMPLETED
    }

    /// Decodes the checkout session from `data.object`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidEvent` if `data.object` is missing or has
    /// fields of the wrong type.
    pub fn checkout_session(&self) -> Result<CheckoutSession> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| CoreError::InvalidEvent("missing field `data`".to_string()))?;
        if !data.object.is_object() {
            return Err(CoreError::InvalidEvent("`data.object` is not an object".to_string()));
        }
        CheckoutSession::deserialize(&data.object)
            .map_err(|e| CoreError::InvalidEvent(format!("invalid checkout session: {e}")))
    }
}
