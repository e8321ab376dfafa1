//! Builders for webhook events, multipart bodies and signature headers.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

/// Builder for provider webhook events.
///
/// Defaults to a completed checkout for `prod_snake_1` paid with
/// `pi_test_123`.
#[derive(Debug, Clone)]
pub struct CheckoutEventBuilder {
    event_id: String,
    event_type: String,
    user_id: Option<String>,
    product_id: Option<String>,
    payment_intent: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
}

impl Default for CheckoutEventBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckoutEventBuilder {
    /// Creates a builder with a fully populated checkout session.
    pub fn new() -> Self {
        Self {
            event_id: "evt_test_1".to_string(),
            event_type: "checkout.session.completed".to_string(),
            user_id: Some("user_123".to_string()),
            product_id: Some("prod_snake_1".to_string()),
            payment_intent: Some("pi_test_123".to_string()),
            amount_total: Some(15_000),
            currency: Some("usd".to_string()),
        }
    }

    /// Sets the event type.
    #[must_use]
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    /// Sets the event id.
    #[must_use]
    pub fn event_id(mut self, id: impl Into<String>) -> Self {
        self.event_id = id.into();
        self
    }

    /// Sets `client_reference_id`; `None` omits the field.
    #[must_use]
    pub fn user(mut self, user: Option<&str>) -> Self {
        self.user_id = user.map(str::to_string);
        self
    }

    /// Sets `metadata.product_id`; `None` omits the metadata object.
    #[must_use]
    pub fn product(mut self, product: Option<&str>) -> Self {
        self.product_id = product.map(str::to_string);
        self
    }

    /// Sets the payment intent id.
    #[must_use]
    pub fn payment_intent(mut self, id: impl Into<String>) -> Self {
        self.payment_intent = Some(id.into());
        self
    }

    /// Sets `amount_total` in minor units.
    #[must_use]
    pub fn amount(mut self, amount: i64) -> Self {
        self.amount_total = Some(amount);
        self
    }

    /// Sets the currency code.
    #[must_use]
    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Builds the event as JSON.
    pub fn build(&self) -> Value {
        let mut object = serde_json::Map::new();
        object.insert("id".into(), json!("cs_test_1"));
        object.insert("object".into(), json!("checkout.session"));
        if let Some(user) = &self.user_id {
            object.insert("client_reference_id".into(), json!(user));
        }
        if let Some(product) = &self.product_id {
            object.insert("metadata".into(), json!({ "product_id": product }));
        }
        if let Some(pi) = &self.payment_intent {
            object.insert("payment_intent".into(), json!(pi));
        }
        if let Some(amount) = self.amount_total {
            object.insert("amount_total".into(), json!(amount));
        }
        if let Some(currency) = &self.currency {
            object.insert("currency".into(), json!(currency));
        }

        json!({
            "id": self.event_id,
            "object": "event",
            "type": self.event_type,
            "data": { "object": Value::Object(object) },
        })
    }

    /// Builds the serialized request body.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.build().to_string())
    }
}

struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

/// Builder for `multipart/form-data` request bodies.
pub struct MultipartBuilder {
    boundary: String,
    parts: Vec<Part>,
}

impl MultipartBuilder {
    /// Creates an empty body with the given boundary.
    pub fn new(boundary: impl Into<String>) -> Self {
        Self { boundary: boundary.into(), parts: Vec::new() }
    }

    /// Adds a file part named `file`.
    #[must_use]
    pub fn file(self, filename: &str, body: impl Into<Vec<u8>>) -> Self {
        self.file_part("file", filename, "application/octet-stream", body)
    }

    /// Adds a file part with explicit field name and content type.
    #[must_use]
    pub fn file_part(
        mut self,
        name: &str,
        filename: &str,
        content_type: &str,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        self.parts.push(Part {
            name: name.to_string(),
            filename: Some(filename.to_string()),
            content_type: Some(content_type.to_string()),
            body: body.into(),
        });
        self
    }

    /// Adds a plain form field.
    #[must_use]
    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.parts.push(Part {
            name: name.to_string(),
            filename: None,
            content_type: None,
            body: value.as_bytes().to_vec(),
        });
        self
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Serializes the body, including the closing delimiter.
    pub fn build(&self) -> Bytes {
        let mut body = Vec::new();
        for part in &self.parts {
            body.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
            if let Some(filename) = &part.filename {
                disposition.push_str(&format!("; filename=\"{filename}\""));
            }
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"\r\n");
            if let Some(content_type) = &part.content_type {
                body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(&part.body);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        Bytes::from(body)
    }
}

/// Produces a `Stripe-Signature` header value for `payload`.
///
/// Computed independently of the service so tests check the scheme rather
/// than the implementation against itself.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|e| panic!("HMAC accepts any key length: {e}"));
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}
