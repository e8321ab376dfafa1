#![no_main]

//! Fuzz target for webhook event parsing and record construction.

use chrono::Utc;
use libfuzzer_sys::fuzz_target;
use serpent_core::{PurchaseRecord, StripeEvent};

fuzz_target!(|data: &[u8]| {
    let Ok(event) = StripeEvent::parse(data) else { return };
    if !event.is_checkout_completed() {
        return;
    }
    let Ok(session) = event.checkout_session() else { return };
    if let Ok(record) = PurchaseRecord::from_checkout(&session, Utc::now()) {
        assert!(record.assignment_id.as_str().starts_with("assign_"));
        assert!(record.price_paid >= 0.0);
    }
});
