//! Property-based tests for purchase records and multipart scanning.
//!
//! Verifies that assignment ids depend only on the payment id, that amounts
//! convert exactly, and that the scanner's output does not depend on how the
//! body is chunked.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serpent_core::{
    models::minor_to_major, AssignmentId, CheckoutSession, MultipartScanner, PurchaseRecord,
    ScanEvent,
};
use sha2::{Digest, Sha256};

fn reference_assignment_id(payment_id: &str) -> String {
    let digest = Sha256::digest(payment_id.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("assign_{}", &hex[..8])
}

fn multipart_body(boundary: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"file\"; filename=\"p.bin\"\r\n");
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

/// Runs the scanner over `body` split at `cuts`, merging adjacent data events.
fn scan_chunked(boundary: &str, body: &[u8], cuts: &[usize]) -> Vec<ScanEvent> {
    let mut scanner = MultipartScanner::new(boundary);
    let mut events: Vec<ScanEvent> = Vec::new();
    let mut start = 0;

    let mut bounds: Vec<usize> = cuts.iter().map(|c| c % (body.len() + 1)).collect();
    bounds.sort_unstable();
    bounds.push(body.len());

    for end in bounds {
        if end < start {
            continue;
        }
        scanner.push(&body[start..end]);
        start = end;
        while let Some(event) = scanner.next_event().expect("well-formed body") {
            if let ScanEvent::Data(next) = &event {
                if let Some(ScanEvent::Data(prev)) = events.last_mut() {
                    let mut merged = prev.to_vec();
                    merged.extend_from_slice(next);
                    *prev = merged.into();
                    continue;
                }
            }
            events.push(event);
        }
    }
    scanner.finish().expect("closing delimiter present");
    events
}

proptest! {
    #[test]
    fn assignment_id_is_truncated_sha256(payment_id in ".{0,64}") {
        let id = AssignmentId::from_payment_id(&payment_id);
        prop_assert_eq!(id.as_str(), reference_assignment_id(&payment_id));
        prop_assert_eq!(id, AssignmentId::from_payment_id(&payment_id));
    }

    #[test]
    fn record_depends_only_on_payment_for_assignment(
        payment_id in "pi_[A-Za-z0-9]{8,24}",
        user in proptest::option::of("[a-z_0-9]{1,12}"),
        amount in 0i64..=10_000_000,
    ) {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap();
        let session = CheckoutSession {
            client_reference_id: user,
            payment_intent: Some(payment_id.clone()),
            amount_total: Some(amount),
            ..Default::default()
        };

        let record = PurchaseRecord::from_checkout(&session, at).unwrap();

        prop_assert_eq!(record.assignment_id, AssignmentId::from_payment_id(&payment_id));
    }

    #[test]
    fn price_is_amount_over_one_hundred(amount in 0i64..=10_000_000) {
        let major = minor_to_major(amount);
        // Both the division and decimal parsing round correctly to the same f64.
        let expected = format!("{}.{:02}", amount / 100, amount % 100);
        prop_assert_eq!(major, expected.parse::<f64>().unwrap());
    }

    #[test]
    fn scanner_output_independent_of_chunking(
        payload in proptest::collection::vec(any::<u8>(), 0..2048),
        cuts in proptest::collection::vec(any::<usize>(), 0..12),
    ) {
        let boundary = "----WebKitFormBoundary7MA4YWxkTrZu0gW";
        let body = multipart_body(boundary, &payload);

        let whole = scan_chunked(boundary, &body, &[]);
        let chunked = scan_chunked(boundary, &body, &cuts);

        prop_assert_eq!(&whole, &chunked);
        let data: Vec<u8> = whole
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Data(bytes) => Some(bytes.to_vec()),
                _ => None,
            })
            .flatten()
            .collect();
        prop_assert_eq!(data, payload);
    }
}
