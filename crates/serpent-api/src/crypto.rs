//! Webhook signature verification.
//!
//! The provider signs `"{timestamp}.{raw body}"` with HMAC-SHA256 keyed by
//! the endpoint secret and sends the result in a `Stripe-Signature` header
//! of the form `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`. Other schemes
//! (`v0=`) are ignored. More than one `v1` appears while a secret is being
//! rolled.

use std::{fmt, sync::Arc, time::Duration};

use hmac::{Hmac, Mac};
use serpent_core::Clock;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Default accepted distance between the signed timestamp and now.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Signature validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Missing signature header.
    MissingSignature,
    /// Invalid signature format.
    InvalidFormat(String),
    /// Signed timestamp is too far from the current time.
    TimestampOutsideTolerance {
        /// Timestamp from the header
        timestamp: i64,
        /// Current time in Unix seconds
        now: i64,
    },
    /// Signature verification failed.
    VerificationFailed,
    /// Invalid secret key.
    InvalidSecret,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSignature => write!(f, "signature header missing"),
            Self::InvalidFormat(format) => write!(f, "invalid signature format: {format}"),
            Self::TimestampOutsideTolerance { timestamp, now } => {
                write!(f, "signature timestamp {timestamp} outside tolerance (now {now})")
            },
            Self::VerificationFailed => write!(f, "signature verification failed"),
            Self::InvalidSecret => write!(f, "invalid secret key"),
        }
    }
}

impl std::error::Error for SignatureError {}

/// Parsed `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Signing time in Unix seconds.
    pub timestamp: i64,
    /// Every `v1` signature, hex encoded.
    pub signatures: Vec<String>,
}

/// Parses a signature header.
///
/// # Errors
///
/// Returns `SignatureError::InvalidFormat` if the timestamp is missing or
/// not an integer, or if no `v1` signature is present.
pub fn parse_signature_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for item in header.split(',') {
        let Some((key, value)) = item.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                let parsed = value.parse::<i64>().map_err(|_| {
                    SignatureError::InvalidFormat(format!("timestamp is not an integer: {value}"))
                })?;
                timestamp = Some(parsed);
            },
            "v1" => signatures.push(value.to_string()),
            _ => {},
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| SignatureError::InvalidFormat("missing timestamp 't='".to_string()))?;
    if signatures.is_empty() {
        return Err(SignatureError::InvalidFormat("no 'v1=' signature present".to_string()));
    }

    Ok(SignatureHeader { timestamp, signatures })
}

/// Computes the hex `v1` signature of `payload` signed at `timestamp`.
///
/// # Errors
///
/// Returns `SignatureError::InvalidSecret` if the secret key is invalid.
pub fn compute_signature(
    payload: &[u8],
    timestamp: i64,
    secret: &str,
) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;

    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies signed webhooks against a shared secret and the injected clock.
pub struct SignatureVerifier {
    secret: String,
    tolerance: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"***")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    /// Creates a verifier.
    pub fn new(secret: impl Into<String>, tolerance: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { secret: secret.into(), tolerance, clock }
    }

    /// Checks the signature header of a raw webhook body.
    ///
    /// # Errors
    ///
    /// Returns `MissingSignature` if `header` is absent or empty,
    /// `InvalidFormat` if it cannot be parsed, `TimestampOutsideTolerance`
    /// for stale or future timestamps, and `VerificationFailed` if no `v1`
    /// signature matches.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        if self.secret.is_empty() {
            return Err(SignatureError::InvalidSecret);
        }

        let header =
            header.filter(|h| !h.trim().is_empty()).ok_or(SignatureError::MissingSignature)?;
        let parsed = parse_signature_header(header)?;

        let now = self.clock.unix_seconds();
        if now.abs_diff(parsed.timestamp) > self.tolerance.as_secs() {
            return Err(SignatureError::TimestampOutsideTolerance {
                timestamp: parsed.timestamp,
                now,
            });
        }

        let expected = compute_signature(payload, parsed.timestamp, &self.secret)?;
        if parsed.signatures.iter().any(|candidate| timing_safe_eq(candidate, &expected)) {
            Ok(())
        } else {
            Err(SignatureError::VerificationFailed)
        }
    }
}

/// Timing-safe string comparison to prevent timing attacks.
///
/// Uses constant-time comparison to avoid leaking information
/// about the expected signature through timing analysis.
fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.bytes().zip(b.bytes()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use serpent_core::TestClock;

    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn verifier() -> (SignatureVerifier, TestClock) {
        let clock = TestClock::with_start_time(UNIX_EPOCH + Duration::from_secs(NOW as u64));
        let verifier = SignatureVerifier::new(SECRET, DEFAULT_TOLERANCE, Arc::new(clock.clone()));
        (verifier, clock)
    }

    fn header_for(payload: &[u8], timestamp: i64) -> String {
        let sig = compute_signature(payload, timestamp, SECRET).unwrap();
        format!("t={timestamp},v1={sig}")
    }

    #[test]
    fn parses_header_with_multiple_schemes() {
        let parsed = parse_signature_header("t=12,v1=aa,v0=bb,v1=cc").unwrap();
        assert_eq!(parsed.timestamp, 12);
        assert_eq!(parsed.signatures, vec!["aa", "cc"]);
    }

    #[test]
    fn header_without_timestamp_or_v1_is_invalid() {
        assert!(matches!(parse_signature_header("v1=aa"), Err(SignatureError::InvalidFormat(_))));
        assert!(matches!(parse_signature_header("t=1,v0=aa"), Err(SignatureError::InvalidFormat(_))));
        assert!(matches!(parse_signature_header("t=soon,v1=aa"), Err(SignatureError::InvalidFormat(_))));
    }

    #[test]
    fn accepts_valid_signature() {
        let (verifier, _) = verifier();
        let payload = br#"{"type":"checkout.session.completed"}"#;

        assert_eq!(verifier.verify(payload, Some(&header_for(payload, NOW))), Ok(()));
    }

    #[test]
    fn accepts_any_matching_v1_during_rotation() {
        let (verifier, _) = verifier();
        let payload = b"{}";
        let good = compute_signature(payload, NOW, SECRET).unwrap();
        let header = format!("t={NOW},v1={},v1={good}", "0".repeat(64));

        assert_eq!(verifier.verify(payload, Some(&header)), Ok(()));
    }

    #[test]
    fn rejects_tampered_payload() {
        let (verifier, _) = verifier();
        let header = header_for(b"{\"amount_total\":100}", NOW);

        assert_eq!(
            verifier.verify(b"{\"amount_total\":1}", Some(&header)),
            Err(SignatureError::VerificationFailed)
        );
    }

    #[test]
    fn rejects_stale_and_future_timestamps() {
        let (verifier, clock) = verifier();
        let payload = b"{}";
        let header = header_for(payload, NOW);

        clock.advance(Duration::from_secs(301));
        assert!(matches!(
            verifier.verify(payload, Some(&header)),
            Err(SignatureError::TimestampOutsideTolerance { .. })
        ));

        clock.jump_to(SystemTime::UNIX_EPOCH + Duration::from_secs((NOW - 301) as u64));
        assert!(matches!(
            verifier.verify(payload, Some(&header)),
            Err(SignatureError::TimestampOutsideTolerance { .. })
        ));
    }

    #[test]
    fn boundary_of_tolerance_is_accepted() {
        let (verifier, clock) = verifier();
        let payload = b"{}";
        let header = header_for(payload, NOW);

        clock.advance(Duration::from_secs(300));
        assert_eq!(verifier.verify(payload, Some(&header)), Ok(()));
    }

    #[test]
    fn missing_header_rejected() {
        let (verifier, _) = verifier();
        assert_eq!(verifier.verify(b"{}", None), Err(SignatureError::MissingSignature));
        assert_eq!(verifier.verify(b"{}", Some("  ")), Err(SignatureError::MissingSignature));
    }

    #[test]
    fn debug_hides_secret() {
        let (verifier, _) = verifier();
        assert!(!format!("{verifier:?}").contains(SECRET));
    }

    #[test]
    fn timing_safe_eq_cases() {
        assert!(timing_safe_eq("hello", "hello"));
        assert!(!timing_safe_eq("hello", "world"));
        assert!(!timing_safe_eq("hello", "hello_world"));
    }

    #[test]
    fn signature_is_hex_sha256() {
        let sig = compute_signature(b"payload", 1, "secret").unwrap();
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(sig, compute_signature(b"payload", 1, "secret").unwrap());
    }
}
