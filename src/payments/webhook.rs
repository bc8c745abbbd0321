//! Webhook authentication and event decoding.
//!
//! Signature header format: `t=<unix seconds>,v1=<hex hmac>[,v1=...]`, where
//! each `v1` is HMAC-SHA256 keyed with the endpoint secret over
//! `"<t>.<raw body>"`.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header has no timestamp")]
    MissingTimestamp,
    #[error("signature header has no v1 signature")]
    MissingSignature,
    #[error("signature timestamp outside the tolerance window")]
    Stale,
    #[error("no signature matches the payload")]
    Mismatch,
    #[error("webhook secret unusable as an HMAC key")]
    InvalidKey,
    #[error("payload is not a valid event: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// The `data.object` of a checkout completion event.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletedSession {
    pub id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl WebhookEvent {
    pub fn completed_session(&self) -> Result<CompletedSession, serde_json::Error> {
        serde_json::from_value(self.data.object.clone())
    }
}

struct SignatureHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<SignatureHeader<'_>, SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) if !value.is_empty() => signatures.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }
    Ok(SignatureHeader { timestamp, signatures })
}

fn mac_for(payload: &[u8], secret: &str, timestamp: i64) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Authenticates `payload` against `header` and decodes the event.
///
/// The payload must be the exact bytes received; any re-serialization breaks
/// the signature.
pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: DateTime<Utc>,
) -> Result<WebhookEvent, SignatureError> {
    let header = parse_header(header)?;
    if (now.timestamp() - header.timestamp).abs() > tolerance.num_seconds() {
        return Err(SignatureError::Stale);
    }
    let mac = mac_for(payload, secret, header.timestamp)?;
    let matched = header
        .signatures
        .iter()
        .filter_map(|sig| hex::decode(sig).ok())
        .any(|sig| mac.clone().verify_slice(&sig).is_ok());
    if !matched {
        return Err(SignatureError::Mismatch);
    }
    Ok(serde_json::from_slice(payload)?)
}

/// Builds a signature header for `payload`, as the gateway would.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let digest = mac_for(payload, secret, timestamp)?.finalize().into_bytes();
    Ok(format!("t={timestamp},v1={}", hex::encode(digest)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_1","metadata":{"user_id":"x"}}}}"#;

    fn tolerance() -> Duration { Duration::seconds(300) }

    #[test]
    fn valid_signature_decodes_event() {
        let now = Utc::now();
        let header = sign(PAYLOAD, SECRET, now.timestamp()).unwrap();
        let event = verify(PAYLOAD, &header, SECRET, tolerance(), now).unwrap();
        assert_eq!(event.id, "evt_1");
        assert_eq!(event.kind, CHECKOUT_COMPLETED);
        let session = event.completed_session().unwrap();
        assert_eq!(session.id, "cs_1");
        assert_eq!(session.metadata.get("user_id").map(String::as_str), Some("x"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = Utc::now();
        let header = sign(PAYLOAD, "wrong_secret", now.timestamp()).unwrap();
        assert!(matches!(verify(PAYLOAD, &header, SECRET, tolerance(), now), Err(SignatureError::Mismatch)));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let now = Utc::now();
        let header = sign(PAYLOAD, SECRET, now.timestamp()).unwrap();
        let tampered = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"id":"cs_2"}}}"#;
        assert!(matches!(verify(tampered, &header, SECRET, tolerance(), now), Err(SignatureError::Mismatch)));
    }

    #[test]
    fn old_timestamp_is_rejected() {
        let now = Utc::now();
        let header = sign(PAYLOAD, SECRET, now.timestamp() - 600).unwrap();
        assert!(matches!(verify(PAYLOAD, &header, SECRET, tolerance(), now), Err(SignatureError::Stale)));
    }

    #[test]
    fn any_matching_v1_is_accepted() {
        let now = Utc::now();
        let good = sign(PAYLOAD, SECRET, now.timestamp()).unwrap();
        let good_sig = good.split_once("v1=").map(|(_, s)| s).unwrap();
        let header = format!("t={},v1=deadbeef,v1={good_sig}", now.timestamp());
        assert!(verify(PAYLOAD, &header, SECRET, tolerance(), now).is_ok());
    }

    #[test]
    fn malformed_headers() {
        let now = Utc::now();
        assert!(matches!(verify(PAYLOAD, "v1=abc", SECRET, tolerance(), now), Err(SignatureError::MissingTimestamp)));
        assert!(matches!(verify(PAYLOAD, "t=1234567890", SECRET, tolerance(), now), Err(SignatureError::MissingSignature)));
        assert!(matches!(verify(PAYLOAD, "garbage", SECRET, tolerance(), now), Err(SignatureError::MissingTimestamp)));
        assert!(matches!(verify(PAYLOAD, "", SECRET, tolerance(), now), Err(SignatureError::MissingTimestamp)));
    }
}
