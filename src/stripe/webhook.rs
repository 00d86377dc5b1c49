//! Verification and decoding of Stripe webhook deliveries.
//!
//! Stripe signs `"<timestamp>.<raw body>"` with HMAC-SHA256 and sends the
//! result in the `Stripe-Signature` header as `t=<timestamp>,v1=<hex>`.
//! Several `v1` entries may be present while a secret is being rolled.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;
pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("{0}")]
    InvalidSignature(String),

    #[error("{0}")]
    InvalidPayload(String),
}

/// Event envelope. `data.object` stays untyped until the event kind is known.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    CheckoutSessionCompleted,
    Other(String),
}

impl StripeEvent {
    pub fn kind(&self) -> EventKind {
        match self.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => EventKind::CheckoutSessionCompleted,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn checkout_session(&self) -> Result<CheckoutSessionObject, WebhookError> {
        serde_json::from_value(self.data.object.clone()).map_err(|e| {
            WebhookError::InvalidPayload(format!("invalid checkout session object: {}", e))
        })
    }
}

/// The fields of a Checkout Session the fulfillment path reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
}

impl CheckoutSessionObject {
    /// Invoice reference from metadata, falling back to the client reference id.
    pub fn invoice_reference(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("invoice_id"))
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                self.client_reference_id
                    .as_deref()
                    .filter(|v| !v.trim().is_empty())
            })
    }
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            tolerance,
        }
    }

    pub fn is_enforcing(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> Result<StripeEvent, WebhookError> {
        self.verify_at(payload, signature, chrono::Utc::now().timestamp())
    }

    /// Same as [`verify`](Self::verify) with an explicit clock.
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> Result<StripeEvent, WebhookError> {
        match &self.secret {
            Some(secret) => {
                let header = signature.ok_or_else(|| {
                    WebhookError::InvalidSignature(format!("missing {} header", SIGNATURE_HEADER))
                })?;
                verify_signature(secret, payload, header, now, self.tolerance)?;
            }
            None => {
                tracing::warn!("webhook secret not configured; accepting unverified event");
            }
        }

        serde_json::from_slice(payload)
            .map_err(|e| WebhookError::InvalidPayload(format!("invalid event payload: {}", e)))
    }
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<Vec<u8>>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(value)) => {
                timestamp = value.parse::<i64>().ok();
            }
            (Some("v1"), Some(value)) => {
                // Undecodable entries can never match; skip them.
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        WebhookError::InvalidSignature("unable to extract timestamp from signature header".into())
    })?;
    if signatures.is_empty() {
        return Err(WebhookError::InvalidSignature(
            "no v1 signatures found in signature header".into(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
    tolerance: Duration,
) -> Result<(), WebhookError> {
    let header = parse_header(header)?;

    let mac = signed_payload_mac(secret, header.timestamp, payload)?;

    // verify_slice compares in constant time.
    let matched = header
        .signatures
        .iter()
        .any(|candidate| mac.clone().verify_slice(candidate).is_ok());
    if !matched {
        return Err(WebhookError::InvalidSignature(
            "no signatures found matching the expected signature for payload".into(),
        ));
    }

    if (now - header.timestamp).unsigned_abs() > tolerance.as_secs() {
        return Err(WebhookError::InvalidSignature(
            "timestamp outside the tolerance zone".into(),
        ));
    }

    Ok(())
}

fn signed_payload_mac(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<HmacSha256, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature("unusable webhook secret".into()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Hex HMAC-SHA256 of `"<timestamp>.<payload>"`, as Stripe computes it.
pub fn compute_signature(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<String, WebhookError> {
    let mac = signed_payload_mac(secret, timestamp, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Builds a complete `Stripe-Signature` header value for `payload`.
pub fn signature_header(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> Result<String, WebhookError> {
    Ok(format!(
        "t={},v1={}",
        timestamp,
        compute_signature(secret, timestamp, payload)?
    ))
}
