//! Processor webhook verification and parsing
//!
//! Notifications arrive as a JSON body plus a signature header of the form
//! `t=<unix seconds>,v1=<hex hmac>`. The HMAC-SHA256 is computed over
//! `"<t>.<body>"` with the endpoint secret. Verification happens before the
//! body is parsed; nothing in an unverified payload is trusted.

use super::CardDetails;
use crate::types::BookingError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default accepted clock skew between the processor and us, in seconds
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Checks webhook signatures against the shared endpoint secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"***")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Verify `header` for `payload`
    ///
    /// Every failure (missing parts, stale timestamp, bad signature) is
    /// reported as an authorization error with a generic message.
    pub fn verify(
        &self,
        payload: &[u8],
        header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), BookingError> {
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<Vec<u8>> = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => {
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(invalid_signature)?;
        if now.timestamp().abs_diff(timestamp) > self.tolerance_secs {
            tracing::warn!(timestamp, "webhook timestamp outside tolerance");
            return Err(invalid_signature());
        }

        let matched = signatures.iter().any(|signature| {
            self.mac(timestamp, payload)
                .map(|mac| mac.verify_slice(signature).is_ok())
                .unwrap_or(false)
        });
        if matched {
            Ok(())
        } else {
            Err(invalid_signature())
        }
    }

    /// Build the signature header the processor would send for `payload`
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, BookingError> {
        let mac = self.mac(timestamp, payload)?;
        Ok(format!(
            "t={},v1={}",
            timestamp,
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, BookingError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| BookingError::authorization("Webhook secret is not usable"))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

fn invalid_signature() -> BookingError {
    BookingError::authorization("Invalid webhook signature")
}

/// Envelope of a processor notification
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct IntentObject {
    id: String,
    #[serde(default)]
    payment_method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodObject {
    id: String,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    card: Option<CardObject>,
}

#[derive(Debug, Default, Deserialize)]
struct CardObject {
    brand: Option<String>,
    last4: Option<String>,
    exp_month: Option<u32>,
    exp_year: Option<u32>,
}

/// Notification reduced to what the booking workflow reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEvent {
    IntentSucceeded {
        intent_id: String,
        payment_method: Option<String>,
    },
    IntentFailed { intent_id: String },
    IntentCanceled { intent_id: String },
    MethodAttached { card: CardDetails },
    MethodDetached { token: String },
    Other { event_type: String },
}

impl WebhookEvent {
    /// Parse a verified notification body
    ///
    /// A malformed body is reported as `Validation`.
    pub fn parse(payload: &[u8]) -> Result<Self, BookingError> {
        serde_json::from_slice(payload).map_err(malformed)
    }

    pub fn classify(&self) -> Result<ProcessorEvent, BookingError> {
        let event = match self.event_type.as_str() {
            "payment_intent.succeeded" => {
                let intent = self.intent()?;
                ProcessorEvent::IntentSucceeded {
                    intent_id: intent.id,
                    payment_method: intent.payment_method,
                }
            }
            "payment_intent.payment_failed" => ProcessorEvent::IntentFailed {
                intent_id: self.intent()?.id,
            },
            "payment_intent.canceled" => ProcessorEvent::IntentCanceled {
                intent_id: self.intent()?.id,
            },
            "payment_method.attached" => {
                let method = self.payment_method()?;
                let card = method.card.unwrap_or_default();
                ProcessorEvent::MethodAttached {
                    card: CardDetails {
                        token: method.id,
                        customer: method.customer,
                        brand: card.brand,
                        last4: card.last4,
                        exp_month: card.exp_month,
                        exp_year: card.exp_year,
                    },
                }
            }
            "payment_method.detached" => ProcessorEvent::MethodDetached {
                token: self.payment_method()?.id,
            },
            other => ProcessorEvent::Other {
                event_type: other.to_string(),
            },
        };
        Ok(event)
    }

    fn intent(&self) -> Result<IntentObject, BookingError> {
        serde_json::from_value(self.data.object.clone()).map_err(malformed)
    }

    fn payment_method(&self) -> Result<PaymentMethodObject, BookingError> {
        serde_json::from_value(self.data.object.clone()).map_err(malformed)
    }
}

fn malformed(error: serde_json::Error) -> BookingError {
    BookingError::validation(format!("Malformed webhook payload: {}", error))
}

/// Serialized `payment_intent.*` notification, as the processor would send it
pub fn intent_event_payload(event_type: &str, intent_id: &str) -> Vec<u8> {
    serde_json::json!({
        "id": format!("evt_{}", uuid::Uuid::new_v4().simple()),
        "type": event_type,
        "data": { "object": { "id": intent_id, "object": "payment_intent" } }
    })
    .to_string()
    .into_bytes()
}
