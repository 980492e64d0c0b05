//! Payment-related types for the rental booking engine
//!
//! This module defines the local mirror of processor payment intents, saved
//! payment methods, and the response shapes produced by the payment
//! operations.

use super::account::AccountId;
use super::booking::{BookingId, BookingStatus, BookingSummary};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a payment intent, as reported by the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl IntentStatus {
    /// Terminal intents are never reused and never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentStatus::Succeeded | IntentStatus::Failed | IntentStatus::Canceled
        )
    }

    /// Whether the processor still expects a confirmation call for this intent
    pub fn awaits_confirmation(&self) -> bool {
        matches!(
            self,
            IntentStatus::RequiresPaymentMethod | IntentStatus::RequiresConfirmation
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::RequiresConfirmation => "requires_confirmation",
            IntentStatus::RequiresAction => "requires_action",
            IntentStatus::Processing => "processing",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Failed => "failed",
            IntentStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque, single-use token that lets the payer's client complete authorization
///
/// `Debug` is redacted so the secret cannot leak through structured logs.
/// Serialization exposes it because it has to reach the client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientSecret(String);

impl ClientSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientSecret(***)")
    }
}

/// Local mirror of a processor payment intent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentIntent {
    pub booking_id: BookingId,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub currency: String,
    /// Processor-assigned identifier (`pi_...`)
    pub processor_id: String,
    pub client_secret: ClientSecret,
    pub status: IntentStatus,
    /// Opened for a dormant account through the guest path
    pub is_guest: bool,
    pub payment_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payment receipt identifier
pub type PaymentId = u64;

/// Receipt of a captured payment
///
/// Written in the same ledger update that marks the booking paid, so each
/// succeeded intent produces exactly one receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    pub id: PaymentId,
    pub booking_id: BookingId,
    /// Account the paid intent was opened for
    pub account_id: AccountId,
    pub processor_intent_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer_id: Option<String>,
    pub payment_method: Option<String>,
    /// Where the processor sends the receipt; the booking's guest email on guest payments
    pub receipt_email: Option<String>,
    pub is_guest: bool,
    pub completed_at: DateTime<Utc>,
}

/// Saved card reference for an authenticated account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentMethod {
    pub account_id: AccountId,
    /// Processor token (`pm_...`), unique per account
    pub processor_token: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Full payment intent response: the entity plus a nested booking summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentDetails {
    pub booking: BookingSummary,
    pub amount: Decimal,
    pub currency: String,
    pub status: IntentStatus,
    pub processor_intent_id: String,
    pub client_secret: ClientSecret,
    pub is_guest: bool,
    pub created_at: DateTime<Utc>,
}

/// Minimal payment intent response for lightweight checkout pages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuickIntent {
    pub client_secret: ClientSecret,
    pub amount: Decimal,
    pub id: String,
}

impl From<IntentDetails> for QuickIntent {
    fn from(details: IntentDetails) -> Self {
        QuickIntent {
            client_secret: details.client_secret,
            amount: details.amount,
            id: details.processor_intent_id,
        }
    }
}

/// Which trigger invoked the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerKind {
    /// Asynchronous processor notification, already signature-checked
    Webhook,
    /// Client confirmation on the guest path
    GuestExplicit,
    /// Client confirmation on the authenticated path
    AuthenticatedExplicit,
}

/// Result of one reconciliation attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub booking_id: BookingId,
    pub processor_intent_id: String,
    pub intent_status: IntentStatus,
    pub booking_status: BookingStatus,
    /// This call changed local state
    pub transitioned: bool,
    /// The intent had already been reconciled to this state; nothing changed
    pub already_reconciled: bool,
    /// Receipt of the payment once the booking is paid
    pub payment_id: Option<PaymentId>,
}

/// Best-effort payment method save reported next to a confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PaymentMethodSave {
    NotRequested,
    Skipped { reason: String },
    Saved { method: PaymentMethod },
    Failed { message: String },
}

/// Response of the confirm operations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmationReport {
    pub intent: IntentDetails,
    pub outcome: ReconcileOutcome,
    /// The processor wants further customer action (3-D Secure and similar)
    pub requires_action: bool,
    pub payment_method: PaymentMethodSave,
}

/// Confirm request body shared by both confirm paths
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfirmRequest {
    pub payment_intent_id: String,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub save_payment_method: bool,
}

/// What a verified webhook caused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WebhookAction {
    Reconciled { outcome: ReconcileOutcome },
    PaymentMethodSaved { method: PaymentMethod },
    PaymentMethodRemoved { token: String },
    Ignored { reason: String },
}

/// Acknowledgement returned to the processor for a webhook delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    pub event_id: String,
    pub event_type: String,
    #[serde(flatten)]
    pub action: WebhookAction,
}

/// Publishable key response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicKey {
    pub publishable_key: String,
}
