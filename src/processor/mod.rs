//! Payment processor contract
//!
//! The booking core never talks to a concrete payment service. It goes through
//! the object-safe [`PaymentProcessor`] trait, which mirrors the subset of a
//! card processor's API the workflow needs: customers, payment intents
//! (create, confirm, cancel), and payment method attachment.
//!
//! - `mock` - In-memory processor used by the replay tool and tests
//! - `webhook` - Signature verification and event parsing for processor notifications

use crate::types::{ClientSecret, IntentStatus};
use futures::future::BoxFuture;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;

pub mod mock;
pub mod webhook;

pub use mock::MockProcessor;
pub use webhook::{ProcessorEvent, WebhookEvent, WebhookVerifier};

/// Processor call result
pub type ProcessorResult<T> = Result<T, ProcessorError>;

/// Failure reported by the payment processor client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    #[error("card declined: {reason}")]
    CardDeclined { reason: String },

    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("no such {object}: {id}")]
    NotFound { object: &'static str, id: String },

    #[error("processor request timed out")]
    Timeout,

    #[error("processor unavailable: {message}")]
    Unavailable { message: String },
}

/// Parameters for creating a processor-side customer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerParams {
    pub email: String,
    pub name: String,
    pub metadata: BTreeMap<String, String>,
}

/// Parameters for creating a payment intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIntentParams {
    /// Amount in the currency's minor unit (cents)
    pub amount_minor: i64,
    pub currency: String,
    pub customer: String,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
    /// Repeated requests with the same key return the original intent
    pub idempotency_key: String,
    pub setup_future_usage: Option<String>,
}

/// Payment intent as reported by the processor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorIntent {
    pub id: String,
    pub client_secret: ClientSecret,
    pub status: IntentStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub customer: Option<String>,
    pub payment_method: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Display-only card details of a payment method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDetails {
    pub token: String,
    pub customer: Option<String>,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
}

/// Client contract for the external payment processor
///
/// Implementations must be safe to share across tasks. Timeouts and retries
/// are the caller's concern; every method reports failures as
/// [`ProcessorError`] without retrying.
pub trait PaymentProcessor: Send + Sync {
    /// Create a customer and return its processor id
    fn create_customer(&self, params: CustomerParams) -> BoxFuture<'_, ProcessorResult<String>>;

    /// Create a payment intent, honouring the idempotency key
    fn create_intent(
        &self,
        params: CreateIntentParams,
    ) -> BoxFuture<'_, ProcessorResult<ProcessorIntent>>;

    /// Fetch the current processor view of an intent
    fn retrieve_intent<'a>(&'a self, id: &'a str)
        -> BoxFuture<'a, ProcessorResult<ProcessorIntent>>;

    /// Ask the processor to confirm an intent, optionally with a payment method
    fn confirm_intent<'a>(
        &'a self,
        id: &'a str,
        payment_method: Option<&'a str>,
    ) -> BoxFuture<'a, ProcessorResult<ProcessorIntent>>;

    /// Cancel an intent so its client secret can no longer capture funds
    ///
    /// Fails for an intent that already succeeded.
    fn cancel_intent<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProcessorResult<ProcessorIntent>>;

    /// Attach a payment method to a customer and return its card details
    fn attach_payment_method<'a>(
        &'a self,
        token: &'a str,
        customer: &'a str,
    ) -> BoxFuture<'a, ProcessorResult<CardDetails>>;

    /// Fetch the display details of a payment method
    fn retrieve_payment_method<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, ProcessorResult<CardDetails>>;

    /// Detach a payment method from whichever customer holds it
    fn detach_payment_method<'a>(&'a self, token: &'a str) -> BoxFuture<'a, ProcessorResult<()>>;
}

/// Convert a decimal amount into minor units (2-decimal currencies)
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|cents| cents.round())
        .and_then(|cents| cents.to_i64())
}
