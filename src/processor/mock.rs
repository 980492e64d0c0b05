//! In-memory payment processor
//!
//! `MockProcessor` behaves like a card processor sandbox: it issues `cus_`,
//! `pi_` and client-secret identifiers, honours idempotency keys, and lets
//! the caller drive the payer side of the flow (completing or declining a
//! payment) the way a browser-side SDK would.
//!
//! # Thread Safety
//!
//! State lives in `DashMap`s, so the mock can be shared behind an `Arc`
//! across concurrent tasks exactly like a real HTTP client.

use super::{
    CardDetails, CreateIntentParams, CustomerParams, PaymentProcessor, ProcessorError,
    ProcessorIntent, ProcessorResult,
};
use crate::types::{ClientSecret, IntentStatus};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Token prefix that makes the mock decline a card on confirmation
pub const DECLINED_TOKEN_PREFIX: &str = "pm_card_declined";

/// In-memory processor for development, replay and tests
#[derive(Debug, Default)]
pub struct MockProcessor {
    intents: DashMap<String, ProcessorIntent>,
    /// Idempotency key → intent id
    idempotency: DashMap<String, String>,
    customers: DashMap<String, CustomerParams>,
    /// Payment method token → customer it is attached to
    attachments: DashMap<String, String>,
    /// Error returned by the next call, whatever it is
    next_failure: Mutex<Option<ProcessorError>>,
    create_intent_calls: AtomicUsize,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next processor call fail with `error`
    pub fn fail_next(&self, error: ProcessorError) {
        if let Ok(mut slot) = self.next_failure.lock() {
            *slot = Some(error);
        }
    }

    /// Payer completed authorization client-side; the intent succeeds
    pub fn complete_payment(&self, id: &str, payment_method: &str) -> ProcessorResult<()> {
        self.set_status(id, IntentStatus::Succeeded, Some(payment_method))
    }

    /// Payer's card was declined client-side
    pub fn decline_payment(&self, id: &str) -> ProcessorResult<()> {
        self.set_status(id, IntentStatus::Failed, None)
    }

    /// Processor view of an intent
    pub fn intent(&self, id: &str) -> Option<ProcessorIntent> {
        self.intents.get(id).map(|entry| entry.value().clone())
    }

    /// Number of `create_intent` calls that reached the processor
    pub fn create_intent_calls(&self) -> usize {
        self.create_intent_calls.load(Ordering::SeqCst)
    }

    pub fn customer_count(&self) -> usize {
        self.customers.len()
    }

    fn take_failure(&self) -> ProcessorResult<()> {
        let failure = self
            .next_failure
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Payer-side status change; terminal intents never change again
    fn set_status(
        &self,
        id: &str,
        status: IntentStatus,
        payment_method: Option<&str>,
    ) -> ProcessorResult<()> {
        let mut entry = self.intents.get_mut(id).ok_or_else(|| no_such_intent(id))?;
        if entry.status.is_terminal() {
            return Err(ProcessorError::InvalidRequest {
                message: format!("payment intent {} is already {}", id, entry.status),
            });
        }
        entry.status = status;
        if let Some(token) = payment_method {
            entry.payment_method = Some(token.to_string());
        }
        Ok(())
    }

    fn create_intent_now(&self, params: CreateIntentParams) -> ProcessorResult<ProcessorIntent> {
        self.take_failure()?;
        self.create_intent_calls.fetch_add(1, Ordering::SeqCst);

        if params.amount_minor <= 0 {
            return Err(ProcessorError::InvalidRequest {
                message: format!("amount must be positive, got {}", params.amount_minor),
            });
        }

        // The idempotency entry stays locked while the intent is created, so
        // two racing requests with one key observe a single intent.
        let key_entry = self.idempotency.entry(params.idempotency_key.clone());
        let id = key_entry
            .or_insert_with(|| {
                let id = format!("pi_{}", Uuid::new_v4().simple());
                let secret = format!("{}_secret_{}", id, Uuid::new_v4().simple());
                self.intents.insert(
                    id.clone(),
                    ProcessorIntent {
                        id: id.clone(),
                        client_secret: ClientSecret::new(secret),
                        status: IntentStatus::RequiresPaymentMethod,
                        amount_minor: params.amount_minor,
                        currency: params.currency.clone(),
                        customer: Some(params.customer.clone()),
                        payment_method: None,
                        metadata: params.metadata.clone(),
                    },
                );
                id
            })
            .clone();

        // A reused key returns the original intent whatever its status
        self.intent(&id).ok_or_else(|| no_such_intent(&id))
    }

    fn cancel_now(&self, id: &str) -> ProcessorResult<ProcessorIntent> {
        self.take_failure()?;
        let mut entry = self.intents.get_mut(id).ok_or_else(|| no_such_intent(id))?;
        match entry.status {
            IntentStatus::Succeeded => Err(ProcessorError::InvalidRequest {
                message: format!("payment intent {} already succeeded", id),
            }),
            IntentStatus::Canceled => Ok(entry.value().clone()),
            _ => {
                entry.status = IntentStatus::Canceled;
                Ok(entry.value().clone())
            }
        }
    }

    fn confirm_now(&self, id: &str, payment_method: Option<&str>) -> ProcessorResult<ProcessorIntent> {
        self.take_failure()?;
        let mut entry = self.intents.get_mut(id).ok_or_else(|| no_such_intent(id))?;

        if !entry.status.awaits_confirmation() {
            return Ok(entry.value().clone());
        }

        let token = match payment_method.map(str::to_string).or_else(|| entry.payment_method.clone()) {
            Some(token) => token,
            None => {
                return Err(ProcessorError::InvalidRequest {
                    message: format!("payment intent {} has no payment method", id),
                })
            }
        };

        entry.status = if token.starts_with(DECLINED_TOKEN_PREFIX) {
            IntentStatus::Failed
        } else {
            IntentStatus::Succeeded
        };
        entry.payment_method = Some(token);
        Ok(entry.value().clone())
    }
}

fn no_such_intent(id: &str) -> ProcessorError {
    ProcessorError::NotFound {
        object: "payment_intent",
        id: id.to_string(),
    }
}

impl PaymentProcessor for MockProcessor {
    fn create_customer(&self, params: CustomerParams) -> BoxFuture<'_, ProcessorResult<String>> {
        async move {
            self.take_failure()?;
            let id = format!("cus_{}", Uuid::new_v4().simple());
            self.customers.insert(id.clone(), params);
            Ok(id)
        }
        .boxed()
    }

    fn create_intent(
        &self,
        params: CreateIntentParams,
    ) -> BoxFuture<'_, ProcessorResult<ProcessorIntent>> {
        async move { self.create_intent_now(params) }.boxed()
    }

    fn retrieve_intent<'a>(
        &'a self,
        id: &'a str,
    ) -> BoxFuture<'a, ProcessorResult<ProcessorIntent>> {
        async move {
            self.take_failure()?;
            self.intent(id).ok_or_else(|| no_such_intent(id))
        }
        .boxed()
    }

    fn confirm_intent<'a>(
        &'a self,
        id: &'a str,
        payment_method: Option<&'a str>,
    ) -> BoxFuture<'a, ProcessorResult<ProcessorIntent>> {
        async move { self.confirm_now(id, payment_method) }.boxed()
    }

    fn cancel_intent<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProcessorResult<ProcessorIntent>> {
        async move { self.cancel_now(id) }.boxed()
    }

    fn attach_payment_method<'a>(
        &'a self,
        token: &'a str,
        customer: &'a str,
    ) -> BoxFuture<'a, ProcessorResult<CardDetails>> {
        async move {
            self.take_failure()?;
            if !self.customers.contains_key(customer) {
                return Err(ProcessorError::NotFound {
                    object: "customer",
                    id: customer.to_string(),
                });
            }
            self.attachments
                .insert(token.to_string(), customer.to_string());
            Ok(card_details(token, Some(customer.to_string())))
        }
        .boxed()
    }

    fn retrieve_payment_method<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, ProcessorResult<CardDetails>> {
        async move {
            self.take_failure()?;
            let customer = self.attachments.get(token).map(|entry| entry.value().clone());
            Ok(card_details(token, customer))
        }
        .boxed()
    }

    fn detach_payment_method<'a>(&'a self, token: &'a str) -> BoxFuture<'a, ProcessorResult<()>> {
        async move {
            self.take_failure()?;
            self.attachments
                .remove(token)
                .map(|_| ())
                .ok_or_else(|| ProcessorError::InvalidRequest {
                    message: format!("payment method {} is not attached to a customer", token),
                })
        }
        .boxed()
    }
}

/// Every sandbox card looks like the processor's standard test visa
fn card_details(token: &str, customer: Option<String>) -> CardDetails {
    CardDetails {
        token: token.to_string(),
        customer,
        brand: Some("visa".to_string()),
        last4: Some("4242".to_string()),
        exp_month: Some(12),
        exp_year: Some(2034),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn params(key: &str) -> CreateIntentParams {
        CreateIntentParams {
            amount_minor: 75000,
            currency: "usd".to_string(),
            customer: "cus_test".to_string(),
            description: "Payment for booking 1".to_string(),
            metadata: BTreeMap::new(),
            idempotency_key: key.to_string(),
            setup_future_usage: None,
        }
    }

    #[tokio::test]
    async fn test_create_intent_issues_identifiers() {
        let processor = MockProcessor::new();

        let intent = processor.create_intent(params("booking_1_1")).await.unwrap();

        assert!(intent.id.starts_with("pi_"));
        assert!(intent.client_secret.expose().starts_with(&intent.id));
        assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
        assert_eq!(intent.amount_minor, 75000);
    }

    #[tokio::test]
    async fn test_idempotency_key_returns_same_intent() {
        let processor = MockProcessor::new();

        let first = processor.create_intent(params("booking_1_1")).await.unwrap();
        let second = processor.create_intent(params("booking_1_1")).await.unwrap();
        let other = processor.create_intent(params("booking_2_1")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn test_reused_key_returns_original_even_after_failure() {
        let processor = MockProcessor::new();

        let first = processor.create_intent(params("booking_1_1_1")).await.unwrap();
        processor.decline_payment(&first.id).unwrap();
        let replayed = processor.create_intent(params("booking_1_1_1")).await.unwrap();
        let next_attempt = processor.create_intent(params("booking_1_1_2")).await.unwrap();

        assert_eq!(replayed.id, first.id);
        assert_eq!(replayed.status, IntentStatus::Failed);
        assert_ne!(next_attempt.id, first.id);
        assert_eq!(next_attempt.status, IntentStatus::RequiresPaymentMethod);
    }

    #[tokio::test]
    async fn test_payer_cannot_complete_terminal_intent() {
        let processor = MockProcessor::new();
        let intent = processor.create_intent(params("k")).await.unwrap();
        processor.decline_payment(&intent.id).unwrap();

        let result = processor.complete_payment(&intent.id, "pm_card_visa");

        assert!(matches!(result, Err(ProcessorError::InvalidRequest { .. })));
        assert_eq!(processor.intent(&intent.id).unwrap().status, IntentStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancelled_intent_cannot_capture() {
        let processor = MockProcessor::new();
        let intent = processor.create_intent(params("k")).await.unwrap();

        let cancelled = processor.cancel_intent(&intent.id).await.unwrap();
        let completed = processor.complete_payment(&intent.id, "pm_card_visa");
        let again = processor.cancel_intent(&intent.id).await.unwrap();

        assert_eq!(cancelled.status, IntentStatus::Canceled);
        assert!(completed.is_err());
        assert_eq!(again.status, IntentStatus::Canceled);
    }

    #[tokio::test]
    async fn test_succeeded_intent_cannot_be_cancelled() {
        let processor = MockProcessor::new();
        let intent = processor.create_intent(params("k")).await.unwrap();
        processor.complete_payment(&intent.id, "pm_card_visa").unwrap();

        let result = processor.cancel_intent(&intent.id).await;

        assert!(matches!(result, Err(ProcessorError::InvalidRequest { .. })));
        assert_eq!(processor.intent(&intent.id).unwrap().status, IntentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_confirm_with_card_succeeds() {
        let processor = MockProcessor::new();
        let intent = processor.create_intent(params("k")).await.unwrap();

        let confirmed = processor
            .confirm_intent(&intent.id, Some("pm_card_visa"))
            .await
            .unwrap();

        assert_eq!(confirmed.status, IntentStatus::Succeeded);
        assert_eq!(confirmed.payment_method.as_deref(), Some("pm_card_visa"));
    }

    #[tokio::test]
    async fn test_confirm_with_declined_card_fails_intent() {
        let processor = MockProcessor::new();
        let intent = processor.create_intent(params("k")).await.unwrap();

        let confirmed = processor
            .confirm_intent(&intent.id, Some("pm_card_declined_insufficient"))
            .await
            .unwrap();

        assert_eq!(confirmed.status, IntentStatus::Failed);
    }

    #[tokio::test]
    async fn test_confirm_without_payment_method_is_rejected() {
        let processor = MockProcessor::new();
        let intent = processor.create_intent(params("k")).await.unwrap();

        let result = processor.confirm_intent(&intent.id, None).await;

        assert!(matches!(result, Err(ProcessorError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn test_fail_next_affects_exactly_one_call() {
        let processor = MockProcessor::new();
        processor.fail_next(ProcessorError::Timeout);

        assert_eq!(
            processor.create_intent(params("k")).await,
            Err(ProcessorError::Timeout)
        );
        assert!(processor.create_intent(params("k")).await.is_ok());
    }

    #[tokio::test]
    async fn test_attach_requires_known_customer() {
        let processor = MockProcessor::new();

        let missing = processor.attach_payment_method("pm_card_visa", "cus_nope").await;
        assert!(matches!(missing, Err(ProcessorError::NotFound { .. })));

        let customer = processor
            .create_customer(CustomerParams {
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
                metadata: BTreeMap::new(),
            })
            .await
            .unwrap();
        let card = processor
            .attach_payment_method("pm_card_visa", &customer)
            .await
            .unwrap();
        assert_eq!(card.last4.as_deref(), Some("4242"));
        assert_eq!(card.customer.as_deref(), Some(customer.as_str()));

        let retrieved = processor.retrieve_payment_method("pm_card_visa").await.unwrap();
        assert_eq!(retrieved, card);

        processor.detach_payment_method("pm_card_visa").await.unwrap();
        let detached = processor.retrieve_payment_method("pm_card_visa").await.unwrap();
        assert_eq!(detached.customer, None);
        assert!(processor.detach_payment_method("pm_card_visa").await.is_err());
    }
}
