//! Payment intent orchestration
//!
//! The `PaymentOrchestrator` opens the processor-side payment intent for a
//! booking and keeps the local mirror on the ledger. The amount is always
//! derived from the booking and the property's nightly rate; nothing the
//! client sends can change it.
//!
//! Processor calls are made without holding any ledger entry. Each attempt
//! at paying a booking has its own idempotency key
//! (`booking_<booking>_<account>_<attempt>`, where the attempt counts the
//! intents already on the booking). Two callers racing to open an intent
//! reach the processor with the same key, and whichever mirror lands first
//! on the ledger is returned to both. A retry after a failed or canceled
//! intent gets a new key and therefore a new processor intent.

use super::booking_manager::stay_price;
use super::identity::IdentityResolver;
use super::ledger::Ledger;
use super::traits::{Clock, PropertyCatalog};
use crate::processor::{to_minor_units, CreateIntentParams, PaymentProcessor};
use crate::types::{
    AccountId, Booking, BookingError, BookingId, BookingStatus, BookingSummary, IntentDetails,
    PaymentIntent, PropertySummary, QuickIntent,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Who is paying for a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payer {
    /// Unauthenticated payer; only bookings made through the guest path qualify
    Guest,
    /// Authenticated account; must own the booking or be an administrator
    Authenticated(AccountId),
}

impl Payer {
    pub fn is_guest(&self) -> bool {
        matches!(self, Payer::Guest)
    }
}

/// Opens and reuses payment intents
pub struct PaymentOrchestrator {
    catalog: Arc<dyn PropertyCatalog>,
    identity: Arc<IdentityResolver>,
    ledger: Arc<Ledger>,
    processor: Arc<dyn PaymentProcessor>,
    clock: Arc<dyn Clock>,
}

impl PaymentOrchestrator {
    pub fn new(
        catalog: Arc<dyn PropertyCatalog>,
        identity: Arc<IdentityResolver>,
        ledger: Arc<Ledger>,
        processor: Arc<dyn PaymentProcessor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            identity,
            ledger,
            processor,
            clock,
        }
    }

    /// Open a payment intent for a booking, or return the one in flight
    ///
    /// # Errors
    ///
    /// - `NotFound` if the booking (or its property) does not exist
    /// - `Authorization` if the payer may not pay for this booking
    /// - `State` if the booking is not awaiting payment
    /// - `Processor` if the processor call fails; it is not retried
    pub async fn open_intent(
        &self,
        booking_id: BookingId,
        payer: Payer,
        setup_future_usage: Option<String>,
    ) -> Result<IntentDetails, BookingError> {
        let record = self
            .ledger
            .get(booking_id)
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        let booking = &record.booking;

        self.authorize(booking, payer)?;

        if booking.status != BookingStatus::PendingPayment {
            return Err(BookingError::state(format!(
                "Booking {} is not awaiting payment (status: {})",
                booking.id,
                booking.status.as_str()
            )));
        }

        if let Some(active) = record.active_intent() {
            tracing::debug!(
                booking_id,
                intent_id = %active.processor_id,
                "reusing active payment intent"
            );
            return Ok(self.details(booking, active));
        }

        let property = self
            .catalog
            .property(booking.property_id)
            .ok_or_else(|| BookingError::not_found("property", booking.property_id))?;
        let amount = stay_price(&property, &booking.stay)?;
        let amount_minor = to_minor_units(amount)
            .ok_or_else(|| BookingError::validation("Booking total is out of range"))?;

        let customer = self
            .identity
            .ensure_customer(booking.account_id, self.processor.as_ref())
            .await?;

        let attempt = record.intents.len() + 1;
        let mut metadata = BTreeMap::new();
        metadata.insert("booking_id".to_string(), booking.id.to_string());
        metadata.insert("account_id".to_string(), booking.account_id.to_string());
        metadata.insert("property_id".to_string(), booking.property_id.to_string());
        metadata.insert("is_guest".to_string(), payer.is_guest().to_string());

        let created = self
            .processor
            .create_intent(CreateIntentParams {
                amount_minor,
                currency: property.currency.clone(),
                customer,
                description: format!("Payment for booking {}", booking.id),
                metadata,
                idempotency_key: format!(
                    "booking_{}_{}_{}",
                    booking.id, booking.account_id, attempt
                ),
                setup_future_usage,
            })
            .await
            .map_err(|e| {
                tracing::error!(booking_id, error = %e, "processor rejected payment intent");
                BookingError::from(e)
            })?;

        let now = self.clock.now();
        let mirror = PaymentIntent {
            booking_id: booking.id,
            account_id: booking.account_id,
            amount,
            currency: property.currency,
            processor_id: created.id,
            client_secret: created.client_secret,
            status: created.status,
            is_guest: payer.is_guest(),
            payment_method: created.payment_method,
            created_at: now,
            updated_at: now,
        };
        let stored = self.ledger.attach_intent(mirror)?;

        tracing::info!(
            booking_id,
            intent_id = %stored.processor_id,
            attempt,
            amount = %stored.amount,
            currency = %stored.currency,
            guest = stored.is_guest,
            "payment intent opened"
        );
        Ok(self.details(booking, &stored))
    }

    /// Guest variant returning only what a lightweight checkout page needs
    pub async fn open_quick_intent(&self, booking_id: BookingId) -> Result<QuickIntent, BookingError> {
        self.open_intent(booking_id, Payer::Guest, None)
            .await
            .map(QuickIntent::from)
    }

    /// Response view of an intent with its booking summary
    pub fn details(&self, booking: &Booking, intent: &PaymentIntent) -> IntentDetails {
        let title = self
            .catalog
            .property(booking.property_id)
            .map(|property| property.title)
            .unwrap_or_default();
        IntentDetails {
            booking: BookingSummary {
                id: booking.id,
                property: PropertySummary {
                    id: booking.property_id,
                    title,
                },
                check_in_date: booking.stay.check_in,
                check_out_date: booking.stay.check_out,
            },
            amount: intent.amount,
            currency: intent.currency.clone(),
            status: intent.status,
            processor_intent_id: intent.processor_id.clone(),
            client_secret: intent.client_secret.clone(),
            is_guest: intent.is_guest,
            created_at: intent.created_at,
        }
    }

    /// Guest payment depends only on how the booking was made, never on
    /// whether its email belongs to a registered account
    fn authorize(&self, booking: &Booking, payer: Payer) -> Result<(), BookingError> {
        match payer {
            Payer::Guest if booking.guest_checkout => Ok(()),
            Payer::Guest => {
                tracing::warn!(booking_id = booking.id, "guest payment refused for account booking");
                Err(BookingError::authorization(
                    "This booking was made with an account; sign in to pay",
                ))
            }
            Payer::Authenticated(account_id) => {
                let payer = self
                    .identity
                    .get(account_id)
                    .ok_or_else(|| BookingError::not_found("account", account_id))?;
                if payer.id == booking.account_id || payer.is_admin() {
                    Ok(())
                } else {
                    Err(BookingError::authorization(
                        "You can only pay for your own bookings",
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::InMemoryCatalog;
    use crate::core::clock::FixedClock;
    use crate::core::identity::Registration;
    use crate::processor::{MockProcessor, ProcessorError};
    use crate::types::{GuestContact, IntentStatus, Property, Role, Stay};
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    struct Fixture {
        orchestrator: PaymentOrchestrator,
        identity: Arc<IdentityResolver>,
        ledger: Arc<Ledger>,
        processor: Arc<MockProcessor>,
    }

    fn fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2031, 5, 1, 12, 0, 0).unwrap(),
        ));
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.upsert(Property {
            id: 7,
            title: "Lakeside cabin".to_string(),
            nightly_rate: Decimal::new(125, 0),
            currency: "usd".to_string(),
            max_guests: 4,
            bookable: true,
        });
        let identity = Arc::new(IdentityResolver::new(Arc::clone(&clock), 18));
        let ledger = Arc::new(Ledger::new());
        let processor = Arc::new(MockProcessor::new());
        let orchestrator = PaymentOrchestrator::new(
            catalog,
            Arc::clone(&identity),
            Arc::clone(&ledger),
            processor.clone(),
            clock,
        );
        Fixture {
            orchestrator,
            identity,
            ledger,
            processor,
        }
    }

    fn book(fx: &Fixture, owner: AccountId, guest_checkout: bool) -> Booking {
        let stay = Stay::new(
            NaiveDate::from_ymd_opt(2031, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2031, 6, 7).unwrap(),
        );
        fx.ledger
            .insert_booking(7, stay, |id| Booking {
                id,
                property_id: 7,
                account_id: owner,
                stay,
                guests: 2,
                guest: GuestContact {
                    name: "Ada".to_string(),
                    email: "ada@example.com".to_string(),
                    phone: "+1".to_string(),
                },
                special_requests: None,
                guest_checkout,
                total_price: Decimal::new(75000, 2),
                currency: "usd".to_string(),
                status: BookingStatus::PendingPayment,
                paid_at: None,
                payment_intent_id: None,
                created_at: Utc.with_ymd_and_hms(2031, 5, 1, 12, 0, 0).unwrap(),
            })
            .unwrap()
    }

    fn dormant(fx: &Fixture) -> AccountId {
        fx.identity
            .resolve_or_create_guest(&crate::types::ContactInfo {
                full_name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                phone_number: "+1".to_string(),
                birthday: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            })
            .unwrap()
            .id
    }

    fn registered(fx: &Fixture, email: &str, role: Role) -> AccountId {
        fx.identity
            .register_account(Registration {
                email: email.to_string(),
                full_name: "Registered".to_string(),
                phone_number: "+1".to_string(),
                birthday: None,
                role,
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_guest_intent_for_dormant_owner() {
        let fx = fixture();
        let booking = book(&fx, dormant(&fx), true);

        let details = fx
            .orchestrator
            .open_intent(booking.id, Payer::Guest, None)
            .await
            .unwrap();

        assert_eq!(details.amount, Decimal::new(75000, 2));
        assert_eq!(details.currency, "usd");
        assert!(details.is_guest);
        assert_eq!(details.status, IntentStatus::RequiresPaymentMethod);
        assert_eq!(details.booking.property.title, "Lakeside cabin");

        let processor_view = fx.processor.intent(&details.processor_intent_id).unwrap();
        assert_eq!(processor_view.amount_minor, 75000);
        assert_eq!(processor_view.metadata.get("is_guest").map(String::as_str), Some("true"));
        assert_eq!(
            processor_view.metadata.get("booking_id"),
            Some(&booking.id.to_string())
        );
    }

    #[tokio::test]
    async fn test_active_intent_is_reused() {
        let fx = fixture();
        let booking = book(&fx, dormant(&fx), true);

        let first = fx.orchestrator.open_intent(booking.id, Payer::Guest, None).await.unwrap();
        let second = fx.orchestrator.open_quick_intent(booking.id).await.unwrap();

        assert_eq!(first.processor_intent_id, second.id);
        assert_eq!(fx.processor.create_intent_calls(), 1);
        assert_eq!(fx.ledger.get(booking.id).unwrap().intents.len(), 1);
    }

    #[tokio::test]
    async fn test_guest_refused_for_account_booking() {
        let fx = fixture();
        let owner = registered(&fx, "owner@example.com", Role::Tenant);
        let booking = book(&fx, owner, false);

        let result = fx.orchestrator.open_intent(booking.id, Payer::Guest, None).await;

        assert!(matches!(result, Err(BookingError::Authorization { .. })));
        assert_eq!(fx.processor.create_intent_calls(), 0);
    }

    #[tokio::test]
    async fn test_guest_booking_payable_whoever_owns_the_email() {
        let fx = fixture();
        let owner = registered(&fx, "owner@example.com", Role::Tenant);
        let booking = book(&fx, owner, true);

        let details = fx
            .orchestrator
            .open_intent(booking.id, Payer::Guest, None)
            .await
            .unwrap();

        assert!(details.is_guest);
        let by_owner = fx
            .orchestrator
            .open_intent(booking.id, Payer::Authenticated(owner), None)
            .await
            .unwrap();
        assert_eq!(by_owner.processor_intent_id, details.processor_intent_id);
    }

    #[tokio::test]
    async fn test_retry_after_failure_opens_new_processor_intent() {
        let fx = fixture();
        let booking = book(&fx, dormant(&fx), true);
        let first = fx.orchestrator.open_quick_intent(booking.id).await.unwrap();
        fx.processor.decline_payment(&first.id).unwrap();
        fx.ledger
            .update(booking.id, |record| {
                record.intents[0].status = IntentStatus::Failed;
                Ok(())
            })
            .unwrap();

        let retry = fx.orchestrator.open_quick_intent(booking.id).await.unwrap();

        assert_ne!(retry.id, first.id);
        assert_eq!(fx.processor.create_intent_calls(), 2);
        assert_eq!(
            fx.processor.intent(&first.id).map(|intent| intent.status),
            Some(IntentStatus::Failed)
        );
        let record = fx.ledger.get(booking.id).unwrap();
        assert_eq!(record.intents.len(), 2);
        assert_eq!(record.active_intent().map(|i| i.processor_id.as_str()), Some(retry.id.as_str()));
    }

    #[tokio::test]
    async fn test_authenticated_owner_or_admin_only() {
        let fx = fixture();
        let owner = registered(&fx, "owner@example.com", Role::Tenant);
        let stranger = registered(&fx, "stranger@example.com", Role::Tenant);
        let admin = registered(&fx, "admin@example.com", Role::Admin);
        let booking = book(&fx, owner, false);

        let foreign = fx
            .orchestrator
            .open_intent(booking.id, Payer::Authenticated(stranger), None)
            .await;
        assert!(matches!(foreign, Err(BookingError::Authorization { .. })));

        let by_admin = fx
            .orchestrator
            .open_intent(booking.id, Payer::Authenticated(admin), Some("off_session".to_string()))
            .await
            .unwrap();
        assert!(!by_admin.is_guest);

        let by_owner = fx
            .orchestrator
            .open_intent(booking.id, Payer::Authenticated(owner), None)
            .await
            .unwrap();
        assert_eq!(by_owner.processor_intent_id, by_admin.processor_intent_id);
    }

    #[tokio::test]
    async fn test_unknown_booking_and_wrong_status() {
        let fx = fixture();
        let missing = fx.orchestrator.open_intent(404, Payer::Guest, None).await;
        assert_eq!(missing, Err(BookingError::not_found("booking", 404)));

        let booking = book(&fx, dormant(&fx), true);
        fx.ledger
            .update(booking.id, |record| {
                record.booking.status = BookingStatus::Paid;
                Ok(())
            })
            .unwrap();

        let paid = fx.orchestrator.open_intent(booking.id, Payer::Guest, None).await;
        assert!(matches!(paid, Err(BookingError::State { .. })));
    }

    #[tokio::test]
    async fn test_processor_failure_leaves_no_mirror() {
        let fx = fixture();
        let booking = book(&fx, dormant(&fx), true);
        // customer creation consumes the first call
        fx.identity
            .ensure_customer(booking.account_id, fx.processor.as_ref())
            .await
            .unwrap();
        fx.processor.fail_next(ProcessorError::Timeout);

        let result = fx.orchestrator.open_intent(booking.id, Payer::Guest, None).await;

        assert!(matches!(result, Err(BookingError::Processor { .. })));
        assert!(fx.ledger.get(booking.id).unwrap().intents.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_open_intent_yields_single_intent() {
        let fx = Arc::new(fixture());
        let booking = book(&fx, dormant(&fx), true);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let fx = Arc::clone(&fx);
                tokio::spawn(async move {
                    fx.orchestrator
                        .open_intent(booking.id, Payer::Guest, None)
                        .await
                        .map(|details| details.processor_intent_id)
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap());
        }

        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(fx.ledger.get(booking.id).unwrap().intents.len(), 1);
    }
}
