//! Journal replay
//!
//! Drives a CSV journal of workflow commands through [`BookingService`]
//! backed by the in-memory [`MockProcessor`], then writes the final booking
//! states as CSV. The journal stands in for the HTTP layer and the payer's
//! browser: `pay` and `decline` act on the processor directly, as the
//! processor-hosted payment form would.
//!
//! # Error Handling
//!
//! Fatal errors (journal not readable, runtime or output failures) are
//! returned. Row errors, whether malformed rows or rejected operations, are
//! logged and replay continues with the next row.

use crate::config::EngineConfig;
use crate::core::{BookingRecord, Clock, InMemoryCatalog, Registration};
use crate::io::{write_bookings_csv, BookingRef, JournalEntry, JournalReader};
use crate::processor::webhook::intent_event_payload;
use crate::processor::{MockProcessor, WebhookVerifier};
use crate::service::BookingService;
use crate::types::{
    Account, Booking, BookingError, BookingForm, BookingId, ConfirmRequest, ContactInfo,
    GuestBookingForm, IntentStatus, PaymentIntent, Property, Role,
};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Card token used when a journal row does not name one
pub const DEFAULT_CARD_TOKEN: &str = "pm_card_visa";

/// Replays journals against a fresh service
#[derive(Clone)]
pub struct JournalReplay {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl JournalReplay {
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Replay the journal at `input_path` and write booking states to `output`
    pub fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), BookingError> {
        let reader = JournalReader::new(input_path)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| BookingError::Io {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;

        let records = runtime.block_on(self.replay(reader));

        write_bookings_csv(&records, output).map_err(|message| BookingError::Io { message })
    }

    /// Apply every entry in order and return the resulting booking records
    pub async fn replay<I>(&self, entries: I) -> Vec<BookingRecord>
    where
        I: IntoIterator<Item = Result<JournalEntry, BookingError>>,
    {
        let mut session = ReplaySession::new(self.config.clone(), Arc::clone(&self.clock));
        let mut applied = 0usize;
        let mut rejected = 0usize;

        for entry in entries {
            let result = match entry {
                Ok(entry) => session.apply(entry).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => applied += 1,
                Err(e) => {
                    rejected += 1;
                    tracing::warn!(error = %e, kind = ?e.kind(), "journal row rejected");
                }
            }
        }

        tracing::info!(applied, rejected, "journal replay finished");
        session.service.ledger().all()
    }
}

/// Service plus the journal's booking references
struct ReplaySession {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    catalog: Arc<InMemoryCatalog>,
    processor: Arc<MockProcessor>,
    service: BookingService,
    verifier: WebhookVerifier,
    references: HashMap<BookingRef, BookingId>,
}

impl ReplaySession {
    fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        let processor = Arc::new(MockProcessor::new());
        let service = BookingService::new(
            config.clone(),
            catalog.clone(),
            processor.clone(),
            Arc::clone(&clock),
        );
        let verifier = WebhookVerifier::new(
            config.webhook_secret.clone(),
            config.webhook_tolerance_secs,
        );

        Self {
            config,
            clock,
            catalog,
            processor,
            service,
            verifier,
            references: HashMap::new(),
        }
    }

    async fn apply(&mut self, entry: JournalEntry) -> Result<(), BookingError> {
        match entry {
            JournalEntry::Property {
                id,
                title,
                nightly_rate,
                max_guests,
                bookable,
            } => {
                self.catalog.upsert(Property {
                    id,
                    title,
                    nightly_rate,
                    currency: self.config.default_currency.clone(),
                    max_guests,
                    bookable,
                });
            }
            JournalEntry::Book {
                reference,
                form,
                birthday,
            } => self.book(reference, form, birthday)?,
            JournalEntry::Intent { reference } => {
                let booking_id = self.resolve(reference)?;
                let booking = self.booking(booking_id)?;
                let intent_id = if booking.guest_checkout {
                    self.service.open_intent_guest_quick(booking_id).await?.id
                } else {
                    self.service
                        .open_intent_authenticated(booking.account_id, booking_id, None)
                        .await?
                        .processor_intent_id
                };
                tracing::info!(reference, booking_id, intent_id = %intent_id, "intent opened");
            }
            JournalEntry::Pay {
                reference,
                payment_method,
            } => {
                let intent = self.active_intent(reference)?;
                let token = payment_method.as_deref().unwrap_or(DEFAULT_CARD_TOKEN);
                self.processor.complete_payment(&intent.processor_id, token)?;
            }
            JournalEntry::Decline { reference } => {
                let intent = self.active_intent(reference)?;
                self.processor.decline_payment(&intent.processor_id)?;
            }
            JournalEntry::Confirm {
                reference,
                payment_method,
            } => {
                let booking_id = self.resolve(reference)?;
                let intent = self.latest_intent(booking_id)?;
                let is_guest = intent.is_guest;
                let request = ConfirmRequest {
                    payment_intent_id: intent.processor_id,
                    payment_method_id: payment_method,
                    save_payment_method: true,
                };
                let report = if is_guest {
                    self.service.confirm_guest(request).await?
                } else {
                    self.service
                        .confirm_authenticated(intent.account_id, request)
                        .await?
                };
                tracing::info!(
                    reference,
                    booking_id,
                    booking_status = report.outcome.booking_status.as_str(),
                    requires_action = report.requires_action,
                    "payment confirmed"
                );
            }
            JournalEntry::Webhook { reference, status } => {
                let booking_id = self.resolve(reference)?;
                let intent = self.latest_intent(booking_id)?;
                let event_type = match status {
                    IntentStatus::Succeeded => "payment_intent.succeeded",
                    IntentStatus::Canceled => "payment_intent.canceled",
                    _ => "payment_intent.payment_failed",
                };
                let payload = intent_event_payload(event_type, &intent.processor_id);
                let header = self
                    .verifier
                    .sign(&payload, self.clock.now().timestamp())?;
                let ack = self.service.handle_webhook(&payload, &header).await?;
                tracing::info!(reference, booking_id, action = ?ack.action, "webhook delivered");
            }
            JournalEntry::Cancel { reference } => {
                let booking_id = self.resolve(reference)?;
                let booking = self.booking(booking_id)?;
                self.service
                    .cancel_booking(booking.account_id, booking_id)
                    .await?;
            }
            JournalEntry::Access { reference, email } => {
                let booking_id = self.resolve(reference)?;
                let details = self.service.guest_access(booking_id, &email)?;
                tracing::info!(
                    reference,
                    booking_id,
                    is_paid = details.is_paid,
                    duration_days = details.duration_days,
                    "guest access granted"
                );
            }
        }
        Ok(())
    }

    fn book(
        &mut self,
        reference: BookingRef,
        form: BookingForm,
        birthday: Option<NaiveDate>,
    ) -> Result<(), BookingError> {
        if self.references.contains_key(&reference) {
            return Err(BookingError::validation(format!(
                "Booking reference {} is already used",
                reference
            )));
        }

        let booking = match birthday {
            Some(birthday) => {
                let user_info = ContactInfo {
                    full_name: form.guest_name.clone(),
                    email: form.guest_email.clone(),
                    phone_number: form.guest_phone.clone(),
                    birthday,
                };
                self.service.create_booking_guest(GuestBookingForm {
                    booking: form,
                    user_info,
                })?
            }
            None => {
                let account = self.tenant_for(&form)?;
                self.service.create_booking_authenticated(account.id, form)?
            }
        };

        self.references.insert(reference, booking.id);
        Ok(())
    }

    /// Signed-in tenant for a booking row without a birthday
    fn tenant_for(&self, form: &BookingForm) -> Result<Account, BookingError> {
        let identity = self.service.identity();
        match identity.find_by_email(&form.guest_email) {
            Some(account) if account.active => Ok(account),
            _ => identity.register_account(Registration {
                email: form.guest_email.clone(),
                full_name: form.guest_name.clone(),
                phone_number: form.guest_phone.clone(),
                birthday: None,
                role: Role::Tenant,
            }),
        }
    }

    fn resolve(&self, reference: BookingRef) -> Result<BookingId, BookingError> {
        self.references
            .get(&reference)
            .copied()
            .ok_or_else(|| BookingError::not_found("booking reference", reference))
    }

    fn booking(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.service
            .ledger()
            .booking(booking_id)
            .ok_or_else(|| BookingError::not_found("booking", booking_id))
    }

    fn record(&self, booking_id: BookingId) -> Result<BookingRecord, BookingError> {
        self.service
            .ledger()
            .get(booking_id)
            .ok_or_else(|| BookingError::not_found("booking", booking_id))
    }

    fn latest_intent(&self, booking_id: BookingId) -> Result<PaymentIntent, BookingError> {
        self.record(booking_id)?
            .latest_intent()
            .cloned()
            .ok_or_else(|| BookingError::state(format!("Booking {} has no payment intent", booking_id)))
    }

    fn active_intent(&self, reference: BookingRef) -> Result<PaymentIntent, BookingError> {
        let booking_id = self.resolve(reference)?;
        self.record(booking_id)?
            .active_intent()
            .cloned()
            .ok_or_else(|| {
                BookingError::state(format!("Booking {} has no payment in flight", booking_id))
            })
    }
}
