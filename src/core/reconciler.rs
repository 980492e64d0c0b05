//! Confirmation reconciliation
//!
//! A payment can be confirmed by two independent triggers: the payer's client
//! calling a confirm operation, and the processor's webhook. Both end up in
//! [`ConfirmationReconciler::reconcile`], which applies the reported intent
//! status to the local mirror and the booking in a single update of the
//! booking's ledger entry. Whichever trigger arrives second observes the
//! first one's result and changes nothing.
//!
//! # Transition rules
//!
//! | reported                 | local state                          | result                        |
//! |--------------------------|--------------------------------------|-------------------------------|
//! | succeeded                | intent succeeded, booking paid       | already reconciled            |
//! | succeeded                | intent in flight, booking pending    | intent succeeded, booking paid|
//! | succeeded                | intent failed/canceled               | state error                   |
//! | succeeded                | booking cancelled                    | state error                   |
//! | failed / canceled        | intent succeeded                     | unchanged (never regresses)   |
//! | failed / canceled        | intent in flight                     | intent updated, booking pending|
//! | anything else            | intent in flight                     | mirror refreshed              |
//!
//! The paid transition also writes the payment receipt inside the same
//! update, so a succeeded intent gets exactly one receipt.

use super::identity::IdentityResolver;
use super::ledger::{BookingRecord, Ledger};
use super::traits::Clock;
use crate::types::{
    BookingError, BookingStatus, CallerKind, IntentStatus, Payment, ReconcileOutcome,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Idempotent intent → booking state transition
pub struct ConfirmationReconciler {
    ledger: Arc<Ledger>,
    identity: Arc<IdentityResolver>,
    clock: Arc<dyn Clock>,
}

impl ConfirmationReconciler {
    pub fn new(ledger: Arc<Ledger>, identity: Arc<IdentityResolver>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            identity,
            clock,
        }
    }

    /// Apply a processor-reported status to the intent and its booking
    ///
    /// Safe to call any number of times, from any trigger, concurrently.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no local intent has this processor id
    /// - `Authorization` if a guest confirmation targets a non-guest intent
    /// - `State` if a success is reported for an intent or booking that can no
    ///   longer accept it; this needs manual follow-up with the processor
    pub fn reconcile(
        &self,
        processor_intent_id: &str,
        reported: IntentStatus,
        caller: CallerKind,
    ) -> Result<ReconcileOutcome, BookingError> {
        self.reconcile_with(processor_intent_id, reported, caller, None)
    }

    /// [`reconcile`](Self::reconcile), also recording the payment method the
    /// processor reported for the intent
    pub fn reconcile_with(
        &self,
        processor_intent_id: &str,
        reported: IntentStatus,
        caller: CallerKind,
        payment_method: Option<&str>,
    ) -> Result<ReconcileOutcome, BookingError> {
        let booking_id = self
            .ledger
            .booking_for_intent(processor_intent_id)
            .ok_or_else(|| BookingError::not_found("payment intent", processor_intent_id))?;
        let owner = self
            .ledger
            .booking(booking_id)
            .and_then(|booking| self.identity.get(booking.account_id));
        let now = self.clock.now();

        let result = self.ledger.update(booking_id, |record| {
            let mut outcome =
                apply(record, processor_intent_id, reported, caller, payment_method, now)?;

            if outcome.transitioned && outcome.booking_status == BookingStatus::Paid {
                let intent = record
                    .intent(processor_intent_id)
                    .cloned()
                    .ok_or_else(|| BookingError::not_found("payment intent", processor_intent_id))?;
                let guest_email = record.booking.guest.email.clone();
                let receipt_email = match &owner {
                    Some(account) if !intent.is_guest => Some(account.email.clone()),
                    _ => Some(guest_email),
                };
                let customer_id = owner
                    .as_ref()
                    .and_then(|account| account.processor_customer_id.clone());

                self.ledger.record_payment(record, |id| Payment {
                    id,
                    booking_id,
                    account_id: intent.account_id,
                    processor_intent_id: intent.processor_id,
                    amount: intent.amount,
                    currency: intent.currency,
                    customer_id,
                    payment_method: intent.payment_method,
                    receipt_email,
                    is_guest: intent.is_guest,
                    completed_at: now,
                });
            }
            outcome.payment_id = record
                .payment_for(processor_intent_id)
                .map(|payment| payment.id);
            Ok(outcome)
        });

        match &result {
            Ok(outcome) if outcome.transitioned => tracing::info!(
                booking_id,
                intent_id = processor_intent_id,
                caller = ?caller,
                intent_status = %outcome.intent_status,
                booking_status = outcome.booking_status.as_str(),
                payment_id = ?outcome.payment_id,
                "payment reconciled"
            ),
            Ok(_) => tracing::debug!(
                booking_id,
                intent_id = processor_intent_id,
                caller = ?caller,
                "payment already reconciled"
            ),
            Err(BookingError::State { message }) => tracing::error!(
                booking_id,
                intent_id = processor_intent_id,
                reported = %reported,
                caller = ?caller,
                %message,
                "payment needs manual follow-up"
            ),
            Err(e) => tracing::warn!(
                booking_id,
                intent_id = processor_intent_id,
                caller = ?caller,
                error = %e,
                "reconciliation rejected"
            ),
        }
        result
    }
}

fn apply(
    record: &mut BookingRecord,
    processor_intent_id: &str,
    reported: IntentStatus,
    caller: CallerKind,
    payment_method: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, BookingError> {
    let BookingRecord {
        booking, intents, ..
    } = record;
    let intent = intents
        .iter_mut()
        .find(|intent| intent.processor_id == processor_intent_id)
        .ok_or_else(|| BookingError::not_found("payment intent", processor_intent_id))?;

    if caller == CallerKind::GuestExplicit && !intent.is_guest {
        return Err(BookingError::authorization(
            "This endpoint is only for guest payments",
        ));
    }

    if let Some(token) = payment_method {
        intent.payment_method.get_or_insert_with(|| token.to_string());
    }

    let mut transitioned = false;
    let mut already_reconciled = false;

    match reported {
        IntentStatus::Succeeded => match (intent.status, booking.status) {
            (IntentStatus::Succeeded, BookingStatus::Paid) => already_reconciled = true,
            (IntentStatus::Failed | IntentStatus::Canceled, _) => {
                return Err(BookingError::state(format!(
                    "Payment intent {} is {} and cannot succeed",
                    processor_intent_id, intent.status
                )))
            }
            (_, BookingStatus::Cancelled) => {
                return Err(BookingError::state(format!(
                    "Booking {} was cancelled before payment {} succeeded",
                    booking.id, processor_intent_id
                )))
            }
            (_, BookingStatus::Paid) => {
                return Err(BookingError::state(format!(
                    "Booking {} is already paid by another payment",
                    booking.id
                )))
            }
            (_, BookingStatus::PendingPayment) => {
                intent.status = IntentStatus::Succeeded;
                intent.updated_at = now;
                booking.status = BookingStatus::Paid;
                booking.paid_at = Some(now);
                booking.payment_intent_id = Some(intent.processor_id.clone());
                transitioned = true;
            }
        },
        IntentStatus::Failed | IntentStatus::Canceled => {
            if intent.status.is_terminal() {
                if intent.status == IntentStatus::Succeeded {
                    tracing::warn!(
                        intent_id = processor_intent_id,
                        reported = %reported,
                        "ignoring failure reported after success"
                    );
                }
                already_reconciled = true;
            } else {
                intent.status = reported;
                intent.updated_at = now;
                transitioned = true;
            }
        }
        in_flight => {
            if intent.status.is_terminal() || intent.status == in_flight {
                already_reconciled = intent.status == in_flight;
            } else {
                intent.status = in_flight;
                intent.updated_at = now;
                transitioned = true;
            }
        }
    }

    Ok(ReconcileOutcome {
        booking_id: booking.id,
        processor_intent_id: processor_intent_id.to_string(),
        intent_status: intent.status,
        booking_status: booking.status,
        transitioned,
        already_reconciled,
        payment_id: None,
    })
}
