//! Booking ledger: bookings, property calendars and payment intent mirrors
//!
//! The ledger is the single source of truth for booking state. Each booking
//! is stored together with every payment intent opened for it, so one
//! closure-scoped update on the booking entry can change both atomically.
//!
//! # Design
//!
//! Four `DashMap`s with fine-grained (sharded) locking:
//! - `bookings`: booking id → [`BookingRecord`]
//! - `calendars`: property id → stays currently holding dates
//! - `intent_index`: processor intent id → booking id
//! - `payment_index`: payment receipt id → booking id
//!
//! # Thread Safety
//!
//! Lock order is calendar → booking entry → intent index → payment index. Methods never call
//! back into another component while an entry is held, and callers must not
//! perform processor I/O inside an [`Ledger::update`] closure.

use crate::types::{
    AccountId, Booking, BookingError, BookingId, BookingStatus, IntentStatus, Payment, PaymentId,
    PaymentIntent, PropertyId, Stay,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A booking with its payment intents and receipts, oldest first
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRecord {
    pub booking: Booking,
    pub intents: Vec<PaymentIntent>,
    pub payments: Vec<Payment>,
}

impl BookingRecord {
    /// The one intent that is still in flight, if any
    pub fn active_intent(&self) -> Option<&PaymentIntent> {
        self.intents.iter().find(|intent| !intent.status.is_terminal())
    }

    pub fn intent(&self, processor_id: &str) -> Option<&PaymentIntent> {
        self.intents
            .iter()
            .find(|intent| intent.processor_id == processor_id)
    }

    pub fn latest_intent(&self) -> Option<&PaymentIntent> {
        self.intents.last()
    }

    /// Receipt written for a processor intent, if it succeeded here
    pub fn payment_for(&self, processor_id: &str) -> Option<&Payment> {
        self.payments
            .iter()
            .find(|payment| payment.processor_intent_id == processor_id)
    }
}

/// In-memory booking ledger
#[derive(Debug)]
pub struct Ledger {
    bookings: DashMap<BookingId, BookingRecord>,
    /// Stays of pending and paid bookings, per property
    calendars: DashMap<PropertyId, Vec<(BookingId, Stay)>>,
    intent_index: DashMap<String, BookingId>,
    payment_index: DashMap<PaymentId, BookingId>,
    next_id: AtomicU64,
    next_payment_id: AtomicU64,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            calendars: DashMap::new(),
            intent_index: DashMap::new(),
            payment_index: DashMap::new(),
            next_id: AtomicU64::new(1),
            next_payment_id: AtomicU64::new(1),
        }
    }

    /// Reserve `stay` on the property calendar and store the booking built for it
    ///
    /// The calendar entry stays locked from the overlap check until the
    /// booking is stored, so two overlapping requests cannot both succeed.
    /// `build` receives the allocated booking id.
    ///
    /// # Errors
    ///
    /// `Conflict` if the stay overlaps a pending or paid booking of the
    /// same property. Nothing is stored in that case.
    pub fn insert_booking<F>(
        &self,
        property_id: PropertyId,
        stay: Stay,
        build: F,
    ) -> Result<Booking, BookingError>
    where
        F: FnOnce(BookingId) -> Booking,
    {
        let mut calendar = self.calendars.entry(property_id).or_default();

        if calendar.iter().any(|(_, held)| held.overlaps(&stay)) {
            return Err(BookingError::Conflict {
                property: property_id,
                check_in: stay.check_in.to_string(),
                check_out: stay.check_out.to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let booking = build(id);
        self.bookings.insert(
            id,
            BookingRecord {
                booking: booking.clone(),
                intents: Vec::new(),
                payments: Vec::new(),
            },
        );
        calendar.push((id, stay));

        Ok(booking)
    }

    /// Snapshot of a booking and its intents
    pub fn get(&self, id: BookingId) -> Option<BookingRecord> {
        self.bookings.get(&id).map(|entry| entry.value().clone())
    }

    pub fn booking(&self, id: BookingId) -> Option<Booking> {
        self.bookings.get(&id).map(|entry| entry.booking.clone())
    }

    /// Update a booking record using a closure
    ///
    /// The closure runs while the booking entry is locked; every change it
    /// makes becomes visible at once.
    pub fn update<F, T>(&self, id: BookingId, f: F) -> Result<T, BookingError>
    where
        F: FnOnce(&mut BookingRecord) -> Result<T, BookingError>,
    {
        let mut entry = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| BookingError::not_found("booking", id))?;
        f(entry.value_mut())
    }

    /// Attach a freshly created intent to its booking
    ///
    /// If another caller attached a non-terminal intent first, that earlier
    /// intent wins and is returned instead. An intent already on the booking
    /// is never stored twice.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown booking
    /// - `State` if the booking stopped waiting for payment in the meantime,
    ///   or the processor handed back an intent that is already terminal
    pub fn attach_intent(&self, intent: PaymentIntent) -> Result<PaymentIntent, BookingError> {
        self.update(intent.booking_id, |record| {
            if let Some(active) = record.active_intent() {
                return Ok(active.clone());
            }
            if record.booking.status != BookingStatus::PendingPayment {
                return Err(BookingError::state(format!(
                    "Booking {} is no longer awaiting payment",
                    record.booking.id
                )));
            }
            if intent.status.is_terminal() || record.intent(&intent.processor_id).is_some() {
                return Err(BookingError::state(format!(
                    "Payment intent {} is already {}",
                    intent.processor_id, intent.status
                )));
            }
            self.intent_index
                .insert(intent.processor_id.clone(), intent.booking_id);
            record.intents.push(intent.clone());
            Ok(intent)
        })
    }

    pub fn booking_for_intent(&self, processor_id: &str) -> Option<BookingId> {
        self.intent_index.get(processor_id).map(|entry| *entry)
    }

    /// Store a receipt on a record the caller holds through [`Ledger::update`]
    ///
    /// `build` receives the allocated receipt id.
    pub fn record_payment<F>(&self, record: &mut BookingRecord, build: F) -> PaymentId
    where
        F: FnOnce(PaymentId) -> Payment,
    {
        let id = self.next_payment_id.fetch_add(1, Ordering::SeqCst);
        let payment = build(id);
        self.payment_index.insert(id, payment.booking_id);
        record.payments.push(payment);
        id
    }

    pub fn payment(&self, id: PaymentId) -> Option<Payment> {
        let booking_id = self.payment_index.get(&id).map(|entry| *entry)?;
        self.bookings.get(&booking_id).and_then(|entry| {
            entry
                .payments
                .iter()
                .find(|payment| payment.id == id)
                .cloned()
        })
    }

    /// Receipts of payments made for an account's intents, oldest first
    pub fn payments_for_account(&self, account_id: AccountId) -> Vec<Payment> {
        let mut payments: Vec<Payment> = self
            .bookings
            .iter()
            .flat_map(|entry| {
                entry
                    .payments
                    .iter()
                    .filter(|payment| payment.account_id == account_id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        payments.sort_by_key(|payment| payment.id);
        payments
    }

    /// Cancel a pending booking and free its dates
    ///
    /// `authorize` runs against the locked booking before anything changes.
    /// In-flight intents are marked canceled in the local mirror; their
    /// processor ids are returned next to the booking so the caller can
    /// cancel them with the processor.
    pub fn cancel<F>(
        &self,
        id: BookingId,
        now: DateTime<Utc>,
        authorize: F,
    ) -> Result<(Booking, Vec<String>), BookingError>
    where
        F: FnOnce(&Booking) -> Result<(), BookingError>,
    {
        let property_id = self
            .bookings
            .get(&id)
            .map(|entry| entry.booking.property_id)
            .ok_or_else(|| BookingError::not_found("booking", id))?;

        let mut calendar = self.calendars.entry(property_id).or_default();
        let cancelled = self.update(id, |record| {
            authorize(&record.booking)?;
            ensure_cancellable(&record.booking)?;

            record.booking.status = BookingStatus::Cancelled;
            let mut canceled_intents = Vec::new();
            for intent in record
                .intents
                .iter_mut()
                .filter(|intent| !intent.status.is_terminal())
            {
                intent.status = IntentStatus::Canceled;
                intent.updated_at = now;
                canceled_intents.push(intent.processor_id.clone());
            }
            Ok((record.booking.clone(), canceled_intents))
        })?;
        calendar.retain(|(booking_id, _)| *booking_id != id);

        Ok(cancelled)
    }

    /// Snapshot of every booking record
    pub fn all(&self) -> Vec<BookingRecord> {
        self.bookings
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }
}

/// Only bookings still waiting for payment can be cancelled
pub fn ensure_cancellable(booking: &Booking) -> Result<(), BookingError> {
    match booking.status {
        BookingStatus::PendingPayment => Ok(()),
        BookingStatus::Paid => Err(BookingError::state("Paid bookings cannot be cancelled")),
        BookingStatus::Cancelled => Err(BookingError::state("Booking is already cancelled")),
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
