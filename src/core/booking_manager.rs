//! Booking creation and cancellation
//!
//! The `BookingManager` validates a booking form against the property
//! catalog and the clock, resolves the owning account through the tenant
//! strategy picked for the request, and reserves the stay on the ledger.
//! Creating a booking has no payment side effects. Cancelling one cancels
//! its open payment intent with the processor before the dates are freed.

use super::identity::IdentityResolver;
use super::ledger::{ensure_cancellable, Ledger};
use super::traits::{Clock, PropertyCatalog};
use crate::processor::PaymentProcessor;
use crate::strategy::{create_strategy, BookingCreationRequest};
use crate::types::account::is_valid_email;
use crate::types::{
    normalize_email, AccountId, Booking, BookingDetails, BookingError, BookingForm, BookingId,
    BookingStatus, Property, PropertySummary, Stay,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Coordinates booking validation, ownership and calendar reservation
pub struct BookingManager {
    catalog: Arc<dyn PropertyCatalog>,
    identity: Arc<IdentityResolver>,
    ledger: Arc<Ledger>,
    processor: Arc<dyn PaymentProcessor>,
    clock: Arc<dyn Clock>,
}

impl BookingManager {
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

    /// Create a booking in `pending_payment`
    ///
    /// The form is validated before the owner is resolved, so an invalid
    /// guest form never creates a dormant account.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the property or the authenticated account is unknown
    /// - `Validation` for bad dates, guest counts, contact data or an unbookable property
    /// - `Authorization` if the authenticated account may not book
    /// - `Conflict` if the stay overlaps an existing booking
    pub fn create_booking(
        &self,
        request: BookingCreationRequest,
        form: BookingForm,
    ) -> Result<Booking, BookingError> {
        let property = self.validate_form(&form)?;
        let stay = form.stay();
        let total_price = stay_price(&property, &stay)?;

        let strategy = create_strategy(request);
        let owner = strategy.resolve_owner(&self.identity)?;

        let now = self.clock.now();
        let guest = form.guest_contact();
        let special_requests = form
            .special_requests
            .as_deref()
            .map(str::trim)
            .filter(|note| !note.is_empty())
            .map(str::to_string);

        let booking = self.ledger.insert_booking(property.id, stay, |id| Booking {
            id,
            property_id: property.id,
            account_id: owner.id,
            stay,
            guests: form.guests,
            guest,
            special_requests,
            guest_checkout: strategy.guest_checkout(),
            total_price,
            currency: property.currency.clone(),
            status: BookingStatus::PendingPayment,
            paid_at: None,
            payment_intent_id: None,
            created_at: now,
        });

        match &booking {
            Ok(booking) => tracing::info!(
                booking_id = booking.id,
                property_id = booking.property_id,
                account_id = booking.account_id,
                path = strategy.label(),
                nights = stay.nights(),
                total = %booking.total_price,
                "booking created"
            ),
            Err(e) => tracing::warn!(
                property_id = property.id,
                path = strategy.label(),
                error = %e,
                "booking rejected"
            ),
        }
        booking
    }

    /// Cancel a booking that has not been paid yet
    ///
    /// The requester must own the booking or be an administrator. An open
    /// payment intent is cancelled with the processor first, so its client
    /// secret can no longer capture funds for a cancelled booking.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the requester or the booking is unknown
    /// - `Authorization` if the requester neither owns the booking nor is an admin
    /// - `State` if the booking is already paid or cancelled
    /// - `Processor` if the processor refuses to cancel the intent, for
    ///   instance because the payer already completed it; the booking is
    ///   left pending
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        requester: AccountId,
    ) -> Result<Booking, BookingError> {
        let requester = self
            .identity
            .get(requester)
            .ok_or_else(|| BookingError::not_found("account", requester))?;
        let authorize = |booking: &Booking| {
            if booking.account_id == requester.id || requester.is_admin() {
                Ok(())
            } else {
                Err(BookingError::authorization(
                    "You can only cancel your own bookings",
                ))
            }
        };

        let snapshot = self
            .ledger
            .get(booking_id)
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;
        authorize(&snapshot.booking)?;
        ensure_cancellable(&snapshot.booking)?;

        let open_intent = snapshot
            .active_intent()
            .map(|intent| intent.processor_id.clone());
        if let Some(intent_id) = &open_intent {
            self.cancel_with_processor(booking_id, intent_id).await?;
        }

        let (cancelled, canceled_intents) =
            self.ledger.cancel(booking_id, self.clock.now(), authorize)?;

        // An intent opened between the snapshot and the cancel
        for intent_id in canceled_intents
            .iter()
            .filter(|id| open_intent.as_deref() != Some(id.as_str()))
        {
            self.cancel_with_processor(booking_id, intent_id).await?;
        }

        tracing::info!(booking_id, account_id = requester.id, "booking cancelled");
        Ok(cancelled)
    }

    async fn cancel_with_processor(
        &self,
        booking_id: BookingId,
        intent_id: &str,
    ) -> Result<(), BookingError> {
        match self.processor.cancel_intent(intent_id).await {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::error!(
                    booking_id,
                    intent_id,
                    error = %e,
                    "processor refused to cancel payment intent"
                );
                Err(e.into())
            }
        }
    }

    /// Booking details for a guest who proves knowledge of the booking email
    ///
    /// An unknown booking and a wrong email produce the same `NotFound`
    /// error, so the response does not reveal which bookings exist.
    pub fn guest_access(
        &self,
        booking_id: BookingId,
        guest_email: &str,
    ) -> Result<BookingDetails, BookingError> {
        let booking = self
            .ledger
            .booking(booking_id)
            .ok_or_else(|| BookingError::not_found("booking", booking_id))?;

        if normalize_email(&booking.guest.email) != normalize_email(guest_email) {
            tracing::warn!(booking_id, "guest access denied: email mismatch");
            return Err(BookingError::not_found("booking", booking_id));
        }

        tracing::info!(booking_id, "guest booking access");
        let title = self
            .catalog
            .property(booking.property_id)
            .map(|property| property.title)
            .unwrap_or_default();
        Ok(BookingDetails {
            property: PropertySummary {
                id: booking.property_id,
                title,
            },
            duration_days: booking.stay.nights(),
            is_paid: booking.status == BookingStatus::Paid,
            booking,
        })
    }

    fn validate_form(&self, form: &BookingForm) -> Result<Property, BookingError> {
        let property = self
            .catalog
            .property(form.property_id)
            .ok_or_else(|| BookingError::not_found("property", form.property_id))?;

        if !property.bookable {
            return Err(BookingError::validation(
                "This property is not available for booking",
            ));
        }
        if form.check_out_date <= form.check_in_date {
            return Err(BookingError::validation(
                "Check-out date must be after check-in date",
            ));
        }
        if form.check_in_date < self.clock.today() {
            return Err(BookingError::validation(
                "Check-in date cannot be in the past",
            ));
        }
        if form.guests < 1 {
            return Err(BookingError::validation("At least one guest is required"));
        }
        if form.guests > property.max_guests {
            return Err(BookingError::validation(format!(
                "This property can accommodate at most {} guests",
                property.max_guests
            )));
        }
        if form.guest_name.trim().is_empty() {
            return Err(BookingError::validation("Guest name is required"));
        }
        if !is_valid_email(&form.guest_email) {
            return Err(BookingError::validation(
                "Enter a valid guest email address",
            ));
        }
        if form.guest_phone.trim().is_empty() {
            return Err(BookingError::validation("Guest phone is required"));
        }

        Ok(property)
    }
}

/// Nights × nightly rate, rounded to cents
pub fn stay_price(property: &Property, stay: &Stay) -> Result<Decimal, BookingError> {
    Decimal::from(stay.nights())
        .checked_mul(property.nightly_rate)
        .map(|total| total.round_dp(2))
        .ok_or_else(|| BookingError::validation("Booking total is out of range"))
}
