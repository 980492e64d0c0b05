//! Booking-related types for the rental booking engine
//!
//! This module defines properties (as seen by the booking core), stays,
//! bookings and the form payloads accepted by the booking operations.

use super::account::{AccountId, ContactInfo};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Booking identifier
pub type BookingId = u64;

/// Property identifier
pub type PropertyId = u64;

/// Snapshot of a listing handed to the booking core by the property catalog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub id: PropertyId,
    pub title: String,
    pub nightly_rate: Decimal,
    /// Lowercase ISO currency code charged for this property
    pub currency: String,
    pub max_guests: u32,
    /// Approved and published; anything else rejects new bookings
    pub bookable: bool,
}

/// Half-open stay interval `[check_in, check_out)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self {
            check_in,
            check_out,
        }
    }

    /// Number of nights; zero or negative for malformed stays
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Whether two stays share at least one night
    ///
    /// A check-out on the same day as another stay's check-in is not an overlap.
    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Created, waiting for a successful payment
    PendingPayment,

    /// Payment reconciled; terminal
    Paid,

    /// Cancelled before payment; terminal, frees the calendar slot
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "pending_payment",
            BookingStatus::Paid => "paid",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the booking still occupies its dates
    pub fn holds_dates(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

/// Guest contact snapshot stored on the booking
///
/// May differ from the owning account's identity (someone booking for a
/// friend, for instance).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// A reservation of one property for one stay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    pub id: BookingId,
    pub property_id: PropertyId,
    pub account_id: AccountId,
    pub stay: Stay,
    pub guests: u32,
    pub guest: GuestContact,
    pub special_requests: Option<String>,
    /// Made through the guest path; only these bookings accept guest payments
    pub guest_checkout: bool,
    /// Nights × nightly rate at creation time
    pub total_price: Decimal,
    pub currency: String,
    pub status: BookingStatus,
    pub paid_at: Option<DateTime<Utc>>,
    /// Processor id of the intent that paid this booking
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Booking fields shared by the guest and authenticated creation paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingForm {
    pub property_id: PropertyId,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub guests: u32,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: String,
    #[serde(default)]
    pub special_requests: Option<String>,
}

impl BookingForm {
    pub fn stay(&self) -> Stay {
        Stay::new(self.check_in_date, self.check_out_date)
    }

    pub fn guest_contact(&self) -> GuestContact {
        GuestContact {
            name: self.guest_name.trim().to_string(),
            email: self.guest_email.trim().to_string(),
            phone: self.guest_phone.trim().to_string(),
        }
    }
}

/// Guest booking payload: the booking form plus the mandatory identity bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestBookingForm {
    #[serde(flatten)]
    pub booking: BookingForm,
    pub user_info: ContactInfo,
}

/// Minimal property view nested in booking and intent responses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySummary {
    pub id: PropertyId,
    pub title: String,
}

/// Booking view nested in payment intent responses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingSummary {
    pub id: BookingId,
    pub property: PropertySummary,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
}

/// Booking view returned by guest access
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub property: PropertySummary,
    pub duration_days: i64,
    pub is_paid: bool,
}
