//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account identity types and contact info
//! - `booking`: Properties, stays, bookings and booking forms
//! - `payment`: Payment intent mirror, receipts, payment methods and response shapes
//! - `error`: Error taxonomy for the booking engine

pub mod account;
pub mod booking;
pub mod error;
pub mod payment;

pub use account::{normalize_email, Account, AccountId, ContactInfo, Role};
pub use booking::{
    Booking, BookingDetails, BookingForm, BookingId, BookingStatus, BookingSummary,
    GuestBookingForm, GuestContact, Property, PropertyId, PropertySummary, Stay,
};
pub use error::{BookingError, ErrorBody, ErrorKind};
pub use payment::{
    CallerKind, ClientSecret, ConfirmRequest, ConfirmationReport, IntentDetails, IntentStatus,
    Payment, PaymentId, PaymentIntent, PaymentMethod, PaymentMethodSave, PublicKey, QuickIntent,
    ReconcileOutcome, WebhookAck, WebhookAction,
};
