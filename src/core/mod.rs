//! Core business logic module
//!
//! This module contains the booking workflow components:
//! - `traits` - Collaborator abstractions (property catalog, clock)
//! - `clock` - System and manually driven clocks
//! - `catalog` - In-memory property catalog
//! - `identity` - Dormant/real account resolution
//! - `ledger` - Bookings, property calendars and payment intent mirrors
//! - `booking_manager` - Booking creation, cancellation and guest access
//! - `orchestrator` - Payment intent creation and reuse
//! - `reconciler` - Idempotent confirmation of payments
//! - `vault` - Saved payment methods

pub mod booking_manager;
pub mod catalog;
pub mod clock;
pub mod identity;
pub mod ledger;
pub mod orchestrator;
pub mod reconciler;
pub mod traits;
pub mod vault;

pub use booking_manager::BookingManager;
pub use catalog::InMemoryCatalog;
pub use clock::{FixedClock, SystemClock};
pub use identity::{IdentityResolver, Registration};
pub use ledger::{BookingRecord, Ledger};
pub use orchestrator::{Payer, PaymentOrchestrator};
pub use reconciler::ConfirmationReconciler;
pub use traits::{Clock, PropertyCatalog};
pub use vault::PaymentMethodVault;
