//! Rental Booking Engine Library
//! # Overview
//!
//! Booking and payment-confirmation workflow for a rental marketplace:
//! guests and signed-in tenants book properties, pay through an external
//! payment processor, and have their bookings marked paid exactly once no
//! matter how many confirmation signals arrive.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Account, Booking, PaymentIntent, errors)
//! - [`config`] - Engine configuration
//! - [`core`] - Workflow components:
//!   - [`core::identity`] - Dormant and registered account resolution
//!   - [`core::booking_manager`] - Booking creation, cancellation, guest access
//!   - [`core::orchestrator`] - Payment intent creation and reuse
//!   - [`core::reconciler`] - Idempotent payment confirmation
//!   - [`core::ledger`] - Bookings, calendars and intent mirrors
//! - [`strategy`] - Guest and authenticated owner resolution
//! - [`processor`] - Payment processor contract, mock and webhooks
//! - [`service`] - Facade exposing every operation
//! - [`io`] / [`replay`] - CSV journal replay used by the CLI
//!
//! # Booking Lifecycle
//!
//! - **pending_payment**: Dates are held; a payment intent may be opened
//! - **paid**: A payment intent succeeded; terminal for this workflow
//! - **cancelled**: Dates released; only pending bookings can be cancelled

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod processor;
pub mod replay;
pub mod service;
pub mod strategy;
pub mod types;

pub use config::EngineConfig;
pub use io::write_bookings_csv;
pub use service::BookingService;
pub use types::{
    Account, AccountId, Booking, BookingError, BookingId, BookingStatus, IntentStatus,
    PaymentIntent, Property,
};
