//! Tenant strategy module for booking creation
//!
//! Guests and signed-in users create bookings through the same pipeline; the
//! only difference is how the owning account is obtained. This module
//! defines the Strategy pattern for that step so the booking manager can
//! select the right implementation at runtime from the request it receives.

use crate::core::IdentityResolver;
use crate::types::{Account, AccountId, BookingError, ContactInfo};

pub mod authenticated;
pub mod guest;

pub use authenticated::AuthenticatedBookingStrategy;
pub use guest::GuestBookingStrategy;

/// Who is asking for a booking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingCreationRequest {
    /// Anonymous caller; the identity bundle is mandatory
    Guest { contact: ContactInfo },
    /// Caller already authenticated by the out-of-scope auth layer
    Authenticated { account: AccountId },
}

/// Tenant strategy trait
///
/// Implementations resolve the account that will own a new booking. They
/// run after the booking form has been validated and before the calendar is
/// touched.
pub trait TenantStrategy: Send + Sync {
    /// Resolve (or create) the owning account
    ///
    /// The guest strategy binds the booking to the dormant account for the
    /// contact email, creating it on first use. The authenticated strategy
    /// returns the caller's own account after checking it may book.
    ///
    /// # Arguments
    ///
    /// * `identity` - Account store used to look up or create the owner
    ///
    /// # Returns
    ///
    /// * `Ok(Account)` - The account that will own the booking
    /// * `Err(BookingError)` - The caller may not book; nothing was reserved
    ///
    /// # Errors
    ///
    /// Returns `Validation`, `NotFound` or `Authorization` errors; in every
    /// error case no booking may be created.
    fn resolve_owner(&self, identity: &IdentityResolver) -> Result<Account, BookingError>;

    /// Whether bookings created by this strategy accept guest payments
    fn guest_checkout(&self) -> bool;

    /// Short label used in logs
    fn label(&self) -> &'static str;
}

/// Create a tenant strategy for the given request
///
/// This factory selects the owner-resolution step at runtime from who is
/// asking, so the booking manager runs one pipeline for both callers.
///
/// # Arguments
///
/// * `request` - Guest contact bundle or authenticated account id
///
/// # Returns
///
/// A boxed trait object implementing the TenantStrategy trait
///
/// # Examples
///
/// ```
/// use rental_booking_engine::strategy::{create_strategy, BookingCreationRequest};
///
/// let strategy = create_strategy(BookingCreationRequest::Authenticated { account: 42 });
/// assert_eq!(strategy.label(), "authenticated");
/// assert!(!strategy.guest_checkout());
/// ```
pub fn create_strategy(request: BookingCreationRequest) -> Box<dyn TenantStrategy> {
    match request {
        BookingCreationRequest::Guest { contact } => Box::new(GuestBookingStrategy::new(contact)),
        BookingCreationRequest::Authenticated { account } => {
            Box::new(AuthenticatedBookingStrategy::new(account))
        }
    }
}
