//! Guest booking strategy
//!
//! The owner of a guest booking is the dormant account bound to the guest's
//! email, created on the spot if this is the first booking for that email.

use crate::core::IdentityResolver;
use crate::strategy::TenantStrategy;
use crate::types::{Account, BookingError, ContactInfo};

/// Strategy for callers without an account
#[derive(Debug, Clone)]
pub struct GuestBookingStrategy {
    contact: ContactInfo,
}

impl GuestBookingStrategy {
    pub fn new(contact: ContactInfo) -> Self {
        Self { contact }
    }
}

impl TenantStrategy for GuestBookingStrategy {
    fn resolve_owner(&self, identity: &IdentityResolver) -> Result<Account, BookingError> {
        identity.resolve_or_create_guest(&self.contact)
    }

    fn guest_checkout(&self) -> bool {
        true
    }

    fn label(&self) -> &'static str {
        "guest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::sync::Arc;

    #[test]
    fn test_guest_owner_is_dormant_account() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2031, 6, 1, 0, 0, 0).unwrap());
        let identity = IdentityResolver::new(Arc::new(clock), 18);
        let strategy = GuestBookingStrategy::new(ContactInfo {
            full_name: "Ada Guest".to_string(),
            email: "ada@example.com".to_string(),
            phone_number: "+250700000000".to_string(),
            birthday: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        });

        let owner = strategy.resolve_owner(&identity).unwrap();

        assert!(owner.is_dormant());
        assert_eq!(identity.find_by_email("ada@example.com"), Some(owner));
    }
}
