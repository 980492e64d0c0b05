//! Authenticated booking strategy
//!
//! The owner is the signed-in account itself. Only active tenants and
//! administrators may book; agents manage listings and never book them.

use crate::core::IdentityResolver;
use crate::strategy::TenantStrategy;
use crate::types::{Account, AccountId, BookingError, Role};

/// Strategy for callers with an authenticated account
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedBookingStrategy {
    account: AccountId,
}

impl AuthenticatedBookingStrategy {
    pub fn new(account: AccountId) -> Self {
        Self { account }
    }
}

impl TenantStrategy for AuthenticatedBookingStrategy {
    fn resolve_owner(&self, identity: &IdentityResolver) -> Result<Account, BookingError> {
        let account = identity
            .get(self.account)
            .ok_or_else(|| BookingError::not_found("account", self.account))?;

        if !account.active {
            return Err(BookingError::authorization("Account is not active"));
        }
        match account.role {
            Role::Tenant | Role::Admin => Ok(account),
            Role::Agent => Err(BookingError::authorization(
                "Only tenants can create bookings",
            )),
        }
    }

    fn guest_checkout(&self) -> bool {
        false
    }

    fn label(&self) -> &'static str {
        "authenticated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::identity::Registration;
    use crate::types::ErrorKind;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rstest::rstest;
    use std::sync::Arc;

    fn identity() -> IdentityResolver {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2031, 6, 1, 0, 0, 0).unwrap());
        IdentityResolver::new(Arc::new(clock), 18)
    }

    fn register(identity: &IdentityResolver, role: Role) -> Account {
        identity
            .register_account(Registration {
                email: "user@example.com".to_string(),
                full_name: "Registered User".to_string(),
                phone_number: "+1".to_string(),
                birthday: None,
                role,
            })
            .unwrap()
    }

    #[rstest]
    #[case::tenant(Role::Tenant, None)]
    #[case::admin(Role::Admin, None)]
    #[case::agent(Role::Agent, Some(ErrorKind::Authorization))]
    fn test_role_gate(#[case] role: Role, #[case] expected_error: Option<ErrorKind>) {
        let identity = identity();
        let account = register(&identity, role);

        let result = AuthenticatedBookingStrategy::new(account.id).resolve_owner(&identity);

        assert_eq!(result.err().map(|e| e.kind()), expected_error);
    }

    #[test]
    fn test_dormant_account_cannot_book_as_authenticated() {
        let identity = identity();
        let dormant = identity
            .resolve_or_create_guest(&crate::types::ContactInfo {
                full_name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                phone_number: "+1".to_string(),
                birthday: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            })
            .unwrap();

        let result = AuthenticatedBookingStrategy::new(dormant.id).resolve_owner(&identity);

        assert!(matches!(result, Err(BookingError::Authorization { .. })));
    }

    #[test]
    fn test_unknown_account_is_not_found() {
        let result = AuthenticatedBookingStrategy::new(7).resolve_owner(&identity());
        assert_eq!(result, Err(BookingError::not_found("account", 7)));
    }
}
