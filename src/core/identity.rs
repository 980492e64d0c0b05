//! Identity resolution for guest and authenticated payers
//!
//! Every booking is owned by an [`Account`]. Guests never log in, so the
//! resolver binds their email to a *dormant* account (`active == false`) the
//! first time they book, and hands the same account back on every later
//! booking with that email.
//!
//! # Thread Safety
//!
//! Accounts live in a `DashMap`; a second map indexes them by normalized
//! email. Creation holds the email entry while it allocates the account, so
//! concurrent guest bookings with one email end up on a single account.
//!
//! Lock order: email index → accounts → customer index.

use super::traits::Clock;
use crate::processor::{CustomerParams, PaymentProcessor};
use crate::types::account::is_valid_email;
use crate::types::{normalize_email, Account, AccountId, BookingError, ContactInfo, Role};
use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Profile submitted by the authentication layer when a user signs up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub full_name: String,
    pub phone_number: String,
    pub birthday: Option<NaiveDate>,
    pub role: Role,
}

/// Finds or creates the account that owns a booking
pub struct IdentityResolver {
    accounts: DashMap<AccountId, Account>,
    /// Normalized email → account id
    by_email: DashMap<String, AccountId>,
    /// Processor customer id → account id
    by_customer: DashMap<String, AccountId>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
    minimum_age: u32,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("accounts", &self.accounts.len())
            .field("minimum_age", &self.minimum_age)
            .finish()
    }
}

impl IdentityResolver {
    pub fn new(clock: Arc<dyn Clock>, minimum_age: u32) -> Self {
        Self {
            accounts: DashMap::new(),
            by_email: DashMap::new(),
            by_customer: DashMap::new(),
            next_id: AtomicU64::new(1),
            clock,
            minimum_age,
        }
    }

    /// Return the account bound to the contact's email, creating a dormant one if needed
    ///
    /// An existing account is returned unchanged, active or not. The caller
    /// cannot tell whether the email was already known.
    ///
    /// # Errors
    ///
    /// `Validation` if the name or phone is blank, the email is malformed, or
    /// the guest is younger than the configured minimum age. No state is
    /// created in that case.
    pub fn resolve_or_create_guest(&self, contact: &ContactInfo) -> Result<Account, BookingError> {
        self.validate_contact(contact)?;

        let email = contact.normalized_email();
        let account_id = match self.by_email.entry(email.clone()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let account = Account {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst),
                    email,
                    full_name: contact.full_name.trim().to_string(),
                    phone_number: contact.phone_number.trim().to_string(),
                    birthday: Some(contact.birthday),
                    role: Role::Tenant,
                    active: false,
                    processor_customer_id: None,
                    credential: Some(generate_credential()),
                    created_at: self.clock.now(),
                };
                let id = account.id;
                self.accounts.insert(id, account);
                entry.insert(id);
                tracing::info!(account_id = id, "created dormant guest account");
                id
            }
        };

        self.get(account_id)
            .ok_or_else(|| BookingError::not_found("account", account_id))
    }

    /// Register a real (active) account
    ///
    /// A dormant account with the same email is activated in place, so
    /// bookings made as a guest stay with the person. Registering an email
    /// that already has an active account is rejected.
    pub fn register_account(&self, registration: Registration) -> Result<Account, BookingError> {
        if !is_valid_email(&registration.email) {
            return Err(BookingError::validation("Enter a valid email address"));
        }
        if registration.full_name.trim().is_empty() {
            return Err(BookingError::validation("Full name is required"));
        }

        let email = normalize_email(&registration.email);
        let account_id = match self.by_email.entry(email.clone()) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                let mut account = self
                    .accounts
                    .get_mut(&id)
                    .ok_or_else(|| BookingError::not_found("account", id))?;
                if account.active {
                    return Err(BookingError::validation(
                        "An account with this email already exists",
                    ));
                }
                account.active = true;
                account.full_name = registration.full_name.trim().to_string();
                account.phone_number = registration.phone_number.trim().to_string();
                account.birthday = registration.birthday.or(account.birthday);
                account.role = registration.role;
                account.credential = None;
                tracing::info!(account_id = id, "activated dormant account");
                id
            }
            Entry::Vacant(entry) => {
                let account = Account {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst),
                    email,
                    full_name: registration.full_name.trim().to_string(),
                    phone_number: registration.phone_number.trim().to_string(),
                    birthday: registration.birthday,
                    role: registration.role,
                    active: true,
                    processor_customer_id: None,
                    credential: None,
                    created_at: self.clock.now(),
                };
                let id = account.id;
                self.accounts.insert(id, account);
                entry.insert(id);
                tracing::info!(account_id = id, role = ?registration.role, "registered account");
                id
            }
        };

        self.get(account_id)
            .ok_or_else(|| BookingError::not_found("account", account_id))
    }

    pub fn get(&self, id: AccountId) -> Option<Account> {
        self.accounts.get(&id).map(|entry| entry.value().clone())
    }

    pub fn find_by_email(&self, email: &str) -> Option<Account> {
        let id = self.by_email.get(&normalize_email(email)).map(|entry| *entry)?;
        self.get(id)
    }

    /// Account owning a processor customer, for webhook routing
    pub fn account_for_customer(&self, customer_id: &str) -> Option<Account> {
        let id = self.by_customer.get(customer_id).map(|entry| *entry)?;
        self.get(id)
    }

    /// Processor customer id of the account, created on first use
    ///
    /// The processor call happens without holding any entry. If two callers
    /// race, the first id written is kept and returned to both.
    pub async fn ensure_customer(
        &self,
        account_id: AccountId,
        processor: &dyn PaymentProcessor,
    ) -> Result<String, BookingError> {
        let account = self
            .get(account_id)
            .ok_or_else(|| BookingError::not_found("account", account_id))?;
        if let Some(customer) = account.processor_customer_id {
            return Ok(customer);
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("account_id".to_string(), account_id.to_string());
        let created = processor
            .create_customer(CustomerParams {
                email: account.email.clone(),
                name: account.full_name.clone(),
                metadata,
            })
            .await?;

        let mut entry = self
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| BookingError::not_found("account", account_id))?;
        let customer = match &entry.processor_customer_id {
            Some(existing) => existing.clone(),
            None => {
                entry.processor_customer_id = Some(created.clone());
                self.by_customer.insert(created.clone(), account_id);
                tracing::debug!(account_id, customer_id = %created, "processor customer created");
                created
            }
        };
        Ok(customer)
    }

    fn validate_contact(&self, contact: &ContactInfo) -> Result<(), BookingError> {
        if contact.full_name.trim().is_empty() {
            return Err(BookingError::validation("Full name is required"));
        }
        if contact.phone_number.trim().is_empty() {
            return Err(BookingError::validation("Phone number is required"));
        }
        if !is_valid_email(&contact.email) {
            return Err(BookingError::validation("Enter a valid email address"));
        }
        let age = contact.age_on(self.clock.today());
        if age < self.minimum_age as i32 {
            return Err(BookingError::validation(format!(
                "You must be at least {} years old to book",
                self.minimum_age
            )));
        }
        Ok(())
    }
}

fn generate_credential() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::processor::MockProcessor;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn resolver() -> IdentityResolver {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2031, 6, 1, 9, 0, 0).unwrap());
        IdentityResolver::new(Arc::new(clock), 18)
    }

    fn contact(email: &str) -> ContactInfo {
        ContactInfo {
            full_name: "Ada Guest".to_string(),
            email: email.to_string(),
            phone_number: "+250700000000".to_string(),
            birthday: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        }
    }

    #[test]
    fn test_creates_dormant_tenant() {
        let resolver = resolver();

        let account = resolver.resolve_or_create_guest(&contact("Ada@Example.com")).unwrap();

        assert_eq!(account.email, "ada@example.com");
        assert!(account.is_dormant());
        assert_eq!(account.role, Role::Tenant);
        assert!(account.credential.is_some());
        assert_eq!(account.processor_customer_id, None);
    }

    #[test]
    fn test_same_email_resolves_to_same_account() {
        let resolver = resolver();

        let first = resolver.resolve_or_create_guest(&contact("ada@example.com")).unwrap();
        let second = resolver.resolve_or_create_guest(&contact("  ADA@example.com ")).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(resolver.accounts.len(), 1);
    }

    #[test]
    fn test_existing_active_account_is_returned_unchanged() {
        let resolver = resolver();
        let registered = resolver
            .register_account(Registration {
                email: "ada@example.com".to_string(),
                full_name: "Ada Lovelace".to_string(),
                phone_number: "+441234".to_string(),
                birthday: None,
                role: Role::Tenant,
            })
            .unwrap();

        let resolved = resolver.resolve_or_create_guest(&contact("ada@example.com")).unwrap();

        assert_eq!(resolved, registered);
        assert!(resolved.active);
    }

    #[rstest]
    #[case::blank_name(ContactInfo { full_name: " ".to_string(), ..contact("a@example.com") })]
    #[case::blank_phone(ContactInfo { phone_number: String::new(), ..contact("a@example.com") })]
    #[case::bad_email(contact("not-an-email"))]
    #[case::too_young(ContactInfo { birthday: NaiveDate::from_ymd_opt(2013, 6, 2).unwrap(), ..contact("a@example.com") })]
    fn test_invalid_contact_creates_nothing(#[case] info: ContactInfo) {
        let resolver = resolver();

        let result = resolver.resolve_or_create_guest(&info);

        assert!(matches!(result, Err(BookingError::Validation { .. })));
        assert!(resolver.accounts.is_empty());
        assert!(resolver.by_email.is_empty());
    }

    #[test]
    fn test_exactly_eighteen_today_is_accepted() {
        let resolver = resolver();
        let info = ContactInfo {
            birthday: NaiveDate::from_ymd_opt(2013, 6, 1).unwrap(),
            ..contact("teen@example.com")
        };

        assert!(resolver.resolve_or_create_guest(&info).is_ok());
    }

    #[test]
    fn test_register_activates_dormant_account() {
        let resolver = resolver();
        let dormant = resolver.resolve_or_create_guest(&contact("ada@example.com")).unwrap();

        let registered = resolver
            .register_account(Registration {
                email: "ADA@example.com".to_string(),
                full_name: "Ada Lovelace".to_string(),
                phone_number: "+441234".to_string(),
                birthday: None,
                role: Role::Tenant,
            })
            .unwrap();

        assert_eq!(registered.id, dormant.id);
        assert!(registered.active);
        assert_eq!(registered.credential, None);
        assert_eq!(registered.birthday, dormant.birthday);

        let again = resolver.register_account(Registration {
            email: "ada@example.com".to_string(),
            full_name: "Someone Else".to_string(),
            phone_number: String::new(),
            birthday: None,
            role: Role::Tenant,
        });
        assert!(matches!(again, Err(BookingError::Validation { .. })));
    }

    #[test]
    fn test_concurrent_resolution_creates_one_account() {
        use std::thread;

        let resolver = Arc::new(resolver());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                thread::spawn(move || {
                    resolver
                        .resolve_or_create_guest(&contact("race@example.com"))
                        .unwrap()
                        .id
                })
            })
            .collect();

        let ids: Vec<AccountId> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(resolver.accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_customer_is_cached() {
        let resolver = resolver();
        let processor = MockProcessor::new();
        let account = resolver.resolve_or_create_guest(&contact("ada@example.com")).unwrap();

        let first = resolver.ensure_customer(account.id, &processor).await.unwrap();
        let second = resolver.ensure_customer(account.id, &processor).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(processor.customer_count(), 1);
        assert_eq!(
            resolver.account_for_customer(&first).map(|a| a.id),
            Some(account.id)
        );
    }

    #[tokio::test]
    async fn test_ensure_customer_unknown_account() {
        let resolver = resolver();
        let processor = MockProcessor::new();

        let result = resolver.ensure_customer(42, &processor).await;

        assert_eq!(result, Err(BookingError::not_found("account", 42)));
    }
}
