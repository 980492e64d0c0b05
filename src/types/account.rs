//! Account-related types for the rental booking engine
//!
//! An [`Account`] is the identity anchor of every booking. Guests get a
//! dormant account (`active == false`) so the booking's owner reference never
//! changes type when the guest later registers.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Account identifier
pub type AccountId = u64;

/// Role tag carried by every account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Agent,
    Tenant,
}

/// Identity record, dormant or real
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: AccountId,

    /// Lowercased email, unique across all accounts
    pub email: String,

    pub full_name: String,

    pub phone_number: String,

    pub birthday: Option<NaiveDate>,

    pub role: Role,

    /// Whether the account can log in
    ///
    /// Accounts created for guest bookings start inactive and are only
    /// activated by the out-of-scope registration flow.
    pub active: bool,

    /// Customer id assigned by the payment processor, created lazily
    pub processor_customer_id: Option<String>,

    /// Generated credential for dormant accounts; never serialized or logged
    #[serde(skip)]
    pub(crate) credential: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Whether this account is a dormant placeholder created for a guest
    pub fn is_dormant(&self) -> bool {
        !self.active
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Contact details submitted with a guest booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub birthday: NaiveDate,
}

impl ContactInfo {
    /// Email normalized for identity lookups
    pub fn normalized_email(&self) -> String {
        normalize_email(&self.email)
    }

    /// Age in completed years on the given day
    pub fn age_on(&self, today: NaiveDate) -> i32 {
        let mut age = today.year() - self.birthday.year();
        if (today.month(), today.day()) < (self.birthday.month(), self.birthday.day()) {
            age -= 1;
        }
        age
    }
}

/// Lowercase and trim an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal structural email check: one `@`, non-empty local part, dotted domain
///
/// The trimmed address must be 3 to 255 bytes long.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if !(3..=255).contains(&email.len()) || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn contact(birthday: NaiveDate) -> ContactInfo {
        ContactInfo {
            full_name: "Ada Guest".to_string(),
            email: "Ada@Example.com".to_string(),
            phone_number: "+250700000000".to_string(),
            birthday,
        }
    }

    #[rstest]
    #[case::day_before_birthday(NaiveDate::from_ymd_opt(2008, 6, 2).unwrap(), 17)]
    #[case::on_birthday(NaiveDate::from_ymd_opt(2008, 6, 1).unwrap(), 18)]
    #[case::long_ago(NaiveDate::from_ymd_opt(1990, 12, 31).unwrap(), 35)]
    fn test_age_on(#[case] birthday: NaiveDate, #[case] expected: i32) {
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        assert_eq!(contact(birthday).age_on(today), expected);
    }

    #[test]
    fn test_normalized_email() {
        let info = contact(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap());
        assert_eq!(info.normalized_email(), "ada@example.com");
    }

    #[rstest]
    #[case("guest@example.com", true)]
    #[case("  guest@example.com ", true)]
    #[case("guest@example", false)]
    #[case("@example.com", false)]
    #[case("guest example@example.com", false)]
    #[case("guest@@example.com", false)]
    #[case("guest@example.", false)]
    #[case("", false)]
    #[case("a@", false)]
    fn test_is_valid_email(#[case] email: &str, #[case] valid: bool) {
        assert_eq!(is_valid_email(email), valid);
    }

    #[test]
    fn test_email_length_limit() {
        let longest = format!("{}@example.com", "a".repeat(243));
        let too_long = format!("{}@example.com", "a".repeat(244));

        assert_eq!(longest.len(), 255);
        assert!(is_valid_email(&longest));
        assert!(!is_valid_email(&too_long));
    }
}
