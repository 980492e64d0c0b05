//! Core traits for the booking workflow's external collaborators
//!
//! The booking core reads listings and the current time through these traits
//! so property management and wall-clock time stay outside of it.

use crate::types::{Property, PropertyId};
use chrono::{DateTime, NaiveDate, Utc};

/// Read access to the property catalog
///
/// Returns a snapshot of the listing; the booking core never mutates it.
pub trait PropertyCatalog: Send + Sync {
    /// Look up a property by id
    fn property(&self, id: PropertyId) -> Option<Property>;
}

/// Source of the current time
///
/// Injected wherever "today" matters (past check-in dates, guest age,
/// webhook timestamp tolerance).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar day in UTC
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}
