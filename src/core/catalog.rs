//! In-memory property catalog
//!
//! Stands in for the property service when the engine runs on its own (the
//! journal replay tool, tests). Listings are plain snapshots keyed by id.

use super::traits::PropertyCatalog;
use crate::types::{Property, PropertyId};
use dashmap::DashMap;

/// Thread-safe listing store
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    properties: DashMap<PropertyId, Property>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a listing
    pub fn upsert(&self, property: Property) {
        tracing::debug!(property_id = property.id, bookable = property.bookable, "property upserted");
        self.properties.insert(property.id, property);
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl PropertyCatalog for InMemoryCatalog {
    fn property(&self, id: PropertyId) -> Option<Property> {
        self.properties.get(&id).map(|entry| entry.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn listing(id: PropertyId, rate: i64) -> Property {
        Property {
            id,
            title: format!("Listing {}", id),
            nightly_rate: Decimal::new(rate, 0),
            currency: "usd".to_string(),
            max_guests: 4,
            bookable: true,
        }
    }

    #[test]
    fn test_upsert_replaces_snapshot() {
        let catalog = InMemoryCatalog::new();
        assert!(catalog.is_empty());

        catalog.upsert(listing(1, 100));
        catalog.upsert(listing(1, 125));

        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.property(1).map(|p| p.nightly_rate),
            Some(Decimal::new(125, 0))
        );
        assert_eq!(catalog.property(2), None);
    }
}
