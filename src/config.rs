//! Engine configuration
//!
//! `EngineConfig` holds the deployment settings the booking workflow needs:
//! processor keys, webhook verification parameters and guest policy. Invalid
//! values never abort start-up; they fall back to the defaults with a warning.

use crate::processor::webhook::DEFAULT_TOLERANCE_SECS;

/// Settings shared by every workflow component
#[derive(Clone)]
pub struct EngineConfig {
    /// Publishable (client-side) processor key, safe to hand to browsers
    pub publishable_key: String,
    /// Webhook endpoint signing secret
    pub webhook_secret: String,
    /// Accepted clock skew for webhook signatures, in seconds
    pub webhook_tolerance_secs: u64,
    /// Minimum age in years for guests booking without an account
    pub minimum_guest_age: u32,
    /// Lowercase ISO currency used for listings that do not set one
    pub default_currency: String,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("publishable_key", &self.publishable_key)
            .field("webhook_secret", &"***")
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .field("minimum_guest_age", &self.minimum_guest_age)
            .field("default_currency", &self.default_currency)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            publishable_key: "pk_test_local".to_string(),
            webhook_secret: "whsec_local".to_string(),
            webhook_tolerance_secs: DEFAULT_TOLERANCE_SECS,
            minimum_guest_age: 18,
            default_currency: "usd".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a new EngineConfig with custom values
    pub fn new(
        publishable_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        webhook_tolerance_secs: u64,
        minimum_guest_age: u32,
        default_currency: impl Into<String>,
    ) -> Self {
        let default = Self::default();

        let publishable_key = publishable_key.into().trim().to_string();
        let publishable_key = if publishable_key.is_empty() {
            tracing::warn!("empty publishable_key, using default");
            default.publishable_key
        } else {
            publishable_key
        };

        let webhook_secret = webhook_secret.into();
        let webhook_secret = if webhook_secret.trim().is_empty() {
            tracing::warn!("empty webhook_secret, using default");
            default.webhook_secret
        } else {
            webhook_secret
        };

        let webhook_tolerance_secs = if webhook_tolerance_secs == 0 {
            tracing::warn!(
                default = default.webhook_tolerance_secs,
                "invalid webhook_tolerance_secs (0), using default"
            );
            default.webhook_tolerance_secs
        } else {
            webhook_tolerance_secs
        };

        let minimum_guest_age = if minimum_guest_age == 0 || minimum_guest_age > 120 {
            tracing::warn!(
                minimum_guest_age,
                default = default.minimum_guest_age,
                "invalid minimum_guest_age, using default"
            );
            default.minimum_guest_age
        } else {
            minimum_guest_age
        };

        let default_currency = default_currency.into().trim().to_lowercase();
        let default_currency = if default_currency.len() == 3
            && default_currency.chars().all(|c| c.is_ascii_alphabetic())
        {
            default_currency
        } else {
            tracing::warn!(
                currency = %default_currency,
                default = %default.default_currency,
                "invalid default_currency, using default"
            );
            default.default_currency
        };

        Self {
            publishable_key,
            webhook_secret,
            webhook_tolerance_secs,
            minimum_guest_age,
            default_currency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_valid_values_are_kept() {
        let config = EngineConfig::new("pk_live_1", "whsec_1", 60, 21, "EUR");

        assert_eq!(config.publishable_key, "pk_live_1");
        assert_eq!(config.webhook_secret, "whsec_1");
        assert_eq!(config.webhook_tolerance_secs, 60);
        assert_eq!(config.minimum_guest_age, 21);
        assert_eq!(config.default_currency, "eur");
    }

    #[rstest]
    #[case::empty_key("", "whsec_1", 60, 21, "usd")]
    #[case::empty_secret("pk_1", "  ", 60, 21, "usd")]
    #[case::zero_tolerance("pk_1", "whsec_1", 0, 21, "usd")]
    #[case::zero_age("pk_1", "whsec_1", 60, 0, "usd")]
    #[case::absurd_age("pk_1", "whsec_1", 60, 200, "usd")]
    #[case::bad_currency("pk_1", "whsec_1", 60, 21, "dollars")]
    fn test_invalid_values_fall_back(
        #[case] key: &str,
        #[case] secret: &str,
        #[case] tolerance: u64,
        #[case] age: u32,
        #[case] currency: &str,
    ) {
        let default = EngineConfig::default();
        let config = EngineConfig::new(key, secret, tolerance, age, currency);

        assert!(!config.publishable_key.is_empty());
        assert!(!config.webhook_secret.trim().is_empty());
        assert!(config.webhook_tolerance_secs > 0);
        assert!((1..=120).contains(&config.minimum_guest_age));
        assert_eq!(config.default_currency.len(), 3);
        if key.is_empty() {
            assert_eq!(config.publishable_key, default.publishable_key);
        }
        if age == 0 || age > 120 {
            assert_eq!(config.minimum_guest_age, default.minimum_guest_age);
        }
    }

    #[test]
    fn test_debug_redacts_webhook_secret() {
        let config = EngineConfig::new("pk_1", "whsec_very_secret", 60, 18, "usd");
        assert!(!format!("{:?}", config).contains("whsec_very_secret"));
    }
}
