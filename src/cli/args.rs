use crate::config::EngineConfig;
use clap::Parser;
use std::path::PathBuf;

/// Replay a booking journal through the booking and payment workflow
#[derive(Parser, Debug)]
#[command(name = "rental-booking-engine")]
#[command(about = "Replay a booking journal through the booking and payment workflow", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing journal rows
    #[arg(value_name = "INPUT", help = "Path to the input journal CSV file")]
    pub input_file: PathBuf,

    /// Publishable processor key returned to clients
    #[arg(
        long = "publishable-key",
        value_name = "KEY",
        env = "RENTAL_PUBLISHABLE_KEY",
        help = "Publishable processor key (default: pk_test_local)"
    )]
    pub publishable_key: Option<String>,

    /// Shared secret for webhook signatures
    #[arg(
        long = "webhook-secret",
        value_name = "SECRET",
        env = "RENTAL_WEBHOOK_SECRET",
        hide_env_values = true,
        help = "Webhook signing secret (default: whsec_local)"
    )]
    pub webhook_secret: Option<String>,

    /// Accepted webhook timestamp skew in seconds
    #[arg(
        long = "webhook-tolerance",
        value_name = "SECS",
        help = "Webhook timestamp tolerance in seconds (default: 300)"
    )]
    pub webhook_tolerance_secs: Option<u64>,

    /// Minimum age for guest bookings
    #[arg(
        long = "minimum-age",
        value_name = "YEARS",
        help = "Minimum guest age in years (default: 18)"
    )]
    pub minimum_guest_age: Option<u32>,

    /// Currency for properties declared in the journal
    #[arg(
        long = "currency",
        value_name = "CODE",
        help = "ISO currency code for journal properties (default: usd)"
    )]
    pub default_currency: Option<String>,

    /// Log filter directive
    #[arg(
        long = "log-level",
        value_name = "FILTER",
        env = "RENTAL_LOG_LEVEL",
        default_value = "warn",
        help = "Log filter, e.g. 'info' or 'rental_booking_engine=debug'"
    )]
    pub log_level: String,
}

impl CliArgs {
    /// Create an EngineConfig from CLI arguments
    ///
    /// Missing values fall back to defaults; invalid ones are replaced by
    /// defaults with a warning.
    pub fn to_engine_config(&self) -> EngineConfig {
        let default = EngineConfig::default();
        if self.publishable_key.is_none()
            && self.webhook_secret.is_none()
            && self.webhook_tolerance_secs.is_none()
            && self.minimum_guest_age.is_none()
            && self.default_currency.is_none()
        {
            return default;
        }

        EngineConfig::new(
            self.publishable_key
                .clone()
                .unwrap_or(default.publishable_key),
            self.webhook_secret.clone().unwrap_or(default.webhook_secret),
            self.webhook_tolerance_secs
                .unwrap_or(default.webhook_tolerance_secs),
            self.minimum_guest_age.unwrap_or(default.minimum_guest_age),
            self.default_currency
                .clone()
                .unwrap_or(default.default_currency),
        )
    }
}
