//! Rental Booking Engine CLI
//!
//! Replays a CSV journal of booking and payment commands through the booking
//! workflow and prints the final booking states.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- journal.csv > bookings.csv
//! cargo run -- --log-level info journal.csv > bookings.csv
//! RENTAL_WEBHOOK_SECRET=whsec_... cargo run -- journal.csv
//! ```
//!
//! Logs go to stderr so stdout only carries the CSV output.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, file not readable, etc.)

use rental_booking_engine::cli;
use rental_booking_engine::core::SystemClock;
use rental_booking_engine::replay::JournalReplay;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = cli::parse_args();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let replay = JournalReplay::new(args.to_engine_config(), Arc::new(SystemClock));

    let mut output = std::io::stdout();
    if let Err(e) = replay.process(&args.input_file, &mut output) {
        tracing::error!(error = %e, "journal replay failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
