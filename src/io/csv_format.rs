//! CSV format handling for journal records and booking output
//!
//! This module centralizes all CSV format concerns, providing:
//! - JournalRecord structure for deserialization
//! - Conversion from journal records to [`JournalEntry`] commands
//! - Booking state output serialization
//!
//! All functions are pure (no I/O) for easy testing.
//!
//! # Journal columns
//!
//! `op,booking,property,check_in,check_out,guests,name,email,phone,birthday,amount,status`
//!
//! Every op uses a subset of the columns; the rest may be left empty.
//!
//! | op         | columns used                                                           |
//! |------------|------------------------------------------------------------------------|
//! | `property` | `property`, `name` (title), `guests` (max), `amount` (nightly rate), `status` (`closed` to disable) |
//! | `book`     | `booking` (journal reference), `property`, dates, `guests`, `name`, `email`, `phone`, `birthday` (guest bookings only) |
//! | `intent`   | `booking`                                                              |
//! | `pay`      | `booking`, `status` (payment method token, optional)                   |
//! | `decline`  | `booking`                                                              |
//! | `confirm`  | `booking`, `status` (payment method token, optional)                   |
//! | `webhook`  | `booking`, `status` (`succeeded`, `failed` or `canceled`)              |
//! | `cancel`   | `booking`                                                              |
//! | `access`   | `booking`, `email`                                                     |

use crate::core::BookingRecord;
use crate::types::{BookingForm, IntentStatus, PropertyId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// Journal reference of a booking, local to one journal file
pub type BookingRef = u64;

/// CSV record structure for deserialization
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct JournalRecord {
    pub op: String,
    pub booking: Option<BookingRef>,
    pub property: Option<PropertyId>,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub guests: Option<u32>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birthday: Option<String>,
    pub amount: Option<String>,
    pub status: Option<String>,
}

/// One workflow command read from a journal
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    /// Add or replace a property in the catalog
    Property {
        id: PropertyId,
        title: String,
        nightly_rate: Decimal,
        max_guests: u32,
        bookable: bool,
    },
    /// Create a booking; a birthday makes it a guest booking
    Book {
        reference: BookingRef,
        form: BookingForm,
        birthday: Option<NaiveDate>,
    },
    /// Open a payment intent for the booking's owner
    Intent { reference: BookingRef },
    /// Payer completes the payment client-side at the processor
    Pay {
        reference: BookingRef,
        payment_method: Option<String>,
    },
    /// Payer's card is declined client-side
    Decline { reference: BookingRef },
    /// Explicit confirmation call by the payer
    Confirm {
        reference: BookingRef,
        payment_method: Option<String>,
    },
    /// Signed processor notification for the booking's latest intent
    Webhook {
        reference: BookingRef,
        status: IntentStatus,
    },
    /// Owner cancels the booking
    Cancel { reference: BookingRef },
    /// Guest looks the booking up by email
    Access { reference: BookingRef, email: String },
}

/// Convert a JournalRecord to a JournalEntry
///
/// Returns a message describing the first missing or malformed column.
pub fn convert_journal_record(record: JournalRecord) -> Result<JournalEntry, String> {
    let op = record.op.trim().to_lowercase();

    let entry = match op.as_str() {
        "property" => JournalEntry::Property {
            id: required(record.property, "property", &op)?,
            title: required_text(&record.name, "name", &op)?,
            nightly_rate: parse_amount(&record.amount)?
                .ok_or_else(|| missing("amount", &op))?,
            max_guests: required(record.guests, "guests", &op)?,
            bookable: !matches!(
                non_empty(&record.status).map(|s| s.to_lowercase()).as_deref(),
                Some("closed")
            ),
        },
        "book" => {
            let reference = required(record.booking, "booking", &op)?;
            let name = required_text(&record.name, "name", &op)?;
            let form = BookingForm {
                property_id: required(record.property, "property", &op)?,
                check_in_date: parse_date(&record.check_in, "check_in")?
                    .ok_or_else(|| missing("check_in", &op))?,
                check_out_date: parse_date(&record.check_out, "check_out")?
                    .ok_or_else(|| missing("check_out", &op))?,
                guests: required(record.guests, "guests", &op)?,
                guest_name: name,
                guest_email: required_text(&record.email, "email", &op)?,
                guest_phone: non_empty(&record.phone).unwrap_or_default().to_string(),
                special_requests: None,
            };
            JournalEntry::Book {
                reference,
                form,
                birthday: parse_date(&record.birthday, "birthday")?,
            }
        }
        "intent" => JournalEntry::Intent {
            reference: required(record.booking, "booking", &op)?,
        },
        "pay" => JournalEntry::Pay {
            reference: required(record.booking, "booking", &op)?,
            payment_method: non_empty(&record.status).map(str::to_string),
        },
        "decline" => JournalEntry::Decline {
            reference: required(record.booking, "booking", &op)?,
        },
        "confirm" => JournalEntry::Confirm {
            reference: required(record.booking, "booking", &op)?,
            payment_method: non_empty(&record.status).map(str::to_string),
        },
        "webhook" => {
            let reference = required(record.booking, "booking", &op)?;
            let status = match non_empty(&record.status).map(|s| s.to_lowercase()).as_deref() {
                Some("succeeded") => IntentStatus::Succeeded,
                Some("failed") | Some("payment_failed") => IntentStatus::Failed,
                Some("canceled") | Some("cancelled") => IntentStatus::Canceled,
                Some(other) => {
                    return Err(format!(
                        "Invalid webhook status '{}' for booking {}",
                        other, reference
                    ))
                }
                None => return Err(missing("status", &op)),
            };
            JournalEntry::Webhook { reference, status }
        }
        "cancel" => JournalEntry::Cancel {
            reference: required(record.booking, "booking", &op)?,
        },
        "access" => JournalEntry::Access {
            reference: required(record.booking, "booking", &op)?,
            email: required_text(&record.email, "email", &op)?,
        },
        _ => return Err(format!("Invalid op: '{}'", record.op)),
    };

    Ok(entry)
}

fn missing(column: &str, op: &str) -> String {
    format!("'{}' requires a {} column", op, column)
}

fn required<T>(value: Option<T>, column: &str, op: &str) -> Result<T, String> {
    value.ok_or_else(|| missing(column, op))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn required_text(value: &Option<String>, column: &str, op: &str) -> Result<String, String> {
    non_empty(value)
        .map(str::to_string)
        .ok_or_else(|| missing(column, op))
}

fn parse_amount(value: &Option<String>) -> Result<Option<Decimal>, String> {
    match non_empty(value) {
        Some(text) => Decimal::from_str(text)
            .map(Some)
            .map_err(|_| format!("Invalid amount '{}'", text)),
        None => Ok(None),
    }
}

fn parse_date(value: &Option<String>, column: &str) -> Result<Option<NaiveDate>, String> {
    match non_empty(value) {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| format!("Invalid {} '{}', expected YYYY-MM-DD", column, text)),
        None => Ok(None),
    }
}

/// Write final booking states to CSV format
///
/// Columns: booking, property, account, email, check_in, check_out, guests,
/// total, status, intent_status. Rows are sorted by booking id; the intent
/// status is the booking's most recent intent, empty if none was opened.
pub fn write_bookings_csv(
    records: &[BookingRecord],
    output: &mut dyn Write,
) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record([
            "booking",
            "property",
            "account",
            "email",
            "check_in",
            "check_out",
            "guests",
            "total",
            "status",
            "intent_status",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted: Vec<&BookingRecord> = records.iter().collect();
    sorted.sort_by_key(|record| record.booking.id);

    for record in sorted {
        let booking = &record.booking;
        writer
            .write_record(&[
                booking.id.to_string(),
                booking.property_id.to_string(),
                booking.account_id.to_string(),
                booking.guest.email.clone(),
                booking.stay.check_in.to_string(),
                booking.stay.check_out.to_string(),
                booking.guests.to_string(),
                format!("{:.2}", booking.total_price),
                booking.status.as_str().to_string(),
                record
                    .latest_intent()
                    .map(|intent| intent.status.as_str())
                    .unwrap_or_default()
                    .to_string(),
            ])
            .map_err(|e| format!("Failed to write booking record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
