//! I/O module
//!
//! Handles journal CSV parsing and booking state output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, output serialization)
//! - `sync_reader` - Streaming journal reader with iterator interface

pub mod csv_format;
pub mod sync_reader;

pub use csv_format::{
    convert_journal_record, write_bookings_csv, BookingRef, JournalEntry, JournalRecord,
};
pub use sync_reader::JournalReader;
