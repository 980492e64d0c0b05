//! Journal reader with iterator interface
//!
//! Provides a streaming iterator over workflow commands from a CSV journal.
//! Delegates CSV format concerns to the csv_format module.
//!
//! # Iterator Interface
//!
//! `JournalReader` implements `Iterator`, yielding
//! `Result<JournalEntry, BookingError>` for each data row:
//!
//! ```no_run
//! use rental_booking_engine::io::JournalReader;
//! use std::path::Path;
//!
//! let reader = JournalReader::new(Path::new("journal.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(entry) => println!("command: {:?}", entry),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, unreadable file) are returned from `new()`
//! - Individual row errors are yielded as `BookingError::Parse` with the line
//!   number, and iteration continues with the next row

use crate::io::csv_format::{convert_journal_record, JournalEntry, JournalRecord};
use crate::types::BookingError;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Streaming journal reader
///
/// Reads one row at a time; memory use does not grow with the journal.
///
/// # Examples
///
/// ```
/// use rental_booking_engine::io::{JournalEntry, JournalReader};
///
/// let journal = "op,booking\nintent,1\nrefund,1\n";
/// let rows: Vec<_> = JournalReader::from_reader(journal.as_bytes()).collect();
///
/// assert_eq!(rows.len(), 2);
/// assert!(matches!(rows[0], Ok(JournalEntry::Intent { reference: 1 })));
/// assert!(rows[1].is_err());
/// ```
#[derive(Debug)]
pub struct JournalReader<R = File> {
    reader: csv::Reader<R>,
    line_num: u64,
}

impl JournalReader<File> {
    /// Open a journal file
    ///
    /// The reader trims whitespace from every field and accepts rows with
    /// fewer columns than the header, since most ops only use a few.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the CSV journal
    ///
    /// # Returns
    ///
    /// * `Ok(JournalReader)` - Reader positioned before the first data row
    /// * `Err(BookingError::Io)` - The file could not be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rental_booking_engine::io::JournalReader;
    /// use std::path::Path;
    ///
    /// let reader = JournalReader::new(Path::new("journal.csv")).unwrap();
    /// let entries: Vec<_> = reader.filter_map(Result::ok).collect();
    /// println!("parsed {} commands", entries.len());
    /// ```
    pub fn new(path: &Path) -> Result<Self, BookingError> {
        let file = File::open(path).map_err(|e| BookingError::Io {
            message: format!("Failed to open file '{}': {}", path.display(), e),
        })?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> JournalReader<R> {
    /// Read a journal from any byte source
    ///
    /// Uses the same CSV settings as [`JournalReader::new`].
    ///
    /// # Arguments
    ///
    /// * `source` - Anything implementing `Read`, including in-memory byte slices
    pub fn from_reader(source: R) -> Self {
        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(source);

        Self {
            reader,
            line_num: 1,
        }
    }
}

impl<R: Read> Iterator for JournalReader<R> {
    type Item = Result<JournalEntry, BookingError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<JournalRecord>();
        let row = deserializer.next()?;
        self.line_num += 1;

        Some(match row {
            Ok(record) => convert_journal_record(record)
                .map_err(|message| BookingError::parse(Some(self.line_num), message)),
            Err(e) => Err(BookingError::parse(
                Some(self.line_num),
                format!("CSV parse error: {}", e),
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str =
        "op,booking,property,check_in,check_out,guests,name,email,phone,birthday,amount,status\n";

    /// Helper function to create a temporary journal file for testing
    fn create_temp_csv(rows: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(HEADER.as_bytes())
            .expect("Failed to write to temp file");
        file.write_all(rows.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_reader_new_fails_on_missing_file() {
        let result = JournalReader::new(Path::new("nonexistent.csv"));
        match result {
            Err(BookingError::Io { message }) => assert!(message.contains("Failed to open file")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reader_iterates_workflow() {
        let file = create_temp_csv(
            "property,,7,,,4,Lakeside cabin,,,,125.00,\n\
             book,1,7,2031-06-01,2031-06-07,2,Ada Guest,ada@example.com,+250700000000,1990-01-01,,\n\
             intent,1,,,,,,,,,,\n\
             confirm,1,,,,,,,,,,pm_card_visa\n",
        );

        let entries: Vec<_> = JournalReader::new(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(entries.len(), 4);
        assert!(matches!(entries[0], JournalEntry::Property { id: 7, .. }));
        assert!(matches!(entries[1], JournalEntry::Book { reference: 1, .. }));
        assert_eq!(entries[2], JournalEntry::Intent { reference: 1 });
        assert_eq!(
            entries[3],
            JournalEntry::Confirm {
                reference: 1,
                payment_method: Some("pm_card_visa".to_string()),
            }
        );
    }

    #[test]
    fn test_reader_accepts_short_rows() {
        let file = create_temp_csv("intent,3\ncancel,3\n");

        let entries: Vec<_> = JournalReader::new(file.path())
            .unwrap()
            .filter_map(Result::ok)
            .collect();

        assert_eq!(
            entries,
            vec![
                JournalEntry::Intent { reference: 3 },
                JournalEntry::Cancel { reference: 3 },
            ]
        );
    }

    #[test]
    fn test_reader_includes_line_numbers_in_errors() {
        let file = create_temp_csv("intent,1\nrefund,1\nintent,abc\ncancel,1\n");

        let results: Vec<_> = JournalReader::new(file.path()).unwrap().collect();

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        match &results[1] {
            Err(BookingError::Parse { line, message }) => {
                assert_eq!(*line, Some(3));
                assert!(message.contains("Invalid op"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &results[2] {
            Err(BookingError::Parse { line, message }) => {
                assert_eq!(*line, Some(4));
                assert!(message.contains("CSV parse error"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(results[3].is_ok());
    }

    #[test]
    fn test_reader_handles_whitespace() {
        let file = create_temp_csv("  webhook  ,  2  ,,,,,,,,,,  succeeded  \n");

        let entries: Vec<_> = JournalReader::new(file.path())
            .unwrap()
            .filter_map(Result::ok)
            .collect();

        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], JournalEntry::Webhook { reference: 2, .. }));
    }

    #[test]
    fn test_reader_handles_empty_journal() {
        let file = create_temp_csv("");
        assert_eq!(JournalReader::new(file.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_reader_from_bytes() {
        let journal = format!("{}access,5,,,,,,guest@example.com,,,,\n", HEADER);

        let entries: Vec<_> = JournalReader::from_reader(journal.as_bytes())
            .filter_map(Result::ok)
            .collect();

        assert_eq!(
            entries,
            vec![JournalEntry::Access {
                reference: 5,
                email: "guest@example.com".to_string(),
            }]
        );
    }
}
