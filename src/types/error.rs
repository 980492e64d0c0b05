//! Error types for the rental booking engine
//!
//! This module defines the error taxonomy shared by every workflow component.
//! Each error carries a message that is safe to show to the end user; the
//! [`ErrorKind`] classification lets the boundary layer pick a response status
//! without inspecting variant payloads.
//!
//! # Error Categories
//!
//! - **Validation**: malformed or out-of-range input
//! - **NotFound**: unknown id, or an identity mismatch deliberately reported as absence
//! - **Conflict**: overlapping stay for the same property
//! - **State**: operation invalid for the entity's current status
//! - **Authorization**: guest/authenticated path mismatch, foreign booking
//! - **Processor**: external payment service failure (never retried here)
//! - **Io / Parse**: journal tooling failures

use crate::processor::ProcessorError;
use serde::Serialize;
use thiserror::Error;

/// Main error type for the booking engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BookingError {
    /// Input failed validation
    #[error("{message}")]
    Validation {
        /// User-facing description of the problem
        message: String,
    },

    /// Entity not found
    ///
    /// Also used when an identity check fails and the caller must not learn
    /// whether the entity exists.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of entity that was looked up
        entity: &'static str,
        /// Identifier used for the lookup
        id: String,
    },

    /// The requested stay overlaps an active booking
    #[error("Property {property} is not available from {check_in} to {check_out}")]
    Conflict {
        /// Property that is already booked
        property: u64,
        /// Requested check-in date
        check_in: String,
        /// Requested check-out date
        check_out: String,
    },

    /// Operation not allowed in the current status
    #[error("{message}")]
    State {
        /// Description of the rejected transition
        message: String,
    },

    /// Caller may not perform the operation
    #[error("{message}")]
    Authorization {
        /// Description of the rejection
        message: String,
    },

    /// The payment processor failed or rejected the request
    #[error("Payment processor error: {message}")]
    Processor {
        /// Description reported by the processor client
        message: String,
    },

    /// I/O error while reading or writing journal files
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error
        message: String,
    },

    /// Malformed journal record or webhook payload
    #[error("Parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

/// Classification of [`BookingError`] variants for boundary mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    State,
    Authorization,
    Processor,
    Internal,
}

impl ErrorKind {
    /// HTTP-style status code for this kind of failure
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation | ErrorKind::State => 400,
            ErrorKind::Authorization => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Processor => 502,
            ErrorKind::Internal => 500,
        }
    }
}

/// Response shape handed to the boundary layer for a failed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&BookingError> for ErrorBody {
    fn from(error: &BookingError) -> Self {
        let kind = error.kind();
        ErrorBody {
            status: kind.status_code(),
            kind,
            message: error.to_string(),
        }
    }
}

impl From<std::io::Error> for BookingError {
    fn from(error: std::io::Error) -> Self {
        BookingError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for BookingError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        BookingError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for BookingError {
    fn from(error: serde_json::Error) -> Self {
        BookingError::Parse {
            line: Some(error.line() as u64),
            message: error.to_string(),
        }
    }
}

impl From<ProcessorError> for BookingError {
    fn from(error: ProcessorError) -> Self {
        BookingError::Processor {
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl BookingError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::Validation { .. } => ErrorKind::Validation,
            BookingError::NotFound { .. } => ErrorKind::NotFound,
            BookingError::Conflict { .. } => ErrorKind::Conflict,
            BookingError::State { .. } => ErrorKind::State,
            BookingError::Authorization { .. } => ErrorKind::Authorization,
            BookingError::Processor { .. } => ErrorKind::Processor,
            BookingError::Io { .. } | BookingError::Parse { .. } => ErrorKind::Internal,
        }
    }

    /// Create a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        BookingError::Validation {
            message: message.into(),
        }
    }

    /// Create a NotFound error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BookingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a State error
    pub fn state(message: impl Into<String>) -> Self {
        BookingError::State {
            message: message.into(),
        }
    }

    /// Create an Authorization error
    pub fn authorization(message: impl Into<String>) -> Self {
        BookingError::Authorization {
            message: message.into(),
        }
    }

    /// Create a Parse error
    pub fn parse(line: Option<u64>, message: impl Into<String>) -> Self {
        BookingError::Parse {
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::validation(
        BookingError::validation("Check-out date must be after check-in date"),
        "Check-out date must be after check-in date"
    )]
    #[case::not_found(BookingError::not_found("booking", 999), "booking 999 not found")]
    #[case::conflict(
        BookingError::Conflict { property: 7, check_in: "2031-06-01".to_string(), check_out: "2031-06-07".to_string() },
        "Property 7 is not available from 2031-06-01 to 2031-06-07"
    )]
    #[case::processor(
        BookingError::Processor { message: "gateway timeout".to_string() },
        "Payment processor error: gateway timeout"
    )]
    #[case::parse_with_line(
        BookingError::parse(Some(4), "unknown op 'refund'"),
        "Parse error at line 4: unknown op 'refund'"
    )]
    #[case::parse_without_line(BookingError::parse(None, "bad header"), "Parse error: bad header")]
    fn test_error_display(#[case] error: BookingError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::validation(BookingError::validation("x"), 400)]
    #[case::state(BookingError::state("x"), 400)]
    #[case::authorization(BookingError::authorization("x"), 403)]
    #[case::not_found(BookingError::not_found("booking", 1), 404)]
    #[case::conflict(
        BookingError::Conflict { property: 1, check_in: String::new(), check_out: String::new() },
        409
    )]
    #[case::processor(BookingError::Processor { message: "x".to_string() }, 502)]
    #[case::io(BookingError::Io { message: "x".to_string() }, 500)]
    fn test_status_mapping(#[case] error: BookingError, #[case] status: u16) {
        assert_eq!(ErrorBody::from(&error).status, status);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: BookingError = io_error.into();
        assert!(matches!(error, BookingError::Io { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }

    #[test]
    fn test_processor_error_conversion() {
        let error: BookingError = ProcessorError::Timeout.into();
        assert_eq!(error.kind(), ErrorKind::Processor);
    }
}
