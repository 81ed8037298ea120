//! Error types for reading and writing CSV token streams.
//!
//! Three families of failures exist besides plain I/O:
//!
//! - [`DecodeError`] - malformed input (bad quoting, bad UTF-8, oversized
//!   cell). Fatal to the current row only; the parser resynchronises at the
//!   next row boundary.
//! - [`MappingError`] - input that is well-formed but does not fit the
//!   schema (column counts, header mismatches). Header errors are fatal to
//!   the whole stream.
//! - [`WriteError`] - structural misuse of the generator.

use crate::schema::Schema;
use std::fmt;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = CsvError> = std::result::Result<T, E>;

/// A 1-based line and column position in the input.
///
/// Columns count bytes from the start of the physical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: u64,
    pub column: u64,
}

impl Location {
    pub fn new(line: u64, column: u64) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line: {}, column: {}", self.line, self.column)
    }
}

// ============================================================================
// Decode errors
// ============================================================================

/// What went wrong while turning raw input into a cell value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeErrorKind {
    /// End of input reached inside a quoted value.
    #[error("Missing closing quote for value")]
    MissingClosingQuote,

    /// Something other than a separator or line end follows a closing quote.
    #[error("Expected separator ({separator:?}) or end-of-line after closing quote, found {found:?}")]
    ExpectedSeparator { separator: char, found: char },

    /// End of input reached right after an escape char.
    #[error("Unexpected end of input after escape character")]
    EofInEscape,

    /// A cell holds bytes that are not valid UTF-8.
    #[error("Invalid UTF-8 byte sequence in value")]
    InvalidUtf8,

    /// Input ends in the middle of a multi-byte UTF-8 character.
    #[error("Unexpected end of input in the middle of a multi-byte UTF-8 character")]
    TruncatedUtf8,

    /// A cell is longer than the configured maximum.
    #[error("Value length exceeds the maximum allowed ({max} bytes)")]
    CellTooLong { max: usize },
}

/// Malformed input at a specific location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} (at {location})")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub location: Location,
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, location: Location) -> Self {
        Self { kind, location }
    }
}

// ============================================================================
// Mapping errors
// ============================================================================

/// Which schema contract a row or header broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingErrorKind {
    /// A row has a value past the last declared column.
    #[error(
        "Too many entries: expected at most {expected} (value #{position} ({} chars) \"{value}\")",
        .value.chars().count()
    )]
    TooManyColumns {
        expected: usize,
        position: usize,
        value: String,
    },

    /// A row ended before all declared columns got a value.
    #[error("Not enough column values: expected {expected}, found {found}")]
    MissingColumns { expected: usize, found: usize },

    /// Strict headers: a header name differs from the declared one.
    #[error("Mismatched header column #{position}: expected \"{expected}\", actual \"{actual}\"")]
    HeaderMismatch {
        position: usize,
        expected: String,
        actual: String,
    },

    /// Strict headers: the header line ended early.
    #[error("Missing header column #{position}, expecting \"{expected}\"")]
    MissingHeaderColumn { position: usize, expected: String },

    /// Strict headers: the header line has more names than declared.
    #[error("Extra header column \"{name}\"")]
    ExtraHeaderColumn { name: String },

    /// The header line omits declared columns.
    #[error("Missing {} header column(s): {names:?}", .names.len())]
    MissingHeaderColumns { names: Vec<String> },

    /// The header line holds no usable names.
    #[error("Empty header line: can not bind data")]
    EmptyHeader,

    /// A token was requested before any schema was attached.
    #[error("No schema set: attach a schema before reading")]
    SchemaNotSet,
}

/// Input that does not fit the schema.
#[derive(Debug, Clone, Error)]
#[error("{kind} (at {location})")]
pub struct MappingError {
    pub kind: MappingErrorKind,
    pub location: Location,
    /// Schema in effect when the error was raised.
    pub schema: Option<Schema>,
}

impl MappingError {
    pub fn new(kind: MappingErrorKind, location: Location, schema: Option<Schema>) -> Self {
        Self {
            kind,
            location,
            schema,
        }
    }

    /// Header problems abort the whole read; row problems only the row.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            MappingErrorKind::HeaderMismatch { .. }
                | MappingErrorKind::MissingHeaderColumn { .. }
                | MappingErrorKind::ExtraHeaderColumn { .. }
                | MappingErrorKind::MissingHeaderColumns { .. }
                | MappingErrorKind::EmptyHeader
                | MappingErrorKind::SchemaNotSet
        )
    }
}

// ============================================================================
// Write errors
// ============================================================================

/// Structural misuse of the generator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("CSV generator does not support Object values for properties (nested Objects)")]
    NestedObject,

    #[error("CSV generator does not support nested Array values")]
    NestedArray,

    #[error(
        "CSV generator does not support Array values for properties without setting 'arrayElementSeparator' in schema"
    )]
    NoArraySeparator,

    #[error("Unrecognized column '{name}': known columns: {known}")]
    UnknownColumn { name: String, known: String },

    #[error("Schema specified that header line is to be written; but contains no column names")]
    EmptyHeader,

    #[error("No schema set: can not {action}")]
    SchemaNotSet { action: &'static str },

    #[error("Can not {action}, expecting field name")]
    ExpectingFieldName { action: &'static str },

    #[error("Can not write a field name, expecting a value")]
    UnexpectedFieldName,

    #[error("Current context not {expected} but {actual}")]
    UnbalancedEnd {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Generator already closed")]
    Closed,
}

// ============================================================================
// Top-level error
// ============================================================================

/// Any failure raised by this crate.
#[derive(Debug, Error)]
pub enum CsvError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CsvError {
    /// Location of the failure, when it came from reading.
    pub fn location(&self) -> Option<Location> {
        match self {
            CsvError::Decode(e) => Some(e.location),
            CsvError::Mapping(e) => Some(e.location),
            CsvError::Write(_) | CsvError::Io(_) => None,
        }
    }

    /// True when no further rows can be read after this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            CsvError::Decode(_) => false,
            CsvError::Mapping(e) => e.is_fatal(),
            CsvError::Write(_) | CsvError::Io(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_many_columns_message() {
        let err = MappingError::new(
            MappingErrorKind::TooManyColumns {
                expected: 2,
                position: 3,
                value: "3".to_string(),
            },
            Location::new(1, 5),
            None,
        );
        let msg = err.to_string();
        assert!(msg.contains("expected at most 2"), "{msg}");
        assert!(msg.contains("\"3\""), "{msg}");
        assert!(msg.contains("line: 1, column: 5"), "{msg}");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_header_errors_are_fatal() {
        let err: CsvError = MappingError::new(
            MappingErrorKind::HeaderMismatch {
                position: 1,
                expected: "a".to_string(),
                actual: "b".to_string(),
            },
            Location::new(1, 1),
            None,
        )
        .into();
        assert!(err.is_fatal());
        assert_eq!(err.location(), Some(Location::new(1, 1)));
    }

    #[test]
    fn test_decode_errors_are_row_scoped() {
        let err: CsvError =
            DecodeError::new(DecodeErrorKind::MissingClosingQuote, Location::new(4, 2)).into();
        assert!(!err.is_fatal());
        assert!(err.to_string().starts_with("Missing closing quote"));
    }
}
