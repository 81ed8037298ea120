//! Errors raised while binding CSV rows to JSON values.

use csvtok_core::{ColumnType, CsvError, Location};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BindError {
    #[error(transparent)]
    Csv(#[from] CsvError),

    /// A cell did not parse as its column type.
    #[error("Failed to parse \"{value}\" as {expected:?} for column \"{column}\" at {location}")]
    Coercion {
        column: String,
        value: String,
        expected: ColumnType,
        location: Location,
    },

    /// A JSON value that has no row representation.
    #[error("Cannot write {found} as {context}")]
    Unsupported {
        found: &'static str,
        context: &'static str,
    },
}

impl BindError {
    /// True when no further rows can be read after this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            BindError::Csv(err) => err.is_fatal(),
            BindError::Coercion { .. } | BindError::Unsupported { .. } => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BindError>;
