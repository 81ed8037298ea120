//! Binding between the csvtok token stream and `serde_json::Value`.
//!
//! - [`read`] - CSV rows to JSON values, typed by the schema's columns
//! - [`write`] - JSON values to CSV rows, plus schema derivation from a
//!   sample object

pub mod error;
pub mod read;
pub mod write;

pub use error::{BindError, Result};
pub use read::{coerce, JsonRows};
pub use write::{schema_from_sample, write_rows, write_value};
