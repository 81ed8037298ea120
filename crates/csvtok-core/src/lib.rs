//! Streaming CSV tokenizer and generator driven by a column schema.
//!
//! This crate turns CSV text into a stream of structural and scalar tokens
//! and back, so that a data-binding layer can treat CSV like any other
//! structured format:
//!
//! - [`Schema`] - ordered columns plus document settings (separators,
//!   quoting, header handling), built once and copied on change
//! - [`CsvDecoder`] / [`CsvEncoder`] - cell-level reading and writing with
//!   quoting and escaping rules
//! - [`CsvParser`] - rows to [`Token`]s, with row-level error recovery
//! - [`CsvGenerator`] - structured writes to rows
//! - [`detect_format`] - cheap "is this CSV?" check on a byte prefix
//!
//! # Architecture
//!
//! ```text
//! CsvParser ──► CsvDecoder ──► io::Read
//!     │
//!     └── Schema, ReadFeatures
//!
//! CsvGenerator ──► CsvEncoder ──► io::Write
//!     │
//!     └── Schema, WriteFeatures
//! ```
//!
//! # Example
//!
//! ```rust
//! use csvtok_core::{CsvParser, ParserConfig, Schema, Token};
//!
//! let schema = Schema::builder().add_column("id").add_column("name").build();
//! let mut parser = CsvParser::with_schema(&b"1,Ann\n"[..], schema, ParserConfig::default());
//!
//! let mut names = Vec::new();
//! while let Some(token) = parser.next_token().unwrap() {
//!     if let Token::FieldName(name) = token {
//!         names.push(name.to_string());
//!     }
//! }
//! assert_eq!(names, ["id", "name"]);
//! ```

pub mod decoder;
pub mod detect;
pub mod encoder;
pub mod error;
pub mod features;
pub mod generator;
pub mod parser;
pub mod pool;
pub mod schema;
pub mod token;

// Re-exports for convenience
pub use decoder::{CsvDecoder, DecoderSettings};
pub use detect::{detect_format, MatchStrength};
pub use encoder::CsvEncoder;
pub use error::{
    CsvError, DecodeError, DecodeErrorKind, Location, MappingError, MappingErrorKind, Result,
    WriteError,
};
pub use features::{ReadFeatures, WriteFeatures};
pub use generator::{CsvGenerator, GeneratorConfig};
pub use parser::{CsvParser, ParserConfig};
pub use pool::{BufferPool, PooledBuffer};
pub use schema::{Column, ColumnType, Schema, SchemaBuilder, SchemaDefinition, SchemaError};
pub use token::{NumberKind, Scalar, Token, TokenKind};
