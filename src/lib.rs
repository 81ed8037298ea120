//! csvtok Library
//!
//! Streaming CSV tokenizer and generator, plus conversion between CSV and
//! JSON.
//!
//! # Crates
//!
//! - `csvtok_core` - schema, decoder/encoder, token parser and generator
//! - `csvtok_json` - binding of the token stream to `serde_json::Value`
//!
//! # CLI Usage
//!
//! ```bash
//! # CSV with a header line to NDJSON
//! csvtok to-json data.csv --header
//!
//! # JSON array to CSV, columns taken from a schema file
//! csvtok from-json rows.json --schema schema.yaml --output rows.csv
//!
//! # Check whether a file looks like CSV
//! csvtok detect data.csv --separator ';'
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

pub mod convert;

pub use csvtok_core;
pub use csvtok_json;

use csvtok_core::Schema;

#[derive(Parser, Clone, Debug, Default)]
pub struct FormatOpts {
    /// YAML schema file with columns and format settings
    #[arg(long, value_name = "PATH", env = "CSVTOK_SCHEMA")]
    pub schema: Option<PathBuf>,

    /// Column separator
    #[arg(long, value_name = "CHAR", env = "CSVTOK_SEPARATOR")]
    pub separator: Option<char>,

    /// Quote character
    #[arg(long, value_name = "CHAR", conflicts_with = "no_quote")]
    pub quote: Option<char>,

    /// Disable quoting
    #[arg(long)]
    pub no_quote: bool,

    /// Escape character (none by default)
    #[arg(long, value_name = "CHAR")]
    pub escape: Option<char>,

    /// Text standing for a null value
    #[arg(long)]
    pub null_value: Option<String>,

    /// Separator between the elements of array cells
    #[arg(long, value_name = "SEP")]
    pub array_separator: Option<String>,

    /// First line is a header with column names
    #[arg(long)]
    pub header: bool,

    /// Skip lines starting with '#'
    #[arg(long)]
    pub comments: bool,
}

impl FormatOpts {
    /// Schema file (if any) with the command-line overrides applied.
    pub fn to_schema(&self) -> anyhow::Result<Schema> {
        let mut schema = match &self.schema {
            Some(path) => Schema::from_file(path)
                .with_context(|| format!("Failed to load schema from {}", path.display()))?,
            None => Schema::empty(),
        };
        if let Some(separator) = self.separator {
            schema = schema.with_column_separator(ascii("separator", separator)?);
        }
        if self.no_quote {
            schema = schema.without_quote_char();
        } else if let Some(quote) = self.quote {
            schema = schema.with_quote_char(ascii("quote", quote)?);
        }
        if let Some(escape) = self.escape {
            schema = schema.with_escape_char(ascii("escape", escape)?);
        }
        if let Some(null_value) = &self.null_value {
            schema = schema.with_null_value(null_value.as_str());
        }
        if let Some(separator) = &self.array_separator {
            schema = schema.with_array_element_separator(separator.as_str());
        }
        if self.header {
            schema = schema.with_header();
        }
        if self.comments {
            schema = schema.with_comments(true);
        }
        Ok(schema)
    }
}

fn ascii(option: &str, value: char) -> anyhow::Result<u8> {
    if !value.is_ascii() {
        bail!("--{option} must be an ASCII character, got '{value}'");
    }
    Ok(value as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        format: FormatOpts,
    }

    fn parse(args: &[&str]) -> FormatOpts {
        let mut argv = vec!["test"];
        argv.extend_from_slice(args);
        Wrapper::try_parse_from(argv).unwrap().format
    }

    #[test]
    fn test_defaults_give_empty_schema() {
        let schema = parse(&[]).to_schema().unwrap();
        assert!(schema.is_empty());
        assert_eq!(schema.column_separator(), b',');
        assert_eq!(schema.quote_char(), Some(b'"'));
        assert!(!schema.uses_header());
    }

    #[test]
    fn test_overrides() {
        let schema = parse(&[
            "--separator",
            ";",
            "--no-quote",
            "--escape",
            "\\",
            "--null-value",
            "NULL",
            "--header",
        ])
        .to_schema()
        .unwrap();
        assert_eq!(schema.column_separator(), b';');
        assert_eq!(schema.quote_char(), None);
        assert_eq!(schema.escape_char(), Some(b'\\'));
        assert_eq!(schema.null_value(), Some("NULL"));
        assert!(schema.uses_header());
    }

    #[test]
    fn test_non_ascii_separator_is_rejected() {
        let err = parse(&["--separator", "§"]).to_schema().unwrap_err();
        assert!(err.to_string().contains("--separator"));
    }

    #[test]
    fn test_quote_conflicts_with_no_quote() {
        assert!(Wrapper::try_parse_from(["test", "--quote", "'", "--no-quote"]).is_err());
    }
}
