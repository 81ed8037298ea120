//! CSV rows as `serde_json::Value`s.
//!
//! [`JsonRows`] pulls one row at a time off a [`CsvParser`]. A row that fails
//! to bind is reported as an `Err` item and the parser is resynchronised to
//! the next row, so iteration can go on; after a fatal error the iterator
//! ends.

use std::io::Read;

use csvtok_core::{
    Column, ColumnType, CsvParser, NumberKind, ParserConfig, Scalar, Schema, Token,
    TokenKind,
};
use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use crate::error::{BindError, Result};

/// Outcome of one token inside a row.
enum Step {
    Name,
    Value(Value),
    Invalid(String),
    Array,
    End,
}

/// Iterator over the rows of a CSV document.
pub struct JsonRows<R> {
    parser: CsvParser<R>,
    base_depth: usize,
    started: bool,
    done: bool,
    rows_read: u64,
    rows_failed: u64,
}

impl<R: Read> JsonRows<R> {
    pub fn new(parser: CsvParser<R>) -> Self {
        Self {
            parser,
            base_depth: 0,
            started: false,
            done: false,
            rows_read: 0,
            rows_failed: 0,
        }
    }

    pub fn with_schema(source: R, schema: Schema, config: ParserConfig) -> Self {
        Self::new(CsvParser::with_schema(source, schema, config))
    }

    pub fn parser(&self) -> &CsvParser<R> {
        &self.parser
    }

    pub fn into_parser(self) -> CsvParser<R> {
        self.parser
    }

    /// Rows returned so far, not counting failed ones.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn rows_failed(&self) -> u64 {
        self.rows_failed
    }

    fn read_row(&mut self) -> Result<Option<Value>> {
        loop {
            let kind = match self.parser.next_token()? {
                Some(token) => token.kind(),
                None => return Ok(None),
            };
            let first = !self.started;
            self.started = true;
            match kind {
                TokenKind::StartArray if first && self.parser.features().wrap_as_array => {
                    self.base_depth = self.parser.depth();
                }
                TokenKind::StartObject => return self.read_object().map(Some),
                TokenKind::StartArray => return self.read_elements().map(Some),
                TokenKind::EndArray => return Ok(None),
                TokenKind::EndObject | TokenKind::FieldName | TokenKind::Value | TokenKind::Null => {}
            }
        }
    }

    fn read_object(&mut self) -> Result<Value> {
        let schema = self.parser.schema().cloned().unwrap_or_else(Schema::empty);
        let mut row = Map::new();
        let mut name = String::new();
        loop {
            let step = match self.parser.next_token()? {
                None | Some(Token::EndObject) => Step::End,
                Some(Token::FieldName(field)) => {
                    name.clear();
                    name.push_str(field);
                    Step::Name
                }
                Some(Token::Null) => Step::Value(Value::Null),
                Some(Token::Value(scalar)) => {
                    let column_type = schema
                        .column_by_name(&name)
                        .map(Column::column_type)
                        .unwrap_or_default();
                    match coerce(scalar, column_type) {
                        Some(value) => Step::Value(value),
                        None => Step::Invalid(scalar.as_str().to_owned()),
                    }
                }
                Some(Token::StartArray) => Step::Array,
                Some(Token::StartObject | Token::EndArray) => Step::Name,
            };
            match step {
                Step::Name => {}
                Step::Value(value) => {
                    row.insert(std::mem::take(&mut name), value);
                }
                Step::Invalid(value) => {
                    let expected = schema
                        .column_by_name(&name)
                        .map(Column::column_type)
                        .unwrap_or_default();
                    return Err(BindError::Coercion {
                        column: name,
                        value,
                        expected,
                        location: self.parser.token_location(),
                    });
                }
                Step::Array => {
                    let elements = self.read_elements()?;
                    row.insert(std::mem::take(&mut name), elements);
                }
                Step::End => return Ok(Value::Object(row)),
            }
        }
    }

    /// Elements up to the matching end of array, as strings and nulls.
    fn read_elements(&mut self) -> Result<Value> {
        let mut elements = Vec::new();
        loop {
            match self.parser.next_token()? {
                None | Some(Token::EndArray) => return Ok(Value::Array(elements)),
                Some(Token::Value(scalar)) => elements.push(Value::String(scalar.to_string())),
                Some(Token::Null) => elements.push(Value::Null),
                Some(_) => {}
            }
        }
    }

    fn recover(&mut self) {
        while let Err(err) = self.parser.resync(self.base_depth) {
            warn!(error = %err, "Skipping malformed input while recovering");
            if err.is_fatal() || self.parser.is_closed() {
                self.done = true;
                return;
            }
        }
    }
}

impl<R: Read> Iterator for JsonRows<R> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_row() {
            Ok(Some(row)) => {
                self.rows_read += 1;
                Some(Ok(row))
            }
            Ok(None) => {
                debug!(
                    rows = self.rows_read,
                    failed = self.rows_failed,
                    "CSV document exhausted"
                );
                self.done = true;
                None
            }
            Err(err) => {
                self.rows_failed += 1;
                if err.is_fatal() || self.parser.is_closed() {
                    self.done = true;
                } else {
                    debug!(error = %err, location = %self.parser.current_location(), "Recovering after bad row");
                    self.recover();
                }
                Some(Err(err))
            }
        }
    }
}

/// Typed value of a cell, or `None` when the text does not fit the type.
///
/// Empty cells in number and boolean columns read as `null`.
pub fn coerce(scalar: Scalar<'_>, column_type: ColumnType) -> Option<Value> {
    let text = scalar.as_str();
    match column_type {
        ColumnType::String | ColumnType::Array => Some(Value::String(text.to_owned())),
        ColumnType::Number | ColumnType::Boolean if scalar.as_str().trim().is_empty() => {
            Some(Value::Null)
        }
        ColumnType::Number => number(scalar),
        ColumnType::NumberOrString => {
            Some(number(scalar).unwrap_or_else(|| Value::String(text.to_owned())))
        }
        ColumnType::Boolean => scalar.parse_bool().map(Value::Bool),
        ColumnType::StringOrLiteral => Some(match text {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            _ => Value::String(text.to_owned()),
        }),
    }
}

fn number(scalar: Scalar<'_>) -> Option<Value> {
    match scalar.number_kind()? {
        NumberKind::Integer => scalar.parse_i64().map(Value::from),
        NumberKind::Float => scalar
            .parse_f64()
            .and_then(Number::from_f64)
            .map(Value::Number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csvtok_core::ReadFeatures;
    use serde_json::json;

    fn rows(input: &str, schema: Schema, features: ReadFeatures) -> Vec<Result<Value>> {
        let config = ParserConfig::default().with_features(features);
        JsonRows::with_schema(input.as_bytes(), schema, config).collect()
    }

    #[test]
    fn test_coerce_by_column_type() {
        let cases = [
            ("42", ColumnType::Number, Some(json!(42))),
            ("-1.5", ColumnType::Number, Some(json!(-1.5))),
            ("abc", ColumnType::Number, None),
            ("", ColumnType::Number, Some(Value::Null)),
            ("TRUE", ColumnType::Boolean, Some(json!(true))),
            ("maybe", ColumnType::Boolean, None),
            ("7", ColumnType::NumberOrString, Some(json!(7))),
            ("seven", ColumnType::NumberOrString, Some(json!("seven"))),
            ("null", ColumnType::StringOrLiteral, Some(Value::Null)),
            ("false", ColumnType::StringOrLiteral, Some(json!(false))),
            ("False", ColumnType::StringOrLiteral, Some(json!("False"))),
            ("42", ColumnType::String, Some(json!("42"))),
        ];
        for (text, column_type, expected) in cases {
            assert_eq!(
                coerce(Scalar::new(text), column_type),
                expected,
                "{text:?} as {column_type:?}"
            );
        }
    }

    #[test]
    fn test_object_rows_with_types() {
        let schema = Schema::builder()
            .add_number_column("id")
            .add_column("name")
            .add_boolean_column("active")
            .add_array_column("tags", None)
            .build();
        let got: Vec<Value> = rows("1,Ann,true,a;b\n2,Bob,false,\n", schema, ReadFeatures::default())
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(
            got,
            vec![
                json!({"id": 1, "name": "Ann", "active": true, "tags": ["a", "b"]}),
                json!({"id": 2, "name": "Bob", "active": false, "tags": []}),
            ]
        );
    }

    #[test]
    fn test_unnamed_rows_are_arrays() {
        let got: Vec<Value> = rows("a,b\nc\n", Schema::empty(), ReadFeatures::default())
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(got, vec![json!(["a", "b"]), json!(["c"])]);
    }

    #[test]
    fn test_wrapped_document_yields_rows() {
        let features = ReadFeatures::default().with_wrap_as_array(true);
        let got: Vec<Value> = rows("a,b\nc,d\n", Schema::empty(), features)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(got, vec![json!(["a", "b"]), json!(["c", "d"])]);
    }

    #[test]
    fn test_bad_row_is_reported_and_skipped() {
        let schema = Schema::builder().add_column("a").add_column("b").build();
        let mut iter = JsonRows::with_schema(
            &b"1,2\n3,4,5\n6,7\n"[..],
            schema,
            ParserConfig::default(),
        );
        assert_eq!(iter.next().unwrap().unwrap(), json!({"a": "1", "b": "2"}));
        assert!(matches!(iter.next(), Some(Err(BindError::Csv(_)))));
        assert_eq!(iter.next().unwrap().unwrap(), json!({"a": "6", "b": "7"}));
        assert!(iter.next().is_none());
        assert_eq!(iter.rows_read(), 2);
        assert_eq!(iter.rows_failed(), 1);
    }

    #[test]
    fn test_coercion_failure_skips_rest_of_row() {
        let schema = Schema::builder()
            .add_number_column("n")
            .add_column("s")
            .build();
        let got = rows("x,1\n2,ok\n", schema, ReadFeatures::default());
        assert_eq!(got.len(), 2);
        match &got[0] {
            Err(BindError::Coercion { column, value, .. }) => {
                assert_eq!(column, "n");
                assert_eq!(value, "x");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(got[1].as_ref().unwrap(), &json!({"n": 2, "s": "ok"}));
    }

    #[test]
    fn test_fatal_header_error_ends_iteration() {
        let schema = Schema::builder()
            .add_column("a")
            .add_column("b")
            .set_use_header(true)
            .set_strict_headers(true)
            .build();
        let got = rows("a,x\n1,2\n", schema, ReadFeatures::default());
        assert_eq!(got.len(), 1);
        assert!(got[0].as_ref().unwrap_err().is_fatal());
    }
}
