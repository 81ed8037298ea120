//! Read state machine: CSV rows to a token stream.
//!
//! Each row becomes an object keyed by schema column names, or an array of
//! values when the schema has no columns. With `wrap_as_array` the whole
//! document is wrapped in one more array.
//!
//! Errors inside a row leave the parser ready to skip the rest of that row:
//! the next call to [`CsvParser::next_token`] closes the row frame and
//! parsing continues with the following row. Header errors are fatal and
//! close the parser.

use crate::decoder::{CsvDecoder, DecoderSettings, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_CELL_LEN};
use crate::error::{CsvError, Location, MappingError, MappingErrorKind, Result};
use crate::features::ReadFeatures;
use crate::pool::BufferPool;
use crate::schema::Schema;
use crate::token::{Scalar, Token, TokenKind};
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Parser construction options.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub features: ReadFeatures,
    /// Longest cell accepted, in bytes.
    pub max_cell_len: usize,
    pub buffer_size: usize,
    /// Drop the source once input is exhausted or the parser is closed.
    pub auto_close_source: bool,
    pub pool: Option<Arc<BufferPool>>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            features: ReadFeatures::default(),
            max_cell_len: DEFAULT_MAX_CELL_LEN,
            buffer_size: DEFAULT_BUFFER_SIZE,
            auto_close_source: true,
            pool: None,
        }
    }
}

impl ParserConfig {
    pub fn with_features(mut self, features: ReadFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = Some(pool);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    DocStart,
    RecordStart,
    NextEntry,
    NamedValue,
    UnnamedValue,
    InArray,
    SkipExtraColumns,
    MissingName,
    MissingValue,
    DocEnd,
    Closed,
}

/// Open structure on the token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Document,
    ObjectRow,
    ArrayRow,
    Cell,
}

impl Frame {
    fn end_kind(self) -> TokenKind {
        match self {
            Frame::ObjectRow => TokenKind::EndObject,
            Frame::Document | Frame::ArrayRow | Frame::Cell => TokenKind::EndArray,
        }
    }
}

/// Pull parser producing [`Token`]s from CSV input.
pub struct CsvParser<R> {
    decoder: CsvDecoder<R>,
    schema: Option<Schema>,
    features: ReadFeatures,
    max_cell_len: usize,

    state: State,
    after_array: State,
    frames: Vec<Frame>,
    current: Option<TokenKind>,

    column_index: usize,
    current_name: String,
    current_value: String,

    array_value: String,
    array_separator: Option<String>,
    /// Start of the next element; `None` once the last one was returned.
    array_cursor: Option<usize>,
}

impl<R> std::fmt::Debug for CsvParser<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvParser")
            .field("state", &self.state)
            .field("depth", &self.frames.len())
            .field("column_index", &self.column_index)
            .finish()
    }
}

impl<R: Read> CsvParser<R> {
    /// Parser without a schema; [`Self::set_schema`] must be called before
    /// the first token can be read.
    pub fn new(source: R, config: ParserConfig) -> Self {
        let settings =
            DecoderSettings::from_schema(&Schema::empty(), &config.features, config.max_cell_len);
        let decoder = CsvDecoder::with_buffer(
            source,
            settings,
            config.pool.as_ref(),
            config.buffer_size,
            config.auto_close_source,
        );
        Self {
            decoder,
            schema: None,
            features: config.features,
            max_cell_len: config.max_cell_len,
            state: State::DocStart,
            after_array: State::NextEntry,
            frames: Vec::new(),
            current: None,
            column_index: 0,
            current_name: String::new(),
            current_value: String::new(),
            array_value: String::new(),
            array_separator: None,
            array_cursor: None,
        }
    }

    pub fn with_schema(source: R, schema: Schema, config: ParserConfig) -> Self {
        let mut parser = Self::new(source, config);
        parser.set_schema(schema);
        parser
    }

    /// Attach or replace the schema. Decoding rules change from the next
    /// cell on.
    pub fn set_schema(&mut self, schema: Schema) {
        self.decoder.reconfigure(DecoderSettings::from_schema(
            &schema,
            &self.features,
            self.max_cell_len,
        ));
        debug!(columns = %schema.column_desc(), "CSV parser schema set");
        self.schema = Some(schema);
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn features(&self) -> ReadFeatures {
        self.features
    }

    pub fn override_features(&mut self, features: ReadFeatures) {
        self.features = features;
        let settings = match &self.schema {
            Some(schema) => DecoderSettings::from_schema(schema, &features, self.max_cell_len),
            None => DecoderSettings::from_schema(&Schema::empty(), &features, self.max_cell_len),
        };
        self.decoder.reconfigure(settings);
    }

    // ========================================================================
    // Token access
    // ========================================================================

    /// Advance to the next token; `None` once the document is exhausted.
    pub fn next_token(&mut self) -> Result<Option<Token<'_>>> {
        if self.schema.is_none() && self.state != State::Closed {
            return Err(self.mapping_error(
                MappingErrorKind::SchemaNotSet,
                self.decoder.current_location(),
            ));
        }
        let in_header = self.state == State::DocStart;
        match self.advance() {
            Ok(kind) => {
                self.current = kind;
                Ok(self.current_token())
            }
            Err(err) => {
                self.current = None;
                if err.is_fatal() || in_header {
                    warn!(error = %err, "CSV parser closed after error");
                    self.close();
                }
                Err(err)
            }
        }
    }

    pub fn current_token(&self) -> Option<Token<'_>> {
        self.current.map(|kind| match kind {
            TokenKind::StartObject => Token::StartObject,
            TokenKind::EndObject => Token::EndObject,
            TokenKind::StartArray => Token::StartArray,
            TokenKind::EndArray => Token::EndArray,
            TokenKind::FieldName => Token::FieldName(&self.current_name),
            TokenKind::Value => Token::Value(Scalar::new(&self.current_value)),
            TokenKind::Null => Token::Null,
        })
    }

    pub fn current_kind(&self) -> Option<TokenKind> {
        self.current
    }

    /// Name of the field being read, while inside an object row.
    pub fn current_name(&self) -> Option<&str> {
        let in_object = self.frames.contains(&Frame::ObjectRow);
        (in_object && !self.current_name.is_empty()).then_some(self.current_name.as_str())
    }

    /// Text of the current field name or value.
    pub fn text(&self) -> Option<&str> {
        match self.current? {
            TokenKind::FieldName => Some(&self.current_name),
            TokenKind::Value => Some(&self.current_value),
            _ => None,
        }
    }

    /// Number of open structures.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Report whether the current token starts an array, turning a plain
    /// string value into an array split on the schema's default element
    /// separator when possible.
    pub fn expect_start_array(&mut self) -> bool {
        match self.current {
            Some(TokenKind::StartArray) => true,
            Some(TokenKind::Value)
                if matches!(self.state, State::NextEntry | State::UnnamedValue) =>
            {
                let separator = self
                    .schema
                    .as_ref()
                    .and_then(Schema::array_element_separator)
                    .map(str::to_owned);
                let after = self.state;
                self.start_array(separator, after);
                self.current = Some(TokenKind::StartArray);
                true
            }
            _ => false,
        }
    }

    /// Discard tokens until the nesting depth drops to `depth`.
    ///
    /// Malformed cells met on the way are skipped with the rest of their
    /// row.
    pub fn resync(&mut self, depth: usize) -> Result<()> {
        while self.depth() > depth && !self.is_closed() {
            if self.next_token()?.is_none() {
                break;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Position and lifecycle
    // ========================================================================

    pub fn current_location(&self) -> Location {
        self.decoder.current_location()
    }

    /// Start of the most recent cell.
    pub fn token_location(&self) -> Location {
        self.decoder.token_location()
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Stop parsing and release the input buffer. Idempotent.
    pub fn close(&mut self) {
        self.decoder.close();
        self.state = State::Closed;
        self.frames.clear();
    }

    /// The source, when it was not auto-closed.
    pub fn into_inner(self) -> Option<R> {
        self.decoder.into_inner()
    }

    // ========================================================================
    // State machine
    // ========================================================================

    fn advance(&mut self) -> Result<Option<TokenKind>> {
        match self.state {
            State::DocStart => self.handle_start_doc(),
            State::RecordStart => self.handle_record_start().map(Some),
            State::NextEntry => self.handle_next_entry(),
            State::NamedValue => self.handle_named_value().map(Some),
            State::UnnamedValue => self.handle_unnamed_value().map(Some),
            State::InArray => Ok(Some(self.handle_array_value())),
            State::SkipExtraColumns => self.handle_skip_row().map(Some),
            State::MissingValue => {
                self.state = State::MissingName;
                self.current_value.clear();
                Ok(Some(TokenKind::Null))
            }
            State::MissingName => {
                self.column_index += 1;
                if self.column_index < self.column_count() {
                    self.set_column_name(self.column_index);
                    self.state = State::MissingValue;
                    return Ok(Some(TokenKind::FieldName));
                }
                self.end_row().map(Some)
            }
            State::DocEnd => Ok(self.handle_doc_end()),
            State::Closed => Ok(None),
        }
    }

    fn handle_start_doc(&mut self) -> Result<Option<TokenKind>> {
        let (use_header, skip_first) = match &self.schema {
            Some(schema) => (schema.uses_header(), schema.skips_first_data_row()),
            None => (false, false),
        };
        self.decoder.skip_lines_when_needed()?;
        if use_header && self.decoder.has_more_input()? {
            self.read_header()?;
            self.decoder.start_new_line()?;
        }
        if skip_first && self.decoder.has_more_input()? {
            self.decoder.skip_line()?;
            self.decoder.skip_lines_when_needed()?;
        }

        let has_more = self.decoder.has_more_input()?;
        if self.features.wrap_as_array {
            self.frames.push(Frame::Document);
            self.state = if has_more {
                State::RecordStart
            } else {
                State::DocEnd
            };
            return Ok(Some(TokenKind::StartArray));
        }
        if !has_more {
            self.state = State::DocEnd;
            return Ok(self.handle_doc_end());
        }
        self.handle_record_start().map(Some)
    }

    fn read_header(&mut self) -> Result<()> {
        let Some(schema) = self.schema.clone() else {
            return Ok(());
        };

        if !schema.is_empty() && !schema.reorders_columns() {
            if schema.strict_headers() {
                self.verify_header(&schema)?;
            } else {
                while self.decoder.next_string()?.is_some() {}
            }
            debug!("CSV header line matched against declared columns");
            return Ok(());
        }

        let mut builder = schema.rebuild().clear_columns();
        while let Some(name) = self.decoder.next_string()? {
            let name = name.trim();
            builder = match schema.column_by_name(name) {
                Some(declared) => builder.push_column(declared.clone()),
                None => builder.add_column(name),
            };
        }
        if self.features.allow_trailing_comma {
            builder = builder.drop_last_column_if_empty();
        }
        let header = builder.build();

        let location = self.decoder.current_location();
        if header.len() < 2 && header.column_name(0).is_none_or(|n| n.trim().is_empty()) {
            return Err(self.mapping_error(MappingErrorKind::EmptyHeader, location));
        }
        if self.features.fail_on_missing_header_columns && header.len() < schema.len() {
            let names: Vec<String> = schema
                .columns()
                .iter()
                .filter(|c| header.column_by_name(c.name()).is_none())
                .map(|c| c.name().to_string())
                .collect();
            if !names.is_empty() {
                return Err(
                    self.mapping_error(MappingErrorKind::MissingHeaderColumns { names }, location)
                );
            }
        }
        debug!(columns = %header.column_desc(), "CSV schema columns taken from header line");
        self.set_schema(header);
        Ok(())
    }

    fn verify_header(&mut self, schema: &Schema) -> Result<()> {
        for (i, column) in schema.columns().iter().enumerate() {
            let position = i + 1;
            let actual = self.decoder.next_string()?.map(str::to_owned);
            let location = self.decoder.token_location();
            match actual {
                None => {
                    return Err(self.mapping_error(
                        MappingErrorKind::MissingHeaderColumn {
                            position,
                            expected: column.name().to_string(),
                        },
                        location,
                    ));
                }
                Some(actual) if actual != column.name() => {
                    return Err(self.mapping_error(
                        MappingErrorKind::HeaderMismatch {
                            position,
                            expected: column.name().to_string(),
                            actual,
                        },
                        location,
                    ));
                }
                Some(_) => {}
            }
        }
        if let Some(name) = self.decoder.next_string()?.map(str::to_owned) {
            let location = self.decoder.token_location();
            return Err(self.mapping_error(MappingErrorKind::ExtraHeaderColumn { name }, location));
        }
        Ok(())
    }

    fn handle_record_start(&mut self) -> Result<TokenKind> {
        self.column_index = 0;
        self.current_name.clear();
        if self.column_count() == 0 {
            self.frames.push(Frame::ArrayRow);
            self.state = State::UnnamedValue;
            return Ok(TokenKind::StartArray);
        }
        self.frames.push(Frame::ObjectRow);
        self.state = State::NextEntry;
        Ok(TokenKind::StartObject)
    }

    fn handle_next_entry(&mut self) -> Result<Option<TokenKind>> {
        let got_value = match self.decoder.next_string() {
            Ok(Some(value)) => {
                self.current_value.clear();
                self.current_value.push_str(value);
                true
            }
            Ok(None) => false,
            Err(err) => {
                self.state = State::SkipExtraColumns;
                return Err(err);
            }
        };

        let count = self.column_count();
        if !got_value {
            if self.column_index < count {
                return self.handle_missing_columns();
            }
            return self.end_row().map(Some);
        }
        if self.column_index >= count {
            return self.handle_extra_column();
        }
        self.set_column_name(self.column_index);
        self.state = State::NamedValue;
        Ok(Some(TokenKind::FieldName))
    }

    fn handle_named_value(&mut self) -> Result<TokenKind> {
        self.state = State::NextEntry;
        let index = self.column_index;
        self.column_index += 1;

        let array_separator = self.schema.as_ref().and_then(|schema| {
            let column = schema.column(index).filter(|c| c.is_array())?;
            Some(
                column
                    .array_element_separator()
                    .or_else(|| schema.array_element_separator())
                    .map(str::to_owned),
            )
        });
        if let Some(separator) = array_separator {
            self.start_array(separator, State::NextEntry);
            return Ok(TokenKind::StartArray);
        }
        Ok(self.classify_value())
    }

    fn handle_unnamed_value(&mut self) -> Result<TokenKind> {
        match self.decoder.next_string() {
            Ok(Some(value)) => {
                self.current_value.clear();
                self.current_value.push_str(value);
                self.column_index += 1;
                Ok(self.classify_value())
            }
            Ok(None) => self.end_row(),
            Err(err) => {
                self.state = State::SkipExtraColumns;
                Err(err)
            }
        }
    }

    fn handle_missing_columns(&mut self) -> Result<Option<TokenKind>> {
        if self.features.fail_on_missing_columns {
            let kind = MappingErrorKind::MissingColumns {
                expected: self.column_count(),
                found: self.column_index,
            };
            let location = self.decoder.current_location();
            // Close the row first so reading can go on with the next one.
            self.end_row()?;
            return Err(self.mapping_error(kind, location));
        }
        if self.features.insert_nulls_for_missing_columns {
            self.set_column_name(self.column_index);
            self.state = State::MissingValue;
            return Ok(Some(TokenKind::FieldName));
        }
        self.end_row().map(Some)
    }

    fn handle_extra_column(&mut self) -> Result<Option<TokenKind>> {
        let any_property = self
            .schema
            .as_ref()
            .and_then(Schema::any_property_name)
            .map(str::to_owned);
        if let Some(name) = any_property {
            self.current_name = name;
            self.state = State::NamedValue;
            return Ok(Some(TokenKind::FieldName));
        }
        if self.features.ignore_trailing_unmappable {
            self.state = State::SkipExtraColumns;
            return self.handle_skip_row().map(Some);
        }
        if self.features.allow_trailing_comma && self.current_value.is_empty() {
            match self.decoder.next_string() {
                Ok(None) => return self.end_row().map(Some),
                Ok(Some(_)) => {}
                Err(err) => {
                    self.state = State::SkipExtraColumns;
                    return Err(err);
                }
            }
        }
        self.state = State::SkipExtraColumns;
        let kind = MappingErrorKind::TooManyColumns {
            expected: self.column_count(),
            position: self.column_index + 1,
            value: self.current_value.clone(),
        };
        Err(self.mapping_error(kind, self.decoder.token_location()))
    }

    fn handle_skip_row(&mut self) -> Result<TokenKind> {
        loop {
            match self.decoder.next_string() {
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(CsvError::Decode(err)) => {
                    trace!(error = %err, "skipping malformed cell");
                }
                Err(err) => return Err(err),
            }
        }
        trace!(line = self.decoder.current_row(), "skipped rest of CSV row");
        self.end_row()
    }

    fn handle_array_value(&mut self) -> TokenKind {
        let Some(start) = self.array_cursor else {
            self.frames.pop();
            self.state = self.after_array;
            return TokenKind::EndArray;
        };
        let rest = &self.array_value[start..];
        let found = self
            .array_separator
            .as_deref()
            .and_then(|sep| rest.find(sep).map(|offset| (offset, sep.len())));
        let end = match found {
            Some((offset, sep_len)) => {
                self.array_cursor = Some(start + offset + sep_len);
                start + offset
            }
            None => {
                self.array_cursor = None;
                self.array_value.len()
            }
        };
        let mut element = &self.array_value[start..end];
        if self.features.trim_spaces {
            element = element.trim_matches(|c: char| c == ' ' || c == '\t');
        }
        self.current_value.clear();
        self.current_value.push_str(element);
        self.classify_value()
    }

    fn handle_doc_end(&mut self) -> Option<TokenKind> {
        self.decoder.close();
        match self.frames.pop() {
            Some(frame) => Some(frame.end_kind()),
            None => {
                self.state = State::Closed;
                None
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Close the current row frame and move to the next row, if any.
    fn end_row(&mut self) -> Result<TokenKind> {
        let frame = self.frames.pop();
        self.state = State::DocEnd;
        if self.decoder.start_new_line()? {
            self.state = State::RecordStart;
        }
        Ok(frame.map_or(TokenKind::EndObject, Frame::end_kind))
    }

    fn start_array(&mut self, separator: Option<String>, after: State) {
        std::mem::swap(&mut self.array_value, &mut self.current_value);
        self.array_separator = separator.filter(|s| !s.is_empty());
        self.array_cursor = (!self.array_value.is_empty()).then_some(0);
        self.after_array = after;
        self.state = State::InArray;
        self.frames.push(Frame::Cell);
    }

    fn classify_value(&self) -> TokenKind {
        let is_null_marker = self
            .schema
            .as_ref()
            .and_then(Schema::null_value)
            .is_some_and(|marker| marker == self.current_value);
        if is_null_marker || (self.features.empty_string_as_null && self.current_value.is_empty())
        {
            TokenKind::Null
        } else {
            TokenKind::Value
        }
    }

    fn column_count(&self) -> usize {
        self.schema.as_ref().map_or(0, Schema::len)
    }

    fn set_column_name(&mut self, index: usize) {
        self.current_name.clear();
        if let Some(name) = self.schema.as_ref().and_then(|s| s.column_name(index)) {
            self.current_name.push_str(name);
        }
    }

    fn mapping_error(&self, kind: MappingErrorKind, location: Location) -> CsvError {
        MappingError::new(kind, location, self.schema.clone()).into()
    }
}
