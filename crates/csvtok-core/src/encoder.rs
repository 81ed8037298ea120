//! Low-level CSV encoder.
//!
//! Writes cells by column index and decides per cell whether quoting is
//! needed. Cells arriving ahead of the next column are held back and
//! written in schema order when the row ends.

use crate::error::{Result, WriteError};
use crate::features::WriteFeatures;
use crate::pool::{BufferPool, PooledBuffer};
use crate::schema::{ColumnType, Schema};
use crate::token::looks_numeric;
use std::io::Write;
use std::sync::Arc;
use tracing::{debug, trace};

/// Default number of bytes collected before the output is written.
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 16 * 1024;

/// Longest value the loose quoting check scans; longer values are quoted.
const MAX_QUOTE_CHECK: usize = 24;

/// A cell held back until its column comes up.
#[derive(Debug, Clone, PartialEq)]
enum Pending {
    Text(String),
    Number(String),
    Raw(String),
    Null,
}

#[derive(Debug, Clone, Copy)]
enum Cell<'a> {
    Text(&'a str),
    Number(&'a str),
    Raw(&'a str),
    Null,
}

impl Pending {
    fn as_cell(&self) -> Cell<'_> {
        match self {
            Pending::Text(s) => Cell::Text(s),
            Pending::Number(s) => Cell::Number(s),
            Pending::Raw(s) => Cell::Raw(s),
            Pending::Null => Cell::Null,
        }
    }
}

impl Cell<'_> {
    fn to_pending(self) -> Pending {
        match self {
            Cell::Text(s) => Pending::Text(s.to_string()),
            Cell::Number(s) => Pending::Number(s.to_string()),
            Cell::Raw(s) => Pending::Raw(s.to_string()),
            Cell::Null => Pending::Null,
        }
    }
}

/// Row-oriented cell writer over any [`Write`] target.
pub struct CsvEncoder<W: Write> {
    out: Option<W>,
    auto_close: bool,
    buf: PooledBuffer,
    flush_at: usize,
    closed: bool,

    schema: Schema,
    features: WriteFeatures,
    /// Bytes below this value may need quoting in loose mode.
    min_safe: u32,

    next_column: usize,
    pending: Vec<Option<Pending>>,
    last_pending: Option<usize>,
}

impl<W: Write> std::fmt::Debug for CsvEncoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvEncoder")
            .field("features", &self.features)
            .field("next_column", &self.next_column)
            .field("buffered", &self.buf.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl<W: Write> CsvEncoder<W> {
    pub fn new(out: W, schema: Schema, features: WriteFeatures) -> Self {
        Self::with_buffer(out, schema, features, None, DEFAULT_OUTPUT_BUFFER_SIZE, true)
    }

    /// Encoder whose output buffer comes from `pool` when given.
    pub fn with_buffer(
        out: W,
        schema: Schema,
        features: WriteFeatures,
        pool: Option<&Arc<BufferPool>>,
        buffer_size: usize,
        auto_close: bool,
    ) -> Self {
        let flush_at = buffer_size.max(1);
        Self {
            out: Some(out),
            auto_close,
            buf: PooledBuffer::acquire(pool, flush_at),
            flush_at,
            closed: false,
            min_safe: min_safe_char(&schema),
            schema,
            features,
            next_column: 0,
            pending: Vec::new(),
            last_pending: None,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn features(&self) -> WriteFeatures {
        self.features
    }

    /// Replace the schema; applies from the next cell on.
    pub fn set_schema(&mut self, schema: Schema) {
        self.min_safe = min_safe_char(&schema);
        self.schema = schema;
    }

    pub fn override_features(&mut self, features: WriteFeatures) {
        self.features = features;
    }

    /// Index of the column the next in-order cell goes to.
    pub fn next_column_index(&self) -> usize {
        self.next_column
    }

    // ========================================================================
    // Cells
    // ========================================================================

    pub fn write_string(&mut self, column: usize, value: &str) -> Result<()> {
        self.write_cell(column, Cell::Text(value))
    }

    /// Numeric text, unquoted unless numbers are always quoted.
    pub fn write_number(&mut self, column: usize, value: &str) -> Result<()> {
        self.write_cell(column, Cell::Number(value))
    }

    pub fn write_bool(&mut self, column: usize, value: bool) -> Result<()> {
        self.write_cell(column, Cell::Raw(if value { "true" } else { "false" }))
    }

    /// Writes the schema's null marker (empty by default).
    pub fn write_null(&mut self, column: usize) -> Result<()> {
        self.write_cell(column, Cell::Null)
    }

    /// Writes `raw` verbatim, without quoting or escaping.
    pub fn write_non_escaped(&mut self, column: usize, raw: &str) -> Result<()> {
        self.write_cell(column, Cell::Raw(raw))
    }

    /// Header cell; header names go out in call order.
    pub fn write_column_name(&mut self, name: &str) -> Result<()> {
        self.write_cell(self.next_column, Cell::Text(name))
    }

    /// Finish the row: flush held-back cells, pad missing columns and write
    /// the line separator. A row without cells writes nothing.
    pub fn end_row(&mut self) -> Result<()> {
        self.ensure_open()?;
        if let Some(last) = self.last_pending.take() {
            while self.next_column <= last {
                let column = self.next_column;
                match self.pending.get_mut(column).and_then(Option::take) {
                    Some(cell) => self.append(column, cell.as_cell()),
                    None => {
                        self.append_separator();
                        self.next_column += 1;
                    }
                }
            }
        } else if self.next_column == 0 {
            return Ok(());
        }

        if !self.features.omit_missing_tail_columns {
            while self.next_column < self.schema.len() {
                self.append_separator();
                self.next_column += 1;
            }
        }
        self.pending.clear();
        self.next_column = 0;
        self.buf
            .extend_from_slice(self.schema.line_separator().as_bytes());
        self.maybe_flush()
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Write buffered output and flush the target.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_buffer()?;
        if let Some(out) = self.out.as_mut() {
            out.flush()?;
        }
        Ok(())
    }

    /// Flush and release the buffer; with auto-close the target is dropped.
    /// Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.flush();
        self.closed = true;
        drop(std::mem::take(&mut self.buf));
        if self.auto_close {
            self.out = None;
        }
        debug!("CSV encoder closed");
        result
    }

    pub fn get_ref(&self) -> Option<&W> {
        self.out.as_ref()
    }

    /// The target, unless it was dropped by auto-close. Unflushed output is
    /// lost; call [`Self::flush`] or [`Self::close`] first.
    pub fn into_inner(mut self) -> Option<W> {
        self.out.take()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn write_cell(&mut self, column: usize, cell: Cell<'_>) -> Result<()> {
        self.ensure_open()?;
        if column == self.next_column {
            if let Some(held) = self.pending.get_mut(column) {
                *held = None;
            }
            self.append(column, cell);
            return self.maybe_flush();
        }
        if column < self.next_column {
            debug!(column, "CSV column already written in this row; value dropped");
            return Ok(());
        }
        if self.pending.len() <= column {
            self.pending.resize(column + 1, None);
        }
        trace!(column, "buffering out-of-order CSV cell");
        self.pending[column] = Some(cell.to_pending());
        self.last_pending = Some(self.last_pending.map_or(column, |last| last.max(column)));
        Ok(())
    }

    fn append(&mut self, column: usize, cell: Cell<'_>) {
        self.append_separator();
        match cell {
            Cell::Text(value) => self.append_text(column, value),
            Cell::Number(value) => match self.schema.quote_char() {
                Some(quote) if self.features.always_quote_numbers => {
                    self.append_quoted(quote, value)
                }
                _ => self.buf.extend_from_slice(value.as_bytes()),
            },
            Cell::Raw(value) => self.buf.extend_from_slice(value.as_bytes()),
            Cell::Null => self
                .buf
                .extend_from_slice(self.schema.null_value_or_empty().as_bytes()),
        }
        self.next_column += 1;
    }

    fn append_separator(&mut self) {
        if self.next_column > 0 {
            self.buf.push(self.schema.column_separator());
        }
    }

    fn append_text(&mut self, column: usize, value: &str) {
        match self.schema.quote_char() {
            Some(quote) if self.should_quote(column, value) => self.append_quoted(quote, value),
            Some(_) => self.buf.extend_from_slice(value.as_bytes()),
            None => self.append_unquoted_escaped(value),
        }
    }

    fn should_quote(&self, column: usize, value: &str) -> bool {
        if value.is_empty() {
            return self.features.always_quote_empty_strings || self.features.always_quote_strings;
        }
        if self.needs_quotes(value) {
            return true;
        }
        self.features.always_quote_strings && !self.is_unquoted_literal(column, value)
    }

    /// Whether structure forces quoting. The loose check may over-quote but
    /// never misses a value that needs it.
    fn needs_quotes(&self, value: &str) -> bool {
        let Some(quote) = self.schema.quote_char() else {
            return false;
        };
        let separator = self.schema.column_separator();
        let escape = self.schema.escape_char();
        let bytes = value.as_bytes();

        if self.features.strict_check_for_quoting {
            if self.schema.allows_comments() && bytes.first() == Some(&b'#') {
                return true;
            }
            let line_first = self.schema.line_separator().as_bytes().first().copied();
            return bytes.iter().any(|&b| {
                b == separator
                    || b == quote
                    || b == b'\r'
                    || b == b'\n'
                    || Some(b) == line_first
                    || Some(b) == escape
            });
        }
        if bytes.len() > MAX_QUOTE_CHECK {
            return true;
        }
        bytes.iter().any(|&b| {
            u32::from(b) < self.min_safe || b == quote || b == separator || Some(b) == escape
        })
    }

    /// Literal-like text that stays bare even when strings are always quoted.
    fn is_unquoted_literal(&self, column: usize, value: &str) -> bool {
        match self.schema.column(column).map(|c| c.column_type()) {
            Some(ColumnType::StringOrLiteral) => matches!(value, "true" | "false" | "null"),
            Some(ColumnType::NumberOrString) => looks_numeric(value),
            _ => false,
        }
    }

    fn append_quoted(&mut self, quote: u8, value: &str) {
        let escape = self.schema.escape_char().filter(|&e| e != quote);
        let escape_quote = self.features.escape_quote_char_with_escape_char;
        let escape_controls = self.features.escape_control_chars_with_escape_char;

        self.buf.push(quote);
        for &b in value.as_bytes() {
            match escape {
                Some(esc) if b == quote && escape_quote => {
                    self.buf.push(esc);
                    self.buf.push(quote);
                }
                _ if b == quote => {
                    self.buf.push(quote);
                    self.buf.push(quote);
                }
                Some(esc) if b == esc => {
                    self.buf.push(esc);
                    self.buf.push(esc);
                }
                Some(esc) if escape_controls && b < 0x20 => {
                    self.buf.push(esc);
                    self.buf.push(control_escape(b));
                }
                _ => self.buf.push(b),
            }
        }
        self.buf.push(quote);
    }

    /// Quoting is disabled: escape structural bytes when an escape char is
    /// configured, else write as is.
    fn append_unquoted_escaped(&mut self, value: &str) {
        let Some(esc) = self.schema.escape_char() else {
            self.buf.extend_from_slice(value.as_bytes());
            return;
        };
        let separator = self.schema.column_separator();
        for &b in value.as_bytes() {
            if b == separator || b == esc {
                self.buf.push(esc);
                self.buf.push(b);
            } else if b == b'\n' || b == b'\r' || (self.features.escape_control_chars_with_escape_char && b < 0x20) {
                self.buf.push(esc);
                self.buf.push(control_escape(b));
            } else {
                self.buf.push(b);
            }
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(WriteError::Closed.into());
        }
        Ok(())
    }

    fn maybe_flush(&mut self) -> Result<()> {
        if self.buf.len() >= self.flush_at {
            self.flush_buffer()?;
        }
        Ok(())
    }

    fn flush_buffer(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let Some(out) = self.out.as_mut() else {
            return Err(WriteError::Closed.into());
        };
        out.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }
}

/// Byte following the escape char for a control byte.
fn control_escape(b: u8) -> u8 {
    match b {
        b'\n' => b'n',
        b'\r' => b'r',
        b'\t' => b't',
        0 => b'0',
        other => other,
    }
}

fn min_safe_char(schema: &Schema) -> u32 {
    let mut max = u32::from(schema.column_separator());
    if let Some(quote) = schema.quote_char() {
        max = max.max(u32::from(quote));
    }
    for &b in schema.line_separator().as_bytes() {
        max = max.max(u32::from(b));
    }
    max + 1
}
