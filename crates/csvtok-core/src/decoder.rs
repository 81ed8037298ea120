//! Low-level CSV decoder.
//!
//! Turns a byte source into a sequence of cell values, one call to
//! [`CsvDecoder::next_string`] at a time. `Some(value)` is the next cell of
//! the current row (possibly empty); `None` marks the end of the row. The
//! caller then moves to the following row with
//! [`CsvDecoder::start_new_line`].
//!
//! All structural characters (separator, quote, escape, line breaks) are
//! ASCII, so scanning works on raw bytes and UTF-8 is validated once per
//! cell. A cell that needs no unquoting is returned as a slice of the input
//! buffer; quoted or escaped cells are assembled in a reusable cell buffer.

use crate::error::{DecodeError, DecodeErrorKind, Location, Result};
use crate::features::ReadFeatures;
use crate::pool::{BufferPool, PooledBuffer};
use crate::schema::Schema;
use std::io::{self, Read};
use std::sync::Arc;
use tracing::debug;

/// Default size of the input buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;
/// Smallest input buffer the decoder works with.
pub const MIN_BUFFER_SIZE: usize = 16;
/// Default upper bound for a single cell.
pub const DEFAULT_MAX_CELL_LEN: usize = 20 * 1024 * 1024;

/// Per-document decoding rules, derived from a schema and read features.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderSettings {
    pub separator: u8,
    pub quote: Option<u8>,
    pub escape: Option<u8>,
    pub trim_spaces: bool,
    pub allow_comments: bool,
    pub skip_blank_lines: bool,
    pub max_cell_len: usize,
}

impl Default for DecoderSettings {
    fn default() -> Self {
        Self::from_schema(&Schema::empty(), &ReadFeatures::default(), DEFAULT_MAX_CELL_LEN)
    }
}

impl DecoderSettings {
    pub fn from_schema(schema: &Schema, features: &ReadFeatures, max_cell_len: usize) -> Self {
        Self {
            separator: schema.column_separator(),
            quote: schema.quote_char(),
            // An escape char equal to the quote char is just the doubling rule.
            escape: schema.escape_char().filter(|&e| Some(e) != schema.quote_char()),
            trim_spaces: features.trim_spaces,
            allow_comments: features.allow_comments || schema.allows_comments(),
            skip_blank_lines: features.skip_empty_lines,
            max_cell_len,
        }
    }
}

/// Where the bytes of a decoded cell live.
enum Span {
    Empty,
    Input(usize, usize),
    Cell,
}

/// Streaming cell decoder over any [`Read`] source.
pub struct CsvDecoder<R> {
    source: Option<R>,
    auto_close: bool,
    settings: DecoderSettings,

    buf: PooledBuffer,
    pos: usize,
    end: usize,
    eof: bool,
    closed: bool,
    row_ended: bool,
    cell: Vec<u8>,
    /// The current cell went over `max_cell_len`; its bytes are being dropped.
    overflow: bool,

    /// Bytes discarded before `buf[0]`.
    consumed: u64,
    line: u64,
    line_start: u64,
    /// Absolute offset of the last `\r` counted inside a cell.
    last_cr: Option<u64>,
    token_line: u64,
    token_column: u64,
}

impl<R> std::fmt::Debug for CsvDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvDecoder")
            .field("settings", &self.settings)
            .field("line", &self.line)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<R: Read> CsvDecoder<R> {
    /// Decoder with a private buffer of the default size.
    pub fn new(source: R, settings: DecoderSettings) -> Self {
        Self::with_buffer(source, settings, None, DEFAULT_BUFFER_SIZE, true)
    }

    /// Decoder whose input buffer comes from `pool` when given.
    ///
    /// With `auto_close` the source is dropped as soon as it is exhausted or
    /// the decoder is closed; otherwise it is kept for [`Self::into_inner`].
    pub fn with_buffer(
        source: R,
        settings: DecoderSettings,
        pool: Option<&Arc<BufferPool>>,
        buffer_size: usize,
        auto_close: bool,
    ) -> Self {
        let size = buffer_size.max(MIN_BUFFER_SIZE);
        let mut buf = PooledBuffer::acquire(pool, size);
        buf.resize(size, 0);
        Self {
            source: Some(source),
            auto_close,
            settings,
            buf,
            pos: 0,
            end: 0,
            eof: false,
            closed: false,
            row_ended: false,
            cell: Vec::new(),
            overflow: false,
            consumed: 0,
            line: 1,
            line_start: 0,
            last_cr: None,
            token_line: 1,
            token_column: 1,
        }
    }

    pub fn settings(&self) -> &DecoderSettings {
        &self.settings
    }

    /// Swap decoding rules; takes effect with the next cell.
    pub fn reconfigure(&mut self, settings: DecoderSettings) {
        self.settings = settings;
    }

    // ========================================================================
    // Position
    // ========================================================================

    /// 1-based number of the current physical line.
    pub fn current_row(&self) -> u64 {
        self.line
    }

    /// 1-based byte column of the read position within the current line.
    pub fn current_column(&self) -> u64 {
        (self.consumed + self.pos as u64).saturating_sub(self.line_start) + 1
    }

    pub fn current_location(&self) -> Location {
        Location::new(self.current_row(), self.current_column())
    }

    /// Where the most recently returned cell started.
    pub fn token_location(&self) -> Location {
        Location::new(self.token_line, self.token_column)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    // ========================================================================
    // Rows
    // ========================================================================

    /// Whether any input remains, without consuming it.
    pub fn has_more_input(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        self.ensure_available()
    }

    /// Move past the end of the current row and any skippable lines.
    /// Returns `false` when the input is exhausted.
    pub fn start_new_line(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        if self.row_ended {
            self.consume_line_end()?;
            self.row_ended = false;
        } else {
            self.skip_line()?;
        }
        self.skip_lines_when_needed()?;
        self.has_more_input()
    }

    /// Discard the rest of the current physical line, terminator included.
    pub fn skip_line(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.row_ended = false;
        loop {
            if !self.ensure_available()? {
                return Ok(());
            }
            let window = &self.buf[self.pos..self.end];
            if let Some(off) = window.iter().position(|&b| b == b'\r' || b == b'\n') {
                self.pos += off;
                return self.consume_line_end();
            }
            self.pos = self.end;
        }
    }

    /// Skip blank lines and comment lines, as enabled. Must be called at the
    /// start of a line.
    pub fn skip_lines_when_needed(&mut self) -> Result<()> {
        if self.closed || !(self.settings.allow_comments || self.settings.skip_blank_lines) {
            return Ok(());
        }
        loop {
            let mut line_begin = self.pos;
            let mut i = self.pos;
            let first = loop {
                if i >= self.end {
                    self.pos = line_begin;
                    let more = self.refill(line_begin)?;
                    i -= line_begin;
                    line_begin = 0;
                    if !more {
                        break None;
                    }
                    continue;
                }
                let b = self.buf[i];
                if self.is_space(b) {
                    i += 1;
                    continue;
                }
                break Some(b);
            };
            match first {
                None => {
                    self.pos = if self.settings.skip_blank_lines { i } else { line_begin };
                    return Ok(());
                }
                Some(b'\r' | b'\n') if self.settings.skip_blank_lines => {
                    self.pos = i;
                    self.consume_line_end()?;
                }
                Some(b'#') if self.settings.allow_comments => {
                    self.pos = i;
                    self.skip_line()?;
                }
                Some(_) => {
                    self.pos = line_begin;
                    return Ok(());
                }
            }
        }
    }

    // ========================================================================
    // Cells
    // ========================================================================

    /// Next cell of the current row, or `None` at the end of the row.
    ///
    /// A cell longer than `max_cell_len` is read to its end and discarded
    /// before the error is returned, so the next call resumes after it.
    pub fn next_string(&mut self) -> Result<Option<&str>> {
        if self.row_ended || self.closed {
            return Ok(None);
        }
        self.overflow = false;
        if self.settings.trim_spaces {
            self.skip_spaces()?;
        }
        self.token_line = self.line;
        self.token_column = self.current_column();

        let span = if !self.ensure_available()? {
            // End of input right after a separator (or at the very start).
            self.row_ended = true;
            Span::Empty
        } else {
            let b = self.buf[self.pos];
            if b == b'\r' || b == b'\n' {
                self.row_ended = true;
                Span::Empty
            } else if Some(b) == self.settings.quote {
                self.pos += 1;
                self.quoted_value(b)?
            } else if b == self.settings.separator {
                self.pos += 1;
                Span::Empty
            } else {
                self.unquoted_value()?
            }
        };
        if self.overflow {
            self.overflow = false;
            self.cell.clear();
            return Err(DecodeError::new(
                DecodeErrorKind::CellTooLong {
                    max: self.settings.max_cell_len,
                },
                self.token_location(),
            )
            .into());
        }
        self.span_str(span).map(Some)
    }

    /// Release the buffer and, with auto-close, the source. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.row_ended = true;
        if self.auto_close {
            self.source = None;
        }
        self.pos = 0;
        self.end = 0;
        drop(std::mem::take(&mut self.buf));
        self.cell = Vec::new();
        debug!(line = self.line, "CSV decoder closed");
    }

    /// The source, unless it was already dropped by auto-close.
    pub fn into_inner(mut self) -> Option<R> {
        self.source.take()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn unquoted_value(&mut self) -> Result<Span> {
        let separator = self.settings.separator;
        let escape = self.settings.escape;
        let mut start = self.pos;
        let mut i = self.pos;
        let mut buffered = false;
        loop {
            while i < self.end {
                let b = self.buf[i];
                if b == separator {
                    return Ok(self.finish_unquoted(start, i, buffered, i + 1, false));
                }
                if b == b'\r' || b == b'\n' {
                    return Ok(self.finish_unquoted(start, i, buffered, i, true));
                }
                if Some(b) == escape {
                    if !buffered {
                        self.cell.clear();
                        buffered = true;
                    }
                    self.cell.extend_from_slice(&self.buf[start..i]);
                    self.pos = i + 1;
                    let c = self.read_escaped()?;
                    self.cell.push(c);
                    self.limit_cell();
                    start = self.pos;
                    i = self.pos;
                    continue;
                }
                i += 1;
            }
            // Ran out of buffered input in the middle of the value.
            if !buffered && i - start > self.settings.max_cell_len {
                // Too long to keep; stop growing the buffer for it.
                self.overflow = true;
                self.cell.clear();
                buffered = true;
                start = i;
            }
            if buffered {
                self.cell.extend_from_slice(&self.buf[start..i]);
                self.limit_cell();
                self.pos = i;
                let more = self.refill(i)?;
                start = 0;
                i = 0;
                if !more {
                    return Ok(self.finish_unquoted(0, 0, true, 0, true));
                }
            } else {
                self.pos = i;
                let more = self.refill(start)?;
                i -= start;
                start = 0;
                if !more {
                    return Ok(self.finish_unquoted(start, i, false, i, true));
                }
            }
        }
    }

    fn finish_unquoted(
        &mut self,
        start: usize,
        stop: usize,
        buffered: bool,
        next_pos: usize,
        row_end: bool,
    ) -> Span {
        self.pos = next_pos;
        self.row_ended = row_end;
        if buffered {
            self.cell.extend_from_slice(&self.buf[start..stop]);
            self.limit_cell();
            if self.settings.trim_spaces {
                while self.cell.last().is_some_and(|&b| self.is_space(b)) {
                    self.cell.pop();
                }
            }
            return Span::Cell;
        }
        if stop - start > self.settings.max_cell_len {
            self.overflow = true;
        }
        let mut stop = stop;
        if self.settings.trim_spaces {
            while stop > start && self.is_space(self.buf[stop - 1]) {
                stop -= 1;
            }
        }
        Span::Input(start, stop)
    }

    /// Reads a quoted value; the opening quote is already consumed.
    fn quoted_value(&mut self, quote: u8) -> Result<Span> {
        let escape = self.settings.escape;
        self.cell.clear();
        let mut start = self.pos;
        let mut i = self.pos;
        loop {
            if i >= self.end {
                self.cell.extend_from_slice(&self.buf[start..i]);
                self.limit_cell();
                self.pos = i;
                if !self.refill(i)? {
                    return Err(DecodeError::new(
                        DecodeErrorKind::MissingClosingQuote,
                        self.token_location(),
                    )
                    .into());
                }
                start = self.pos;
                i = self.pos;
                continue;
            }
            let b = self.buf[i];
            if b == quote {
                self.cell.extend_from_slice(&self.buf[start..i]);
                self.pos = i + 1;
                if self.peek()? == Some(quote) {
                    self.cell.push(quote);
                    self.pos += 1;
                    start = self.pos;
                    i = self.pos;
                    continue;
                }
                break;
            }
            if Some(b) == escape {
                self.cell.extend_from_slice(&self.buf[start..i]);
                self.pos = i + 1;
                let c = self.read_escaped()?;
                self.cell.push(c);
                self.limit_cell();
                start = self.pos;
                i = self.pos;
                continue;
            }
            if b == b'\r' || b == b'\n' {
                self.note_line_break(i);
            }
            i += 1;
        }
        self.limit_cell();

        if self.settings.trim_spaces {
            self.skip_spaces()?;
        }
        match self.peek()? {
            None | Some(b'\r' | b'\n') => self.row_ended = true,
            Some(b) if b == self.settings.separator => self.pos += 1,
            Some(found) => {
                return Err(DecodeError::new(
                    DecodeErrorKind::ExpectedSeparator {
                        separator: self.settings.separator as char,
                        found: found as char,
                    },
                    self.current_location(),
                )
                .into());
            }
        }
        Ok(Span::Cell)
    }

    /// Byte produced by the escape sequence at the read position.
    fn read_escaped(&mut self) -> Result<u8> {
        let Some(c) = self.peek()? else {
            return Err(
                DecodeError::new(DecodeErrorKind::EofInEscape, self.current_location()).into(),
            );
        };
        if c == b'\r' || c == b'\n' {
            self.note_line_break(self.pos);
        }
        self.pos += 1;
        Ok(match c {
            b'0' => 0,
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            other => other,
        })
    }

    fn span_str(&self, span: Span) -> Result<&str> {
        let bytes: &[u8] = match span {
            Span::Empty => b"",
            Span::Input(start, stop) => &self.buf[start..stop],
            Span::Cell => &self.cell,
        };
        std::str::from_utf8(bytes).map_err(|e| {
            let kind = if e.error_len().is_none() && self.eof {
                DecodeErrorKind::TruncatedUtf8
            } else {
                DecodeErrorKind::InvalidUtf8
            };
            DecodeError::new(kind, self.token_location()).into()
        })
    }

    /// Flags an oversized cell and drops what was collected so far.
    fn limit_cell(&mut self) {
        if self.cell.len() > self.settings.max_cell_len {
            self.overflow = true;
            self.cell.clear();
        }
    }

    fn is_space(&self, b: u8) -> bool {
        (b == b' ' || b == b'\t') && b != self.settings.separator
    }

    fn skip_spaces(&mut self) -> Result<()> {
        while self.ensure_available()? {
            if !self.is_space(self.buf[self.pos]) {
                break;
            }
            self.pos += 1;
        }
        Ok(())
    }

    /// Counts a line break inside a cell. A `\r` counts at once; a `\n`
    /// right after it does not, even when a refill fell between the two.
    fn note_line_break(&mut self, i: usize) {
        let at = self.consumed + i as u64;
        match self.buf[i] {
            b'\r' => {
                self.line += 1;
                self.last_cr = Some(at);
            }
            b'\n' if self.last_cr.is_some_and(|cr| cr + 1 == at) => {}
            b'\n' => self.line += 1,
            _ => return,
        }
        self.line_start = at + 1;
    }

    /// Consume one `\n`, `\r` or `\r\n` at the read position.
    fn consume_line_end(&mut self) -> Result<()> {
        if !self.ensure_available()? {
            return Ok(());
        }
        match self.buf[self.pos] {
            b'\r' => {
                self.pos += 1;
                if self.ensure_available()? && self.buf[self.pos] == b'\n' {
                    self.pos += 1;
                }
            }
            b'\n' => {
                let at = self.consumed + self.pos as u64;
                self.pos += 1;
                if self.last_cr.is_some_and(|cr| cr + 1 == at) {
                    // Second half of an escaped `\r\n`, already counted.
                    self.line_start = at + 1;
                    return Ok(());
                }
            }
            _ => return Ok(()),
        }
        self.line += 1;
        self.line_start = self.consumed + self.pos as u64;
        Ok(())
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        if self.ensure_available()? {
            Ok(Some(self.buf[self.pos]))
        } else {
            Ok(None)
        }
    }

    fn ensure_available(&mut self) -> Result<bool> {
        if self.pos < self.end {
            return Ok(true);
        }
        self.refill(self.pos)
    }

    /// Read more input. Bytes before `keep_from` are dropped and the rest
    /// moves to the front of the buffer, so every index at or after
    /// `keep_from` shifts down by `keep_from`. Returns `false` at end of
    /// input.
    fn refill(&mut self, keep_from: usize) -> Result<bool> {
        if keep_from > 0 {
            self.buf.copy_within(keep_from..self.end, 0);
            self.consumed += keep_from as u64;
            self.end -= keep_from;
            self.pos = self.pos.saturating_sub(keep_from);
        }
        if self.eof || self.closed {
            return Ok(false);
        }
        if self.end == self.buf.len() {
            let grown = (self.buf.len() * 2).max(MIN_BUFFER_SIZE);
            self.buf.resize(grown, 0);
        }
        let Some(source) = self.source.as_mut() else {
            self.mark_eof();
            return Ok(false);
        };
        let end = self.end;
        let n = loop {
            match source.read(&mut self.buf[end..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            self.mark_eof();
            return Ok(false);
        }
        self.end += n;
        Ok(true)
    }

    fn mark_eof(&mut self) {
        self.eof = true;
        if self.auto_close {
            self.source = None;
        }
    }
}
