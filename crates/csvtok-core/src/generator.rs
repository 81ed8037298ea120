//! Write state machine: structured writes to CSV rows.
//!
//! Accepts the same shapes the parser produces. Each object is one row, its
//! fields mapped to columns by name. An array directly inside an object is
//! collected into a single cell joined by the array element separator.
//! Arrays at the root or inside a root array write their values by
//! position. Objects may only appear at the root or inside a root array.

use crate::encoder::{CsvEncoder, DEFAULT_OUTPUT_BUFFER_SIZE};
use crate::error::{Result, WriteError};
use crate::features::WriteFeatures;
use crate::pool::BufferPool;
use crate::schema::Schema;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

/// Generator construction options.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub features: WriteFeatures,
    pub buffer_size: usize,
    /// Drop the target when the generator is closed.
    pub auto_close_target: bool,
    pub pool: Option<Arc<BufferPool>>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            features: WriteFeatures::default(),
            buffer_size: DEFAULT_OUTPUT_BUFFER_SIZE,
            auto_close_target: true,
            pool: None,
        }
    }
}

impl GeneratorConfig {
    pub fn with_features(mut self, features: WriteFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = Some(pool);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Array,
    Object { expect_name: bool },
}

impl Frame {
    fn name(self) -> &'static str {
        match self {
            Frame::Array => "an Array",
            Frame::Object { .. } => "an Object",
        }
    }
}

/// Array values collected for one cell.
#[derive(Debug)]
struct ArrayCell {
    column: usize,
    separator: String,
    contents: String,
    elements: usize,
}

/// Push-style CSV writer.
pub struct CsvGenerator<W: Write> {
    encoder: CsvEncoder<W>,
    schema: Option<Schema>,
    features: WriteFeatures,

    frames: Vec<Frame>,
    /// Column resolved by the last field name.
    column: Option<usize>,
    next_hint: usize,
    /// Set while the value of an unknown field is being dropped.
    skip_value: bool,
    cell: Option<ArrayCell>,
    header_pending: bool,
    closed: bool,
}

impl<W: Write> std::fmt::Debug for CsvGenerator<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvGenerator")
            .field("frames", &self.frames)
            .field("column", &self.column)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<W: Write> CsvGenerator<W> {
    /// Generator without a schema; [`Self::set_schema`] must be called
    /// before the first write.
    pub fn new(out: W, config: GeneratorConfig) -> Self {
        let encoder = CsvEncoder::with_buffer(
            out,
            Schema::empty(),
            config.features,
            config.pool.as_ref(),
            config.buffer_size,
            config.auto_close_target,
        );
        Self {
            encoder,
            schema: None,
            features: config.features,
            frames: Vec::new(),
            column: None,
            next_hint: 0,
            skip_value: false,
            cell: None,
            header_pending: true,
            closed: false,
        }
    }

    pub fn with_schema(out: W, schema: Schema, config: GeneratorConfig) -> Self {
        let mut generator = Self::new(out, config);
        generator.set_schema(schema);
        generator
    }

    pub fn set_schema(&mut self, schema: Schema) {
        self.encoder.set_schema(schema.clone());
        self.schema = Some(schema);
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn features(&self) -> WriteFeatures {
        self.features
    }

    pub fn override_features(&mut self, features: WriteFeatures) {
        self.features = features;
        self.encoder.override_features(features);
    }

    /// Number of open structures.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    // ========================================================================
    // Structure
    // ========================================================================

    pub fn write_start_array(&mut self) -> Result<()> {
        self.verify_value_write("start an array")?;
        if self.cell.is_some() {
            return Err(WriteError::NestedArray.into());
        }
        match self.frames.last() {
            Some(Frame::Object { .. }) => {
                if !self.skip_value {
                    self.start_array_cell()?;
                }
            }
            Some(Frame::Array) if self.frames.len() > 1 => {
                return Err(WriteError::NestedArray.into());
            }
            _ => {}
        }
        self.frames.push(Frame::Array);
        Ok(())
    }

    pub fn write_end_array(&mut self) -> Result<()> {
        match self.frames.last() {
            Some(Frame::Array) => {}
            other => {
                return Err(WriteError::UnbalancedEnd {
                    expected: "an Array",
                    actual: other.map_or("the root", |f| f.name()),
                }
                .into());
            }
        }
        self.frames.pop();
        if let Some(cell) = self.cell.take() {
            self.encoder.write_string(cell.column, &cell.contents)?;
        }
        if self.in_object() {
            self.value_done();
        } else {
            self.finish_row()?;
        }
        Ok(())
    }

    pub fn write_start_object(&mut self) -> Result<()> {
        self.verify_value_write("start an object")?;
        let allowed = match self.frames.as_slice() {
            [] => true,
            [Frame::Array] => true,
            _ => false,
        };
        if !allowed {
            return Err(WriteError::NestedObject.into());
        }
        self.frames.push(Frame::Object { expect_name: true });
        self.next_hint = 0;
        Ok(())
    }

    pub fn write_end_object(&mut self) -> Result<()> {
        match self.frames.last() {
            Some(Frame::Object { .. }) => {}
            other => {
                return Err(WriteError::UnbalancedEnd {
                    expected: "an Object",
                    actual: other.map_or("the root", |f| f.name()),
                }
                .into());
            }
        }
        self.frames.pop();
        self.finish_row()
    }

    /// Resolve `name` to a column. Unknown names are dropped with their value
    /// when unknown fields are ignored, otherwise they fail.
    pub fn write_field_name(&mut self, name: &str) -> Result<()> {
        self.ensure_open()?;
        match self.frames.last_mut() {
            Some(Frame::Object { expect_name }) if *expect_name => *expect_name = false,
            _ => return Err(WriteError::UnexpectedFieldName.into()),
        }
        let Some(schema) = self.schema.as_ref() else {
            return Err(WriteError::SchemaNotSet {
                action: "write a field name",
            }
            .into());
        };
        match schema.column_by_name_hint(name, self.next_hint) {
            Some(column) => {
                self.column = Some(column.index());
                self.next_hint = column.index() + 1;
                self.skip_value = false;
            }
            None if self.features.ignore_unknown => {
                debug!(field = name, "dropping field without CSV column");
                self.column = None;
                self.skip_value = true;
            }
            None => {
                return Err(WriteError::UnknownColumn {
                    name: name.to_string(),
                    known: schema.column_desc(),
                }
                .into());
            }
        }
        Ok(())
    }

    // ========================================================================
    // Scalars
    // ========================================================================

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.verify_value_write("write a string")?;
        if self.add_to_cell(Some(value)) {
            return Ok(());
        }
        if let Some(column) = self.target_column() {
            self.encoder.write_string(column, value)?;
        }
        self.value_done();
        Ok(())
    }

    /// Numeric text as produced by a number formatter.
    pub fn write_number(&mut self, value: &str) -> Result<()> {
        self.verify_value_write("write a number")?;
        if self.add_to_cell(Some(value)) {
            return Ok(());
        }
        if let Some(column) = self.target_column() {
            self.encoder.write_number(column, value)?;
        }
        self.value_done();
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_number(&value.to_string())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_number(&value.to_string())
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_number(&value.to_string())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.verify_value_write("write a boolean")?;
        let text = if value { "true" } else { "false" };
        if self.add_to_cell(Some(text)) {
            return Ok(());
        }
        if let Some(column) = self.target_column() {
            self.encoder.write_bool(column, value)?;
        }
        self.value_done();
        Ok(())
    }

    /// Null cell. Inside an array cell the null marker is appended when one
    /// is set; without one the element is dropped. A null directly in a
    /// root-level array stands for a missing row and writes nothing.
    pub fn write_null(&mut self) -> Result<()> {
        self.verify_value_write("write a null")?;
        if self.add_to_cell(None) {
            return Ok(());
        }
        if matches!(self.frames.as_slice(), [Frame::Array]) {
            return Ok(());
        }
        if let Some(column) = self.target_column() {
            self.encoder.write_null(column)?;
        }
        self.value_done();
        Ok(())
    }

    /// Writes `raw` into the current cell without quoting or escaping.
    pub fn write_raw_value(&mut self, raw: &str) -> Result<()> {
        self.verify_value_write("write a raw value")?;
        if self.add_to_cell(Some(raw)) {
            return Ok(());
        }
        if let Some(column) = self.target_column() {
            self.encoder.write_non_escaped(column, raw)?;
        }
        self.value_done();
        Ok(())
    }

    pub fn write_string_field(&mut self, name: &str, value: &str) -> Result<()> {
        self.write_field_name(name)?;
        self.write_string(value)
    }

    pub fn write_null_field(&mut self, name: &str) -> Result<()> {
        self.write_field_name(name)?;
        self.write_null()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn flush(&mut self) -> Result<()> {
        self.encoder.flush()
    }

    /// Close open structures, write the header if nothing else was written,
    /// then flush and close the encoder. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.finish_document();
        self.closed = true;
        let closed = self.encoder.close();
        result.and(closed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The target, unless it was dropped by auto-close.
    pub fn into_inner(self) -> Option<W> {
        self.encoder.into_inner()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn finish_document(&mut self) -> Result<()> {
        while let Some(frame) = self.frames.last().copied() {
            match frame {
                Frame::Array => self.write_end_array()?,
                Frame::Object { .. } => self.write_end_object()?,
            }
        }
        if self.header_pending && self.schema.is_some() {
            self.write_header()?;
        }
        self.encoder.end_row()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(WriteError::Closed.into());
        }
        Ok(())
    }

    fn verify_value_write(&mut self, action: &'static str) -> Result<()> {
        self.ensure_open()?;
        if self.schema.is_none() {
            return Err(WriteError::SchemaNotSet { action }.into());
        }
        if let Some(Frame::Object { expect_name: true }) = self.frames.last() {
            return Err(WriteError::ExpectingFieldName { action }.into());
        }
        if self.header_pending {
            self.write_header()?;
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        self.header_pending = false;
        let Some(schema) = self.schema.as_ref() else {
            return Ok(());
        };
        if !schema.uses_header() {
            return Ok(());
        }
        if schema.is_empty() {
            return Err(WriteError::EmptyHeader.into());
        }
        for column in schema.columns() {
            self.encoder.write_column_name(column.name())?;
        }
        debug!(columns = %schema.column_desc(), "CSV header written");
        self.encoder.end_row()
    }

    fn start_array_cell(&mut self) -> Result<()> {
        let Some(column) = self.column else {
            return Ok(());
        };
        let separator = self.schema.as_ref().and_then(|schema| {
            schema
                .column(column)
                .and_then(|c| c.array_element_separator())
                .or_else(|| schema.array_element_separator())
                .map(str::to_owned)
        });
        let Some(separator) = separator else {
            return Err(WriteError::NoArraySeparator.into());
        };
        self.cell = Some(ArrayCell {
            column,
            separator,
            contents: String::new(),
            elements: 0,
        });
        Ok(())
    }

    /// Append to the open array cell; `false` when no cell is open.
    fn add_to_cell(&mut self, value: Option<&str>) -> bool {
        let in_cell_frame = matches!(self.frames.last(), Some(Frame::Array)) && self.in_object_parent();
        if !in_cell_frame {
            return false;
        }
        let null_marker = self
            .schema
            .as_ref()
            .and_then(Schema::null_value)
            .map(str::to_owned);
        if let Some(cell) = self.cell.as_mut() {
            let Some(text) = value.map(str::to_owned).or(null_marker) else {
                return true;
            };
            if cell.elements > 0 {
                cell.contents.push_str(&cell.separator);
            }
            cell.contents.push_str(&text);
            cell.elements += 1;
        }
        // Values of a skipped field's array land here too and are dropped.
        true
    }

    /// Column for a scalar: the resolved field inside an object, the next
    /// position otherwise. `None` when the value is dropped.
    fn target_column(&self) -> Option<usize> {
        if self.in_object() {
            if self.skip_value {
                return None;
            }
            return self.column;
        }
        Some(self.encoder.next_column_index())
    }

    fn value_done(&mut self) {
        if let Some(Frame::Object { expect_name }) = self.frames.last_mut() {
            *expect_name = true;
            self.column = None;
            self.skip_value = false;
        }
    }

    fn finish_row(&mut self) -> Result<()> {
        self.encoder.end_row()?;
        self.next_hint = 0;
        self.column = None;
        self.skip_value = false;
        Ok(())
    }

    fn in_object(&self) -> bool {
        matches!(self.frames.last(), Some(Frame::Object { .. }))
    }

    fn in_object_parent(&self) -> bool {
        let n = self.frames.len();
        n >= 2 && matches!(self.frames[n - 2], Frame::Object { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CsvError;

    fn generate(
        schema: Schema,
        features: WriteFeatures,
        f: impl FnOnce(&mut CsvGenerator<&mut Vec<u8>>) -> Result<()>,
    ) -> Result<String> {
        let mut out = Vec::new();
        {
            let config = GeneratorConfig::default().with_features(features);
            let mut generator = CsvGenerator::with_schema(&mut out, schema, config);
            f(&mut generator)?;
            generator.close()?;
        }
        Ok(String::from_utf8(out).unwrap())
    }

    fn id_desc() -> Schema {
        Schema::builder().add_column("id").add_column("desc").build()
    }

    fn write_error(result: Result<String>) -> WriteError {
        match result {
            Err(CsvError::Write(e)) => e,
            other => panic!("expected write error, got {other:?}"),
        }
    }

    #[test]
    fn test_null_marker_row() {
        let schema = id_desc().with_null_value("n/a");
        let out = generate(schema, WriteFeatures::default(), |g| {
            g.write_start_object()?;
            g.write_string_field("id", "id")?;
            g.write_null_field("desc")?;
            g.write_end_object()
        })
        .unwrap();
        assert_eq!(out, "id,n/a\n");
    }

    #[test]
    fn test_rows_in_wrapping_array_with_header() {
        let schema = id_desc().with_header();
        let out = generate(schema, WriteFeatures::default(), |g| {
            g.write_start_array()?;
            for (id, desc) in [("1", "one"), ("2", "two, too")] {
                g.write_start_object()?;
                g.write_string_field("id", id)?;
                g.write_string_field("desc", desc)?;
                g.write_end_object()?;
            }
            g.write_null()?;
            g.write_end_array()
        })
        .unwrap();
        assert_eq!(out, "id,desc\n1,one\n2,\"two, too\"\n");
    }

    #[test]
    fn test_fields_out_of_order() {
        let out = generate(id_desc(), WriteFeatures::default(), |g| {
            g.write_start_object()?;
            g.write_string_field("desc", "d")?;
            g.write_field_name("id")?;
            g.write_i64(7)?;
            g.write_end_object()
        })
        .unwrap();
        assert_eq!(out, "7,d\n");
    }

    #[test]
    fn test_array_cell() {
        let schema = Schema::builder()
            .add_column("id")
            .add_array_column("tags", None)
            .add_array_column("ids", Some("|"))
            .build();
        let out = generate(schema, WriteFeatures::default(), |g| {
            g.write_start_object()?;
            g.write_string_field("id", "x")?;
            g.write_field_name("tags")?;
            g.write_start_array()?;
            g.write_string("a")?;
            g.write_null()?;
            g.write_bool(true)?;
            g.write_end_array()?;
            g.write_field_name("ids")?;
            g.write_start_array()?;
            g.write_end_array()?;
            g.write_end_object()
        })
        .unwrap();
        assert_eq!(out, "x,a;true,\n");
    }

    #[test]
    fn test_array_cell_null_marker() {
        let schema = Schema::builder()
            .add_array_column("tags", None)
            .set_null_value("NULL")
            .build();
        let out = generate(schema, WriteFeatures::default(), |g| {
            g.write_start_object()?;
            g.write_field_name("tags")?;
            g.write_start_array()?;
            g.write_null()?;
            g.write_string("b")?;
            g.write_end_array()?;
            g.write_end_object()
        })
        .unwrap();
        assert_eq!(out, "NULL;b\n");
    }

    #[test]
    fn test_array_without_separator_fails() {
        let schema = id_desc().without_array_element_separator();
        let err = write_error(generate(schema, WriteFeatures::default(), |g| {
            g.write_start_object()?;
            g.write_field_name("desc")?;
            g.write_start_array()
        }));
        assert_eq!(err, WriteError::NoArraySeparator);
    }

    #[test]
    fn test_nested_structures_fail() {
        let err = write_error(generate(id_desc(), WriteFeatures::default(), |g| {
            g.write_start_object()?;
            g.write_field_name("id")?;
            g.write_start_object()
        }));
        assert_eq!(err, WriteError::NestedObject);

        let err = write_error(generate(id_desc(), WriteFeatures::default(), |g| {
            g.write_start_object()?;
            g.write_field_name("desc")?;
            g.write_start_array()?;
            g.write_start_array()
        }));
        assert_eq!(err, WriteError::NestedArray);

        let err = write_error(generate(id_desc(), WriteFeatures::default(), |g| {
            g.write_start_array()?;
            g.write_start_array()?;
            g.write_start_array()
        }));
        assert_eq!(err, WriteError::NestedArray);
    }

    #[test]
    fn test_unknown_column() {
        let err = write_error(generate(id_desc(), WriteFeatures::default(), |g| {
            g.write_start_object()?;
            g.write_string_field("nope", "x")
        }));
        assert!(matches!(err, WriteError::UnknownColumn { ref name, .. } if name == "nope"));
        assert!(err.to_string().contains("[\"id\",\"desc\"]"), "{err}");

        let features = WriteFeatures::default().with_ignore_unknown(true);
        let out = generate(id_desc(), features, |g| {
            g.write_start_object()?;
            g.write_string_field("id", "1")?;
            g.write_string_field("nope", "x")?;
            g.write_field_name("also")?;
            g.write_start_array()?;
            g.write_string("dropped")?;
            g.write_end_array()?;
            g.write_string_field("desc", "d")?;
            g.write_end_object()
        })
        .unwrap();
        assert_eq!(out, "1,d\n");
    }

    #[test]
    fn test_positional_rows() {
        let out = generate(id_desc(), WriteFeatures::default(), |g| {
            g.write_start_array()?;
            for row in [["a", "b"], ["c", "d"]] {
                g.write_start_array()?;
                for value in row {
                    g.write_string(value)?;
                }
                g.write_end_array()?;
            }
            g.write_end_array()
        })
        .unwrap();
        assert_eq!(out, "a,b\nc,d\n");
    }

    #[test]
    fn test_header_only_on_close() {
        let out = generate(id_desc().with_header(), WriteFeatures::default(), |_| Ok(())).unwrap();
        assert_eq!(out, "id,desc\n");
    }

    #[test]
    fn test_empty_header_fails() {
        let err = write_error(generate(
            Schema::empty().with_header(),
            WriteFeatures::default(),
            |g| g.write_start_object(),
        ));
        assert_eq!(err, WriteError::EmptyHeader);
    }

    #[test]
    fn test_schema_required() {
        let mut out = Vec::new();
        let mut g = CsvGenerator::new(&mut out, GeneratorConfig::default());
        assert!(matches!(
            g.write_start_object(),
            Err(CsvError::Write(WriteError::SchemaNotSet { .. }))
        ));
        g.set_schema(id_desc());
        g.write_start_object().unwrap();
        g.write_string_field("id", "1").unwrap();
        g.write_end_object().unwrap();
        g.close().unwrap();
        drop(g);
        assert_eq!(out, b"1,\n");
    }

    #[test]
    fn test_field_name_rules() {
        let err = write_error(generate(id_desc(), WriteFeatures::default(), |g| {
            g.write_start_object()?;
            g.write_string("no name")
        }));
        assert!(matches!(err, WriteError::ExpectingFieldName { .. }));

        let err = write_error(generate(id_desc(), WriteFeatures::default(), |g| {
            g.write_start_array()?;
            g.write_field_name("id")
        }));
        assert_eq!(err, WriteError::UnexpectedFieldName);

        let err = write_error(generate(id_desc(), WriteFeatures::default(), |g| {
            g.write_start_object()?;
            g.write_end_array()
        }));
        assert!(matches!(err, WriteError::UnbalancedEnd { .. }));
    }

    #[test]
    fn test_close_finishes_open_row() {
        let out = generate(id_desc(), WriteFeatures::default(), |g| {
            g.write_start_object()?;
            g.write_string_field("id", "1")
        })
        .unwrap();
        assert_eq!(out, "1,\n");
    }

    #[test]
    fn test_numbers_and_bools() {
        let schema = Schema::builder()
            .add_number_column("n")
            .add_number_column("f")
            .add_boolean_column("b")
            .build();
        let out = generate(schema, WriteFeatures::default(), |g| {
            g.write_start_object()?;
            g.write_field_name("n")?;
            g.write_u64(10)?;
            g.write_field_name("f")?;
            g.write_f64(2.5)?;
            g.write_field_name("b")?;
            g.write_bool(false)?;
            g.write_end_object()
        })
        .unwrap();
        assert_eq!(out, "10,2.5,false\n");
    }
}
