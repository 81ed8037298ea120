//! Whole-document conversions used by the CLI.

use std::io::{BufRead, BufReader, Read, Write};

use anyhow::Context;
use clap::ValueEnum;
use csvtok_core::{
    detect_format, CsvGenerator, GeneratorConfig, MatchStrength, ParserConfig, ReadFeatures,
    Schema, WriteFeatures,
};
use csvtok_json::{schema_from_sample, write_value, JsonRows};
use serde_json::de::{IoRead, StreamDeserializer};
use serde_json::{Deserializer, Value};
use tracing::{info, warn};

/// Bytes read by [`detect`].
pub const DETECT_PREFIX_LEN: usize = 4096;

/// Shape of the JSON produced by [`csv_to_json`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum JsonLayout {
    /// One JSON value per line
    #[default]
    Lines,
    /// A single JSON array
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvertStats {
    pub rows: u64,
    pub skipped: u64,
}

/// Read CSV rows from `input` and write them to `output` as JSON.
///
/// With `skip_bad_rows`, rows that fail to parse are logged and left out;
/// otherwise the first one aborts the conversion.
pub fn csv_to_json<R: Read, W: Write>(
    input: R,
    mut output: W,
    schema: Schema,
    features: ReadFeatures,
    layout: JsonLayout,
    skip_bad_rows: bool,
) -> anyhow::Result<ConvertStats> {
    let config = ParserConfig::default().with_features(features);
    let rows = JsonRows::with_schema(input, schema, config);
    let mut stats = ConvertStats::default();

    if layout == JsonLayout::Array {
        output.write_all(b"[")?;
    }
    for row in rows {
        let row = match row {
            Ok(row) => row,
            Err(err) if skip_bad_rows && !err.is_fatal() => {
                warn!(error = %err, "Skipping bad CSV row");
                stats.skipped += 1;
                continue;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read CSV row {}", stats.rows + stats.skipped + 1));
            }
        };
        if layout == JsonLayout::Array && stats.rows > 0 {
            output.write_all(b",")?;
        }
        serde_json::to_writer(&mut output, &row)?;
        if layout == JsonLayout::Lines {
            output.write_all(b"\n")?;
        }
        stats.rows += 1;
    }
    if layout == JsonLayout::Array {
        output.write_all(b"]\n")?;
    }
    output.flush()?;

    info!(rows = stats.rows, skipped = stats.skipped, "Converted CSV to JSON");
    Ok(stats)
}

/// Read a JSON array or JSON lines from `input` and write them as CSV.
///
/// JSON lines are converted one value at a time. A schema without columns
/// takes them from the first value when it is an object.
pub fn json_to_csv<R: Read, W: Write>(
    input: R,
    output: W,
    schema: Schema,
    features: WriteFeatures,
) -> anyhow::Result<ConvertStats> {
    let mut values = JsonInput::open(input)?.peekable();
    let schema = match values.peek() {
        Some(Ok(sample)) if schema.is_empty() && sample.is_object() => {
            schema_from_sample(sample, &schema).context("Failed to derive CSV columns")?
        }
        _ => schema,
    };

    let config = GeneratorConfig::default().with_features(features);
    let mut generator = CsvGenerator::with_schema(output, schema, config);
    generator.write_start_array().context("Failed to write CSV")?;
    let mut rows = 0u64;
    for value in values {
        let value = value?;
        write_value(&mut generator, &value)
            .with_context(|| format!("Failed to write JSON value {} as CSV", rows + 1))?;
        rows += 1;
    }
    generator.write_end_array().context("Failed to write CSV")?;
    generator.close().context("Failed to finish CSV output")?;

    info!(rows, "Converted JSON to CSV");
    Ok(ConvertStats { rows, skipped: 0 })
}

/// JSON values to convert: the items of a top-level array, which is read
/// whole, or a stream of whitespace-separated values read one at a time.
enum JsonInput<R: Read> {
    Array(std::vec::IntoIter<Value>),
    Lines(StreamDeserializer<'static, IoRead<BufReader<R>>, Value>),
}

impl<R: Read> JsonInput<R> {
    fn open(input: R) -> anyhow::Result<Self> {
        let mut reader = BufReader::new(input);
        let first = loop {
            let buf = reader.fill_buf().context("Failed to read JSON input")?;
            if buf.is_empty() {
                break None;
            }
            match buf.iter().position(|b| !b.is_ascii_whitespace()) {
                Some(offset) => {
                    let b = buf[offset];
                    reader.consume(offset);
                    break Some(b);
                }
                None => {
                    let len = buf.len();
                    reader.consume(len);
                }
            }
        };
        if first == Some(b'[') {
            let items: Vec<Value> =
                serde_json::from_reader(reader).context("Invalid JSON array")?;
            return Ok(JsonInput::Array(items.into_iter()));
        }
        Ok(JsonInput::Lines(Deserializer::from_reader(reader).into_iter::<Value>()))
    }
}

impl<R: Read> Iterator for JsonInput<R> {
    type Item = anyhow::Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            JsonInput::Array(items) => items.next().map(Ok),
            JsonInput::Lines(stream) => stream
                .next()
                .map(|value| value.context("Invalid JSON lines")),
        }
    }
}

/// Rate the first [`DETECT_PREFIX_LEN`] bytes of `input`.
pub fn detect<R: Read>(input: R, schema: &Schema) -> std::io::Result<MatchStrength> {
    let mut prefix = Vec::with_capacity(DETECT_PREFIX_LEN);
    input
        .take(DETECT_PREFIX_LEN as u64)
        .read_to_end(&mut prefix)?;
    Ok(detect_format(&prefix, schema))
}
