//! Command-line interface for csvtok
//!
//! # Usage Examples
//!
//! ## CSV to JSON
//! ```bash
//! # Header line names the columns, one JSON object per output line
//! csvtok to-json people.csv --header
//!
//! # Typed columns from a schema file, output as a single JSON array
//! csvtok to-json people.csv --schema people.yaml --layout array
//!
//! # Keep going past malformed rows
//! csvtok to-json dump.csv --header --skip-bad-rows
//! ```
//!
//! ## JSON to CSV
//! ```bash
//! # Columns derived from the first object
//! csvtok from-json people.json --header --output people.csv
//! ```
//!
//! ## Detection
//! ```bash
//! csvtok detect unknown.txt --separator '\t'
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use csvtok::convert::{self, JsonLayout};
use csvtok::FormatOpts;
use csvtok_core::{ReadFeatures, WriteFeatures};

#[derive(Parser)]
#[command(name = "csvtok")]
#[command(about = "Convert between CSV and JSON with a streaming, schema-driven CSV codec")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read CSV and write JSON
    ToJson {
        /// CSV input file ("-" for stdin)
        #[arg(default_value = "-")]
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[command(flatten)]
        format: FormatOpts,

        /// JSON output layout
        #[arg(long, value_enum, default_value_t = JsonLayout::Lines)]
        layout: JsonLayout,

        /// Trim spaces around unquoted values
        #[arg(long)]
        trim_spaces: bool,

        /// Skip blank lines
        #[arg(long)]
        skip_empty_lines: bool,

        /// Read empty cells as null
        #[arg(long)]
        empty_as_null: bool,

        /// Fill columns missing at the end of a row with nulls
        #[arg(long, conflicts_with = "fail_on_missing_columns")]
        insert_nulls: bool,

        /// Reject rows with fewer values than declared columns
        #[arg(long)]
        fail_on_missing_columns: bool,

        /// Drop values past the last declared column instead of failing
        #[arg(long)]
        ignore_extra_columns: bool,

        /// Log and skip rows that fail to parse
        #[arg(long)]
        skip_bad_rows: bool,
    },

    /// Read a JSON array or JSON lines and write CSV
    FromJson {
        /// JSON input file ("-" for stdin)
        #[arg(default_value = "-")]
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,

        #[command(flatten)]
        format: FormatOpts,

        /// Quote every string value
        #[arg(long)]
        always_quote: bool,

        /// Quote only values that need it, checking every character
        #[arg(long)]
        strict_quoting: bool,

        /// Drop fields that have no column
        #[arg(long)]
        ignore_unknown: bool,

        /// Leave out trailing columns that got no value
        #[arg(long)]
        omit_missing_tail_columns: bool,
    },

    /// Tell whether a file looks like CSV
    Detect {
        /// Input file ("-" for stdin)
        #[arg(default_value = "-")]
        input: PathBuf,

        #[command(flatten)]
        format: FormatOpts,
    },
}

fn main() -> anyhow::Result<()> {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ToJson {
            input,
            output,
            format,
            layout,
            trim_spaces,
            skip_empty_lines,
            empty_as_null,
            insert_nulls,
            fail_on_missing_columns,
            ignore_extra_columns,
            skip_bad_rows,
        } => {
            let schema = format.to_schema()?;
            let features = ReadFeatures::default()
                .with_trim_spaces(trim_spaces)
                .with_skip_empty_lines(skip_empty_lines)
                .with_empty_string_as_null(empty_as_null)
                .with_insert_nulls_for_missing_columns(insert_nulls)
                .with_fail_on_missing_columns(fail_on_missing_columns)
                .with_ignore_trailing_unmappable(ignore_extra_columns);
            let stats = convert::csv_to_json(
                open_input(&input)?,
                open_output(output.as_deref())?,
                schema,
                features,
                layout,
                skip_bad_rows,
            )?;
            if stats.skipped > 0 {
                tracing::warn!(skipped = stats.skipped, "Some CSV rows were skipped");
            }
        }
        Commands::FromJson {
            input,
            output,
            format,
            always_quote,
            strict_quoting,
            ignore_unknown,
            omit_missing_tail_columns,
        } => {
            let schema = format.to_schema()?;
            let features = WriteFeatures::default()
                .with_always_quote_strings(always_quote)
                .with_strict_check_for_quoting(strict_quoting)
                .with_ignore_unknown(ignore_unknown)
                .with_omit_missing_tail_columns(omit_missing_tail_columns);
            convert::json_to_csv(
                open_input(&input)?,
                open_output(output.as_deref())?,
                schema,
                features,
            )?;
        }
        Commands::Detect { input, format } => {
            let schema = format.to_schema()?;
            let strength = convert::detect(open_input(&input)?, &schema)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            println!("{strength:?}");
        }
    }

    Ok(())
}

fn open_input(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    if path == Path::new("-") {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file =
        File::open(path).with_context(|| format!("Failed to open input {}", path.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout().lock()))),
    }
}
