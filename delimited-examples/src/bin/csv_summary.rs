/*

CSV Summary Example

This example streams a delimited file through a `DelimitedReader` and prints
a short summary once every row has been processed.

A row is accepted when it has exactly one field per header column and, if
`--numeric-column` is given, when that column parses as a number. Every other
row is rejected and listed at the end.

Usage:
    cargo run -p delimited-examples --bin csv_summary -- \
        --path data/orders.csv \
        --format csv \
        --numeric-column amount

Custom delimiters can be given more than once and take precedence over
`--format`:
    cargo run -p delimited-examples --bin csv_summary -- \
        --path data/mixed.txt \
        --delimiter ";" \
        --delimiter ","

With `--from-config` the reader settings are loaded from the `configuration`
directory and `APP_`-prefixed environment variables instead of the flags.

*/

use clap::{Parser, ValueEnum};
use delimited::error::DelimitedResult;
use delimited::processor::RowProcessor;
use delimited::reader::DelimitedReader;
use delimited::types::Row;
use delimited_config::load::load_config;
use delimited_config::shared::{DelimitedFormat, ReaderConfig};
use delimited_telemetry::tracing::init_tracing;
use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tokio::fs::File;
use tracing::{error, info};

/// Command line arguments of the summary tool.
#[derive(Debug, Parser)]
#[command(name = "csv_summary", version, about, arg_required_else_help = true)]
struct AppArgs {
    /// Path of the delimited file to read
    #[arg(long)]
    path: PathBuf,
    /// Well known format selecting the delimiter
    #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
    format: FormatArg,
    /// Custom delimiter, can be repeated (overrides --format)
    #[arg(long = "delimiter")]
    delimiters: Vec<String>,
    /// Bytes requested per read (non-positive values use the default)
    #[arg(long, default_value_t = ReaderConfig::DEFAULT_BUFFER_SIZE as i64, allow_negative_numbers = true)]
    buffer_size: i64,
    /// Zero-based line holding the column names
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    header_line: i64,
    /// Column whose values must parse as numbers
    #[arg(long)]
    numeric_column: Option<String>,
    /// Load reader settings from configuration files and environment instead
    #[arg(long, default_value_t = false)]
    from_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Csv,
    Tsv,
    Pipe,
}

impl From<FormatArg> for DelimitedFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Csv => DelimitedFormat::Csv,
            FormatArg::Tsv => DelimitedFormat::Tsv,
            FormatArg::Pipe => DelimitedFormat::Pipe,
        }
    }
}

/// Accepts well-formed rows and keeps a running total of the numeric column.
struct SummaryProcessor {
    numeric_column: Option<String>,
    accepted: AtomicU64,
    // Sum of the numeric column, scaled to hundredths.
    total_cents: AtomicI64,
}

impl SummaryProcessor {
    fn new(numeric_column: Option<String>) -> Self {
        Self {
            numeric_column,
            accepted: AtomicU64::new(0),
            total_cents: AtomicI64::new(0),
        }
    }

    fn total(&self) -> f64 {
        self.total_cents.load(Ordering::Relaxed) as f64 / 100.0
    }
}

impl RowProcessor for SummaryProcessor {
    async fn process_row(&self, row: &Row) -> DelimitedResult<bool> {
        if row.len() != row.columns().len() {
            return Ok(false);
        }

        if let Some(column) = &self.numeric_column {
            let Ok(value) = row.field_as::<f64, _>(column) else {
                return Ok(false);
            };
            self.total_cents
                .fetch_add((value * 100.0).round() as i64, Ordering::Relaxed);
        }

        self.accepted.fetch_add(1, Ordering::Relaxed);

        Ok(true)
    }
}

/// Entry point, handles error reporting and process exit.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    if let Err(e) = main_impl().await {
        error!("{e}");
        std::process::exit(1);
    }

    Ok(())
}

/// Builds the reader configuration from the flags or the configuration files.
fn reader_config(args: &AppArgs) -> Result<ReaderConfig, Box<dyn Error>> {
    if args.from_config {
        return Ok(load_config::<ReaderConfig>()?);
    }

    let mut config = if args.delimiters.is_empty() {
        ReaderConfig::for_format(args.format.into())
    } else {
        ReaderConfig::with_delimiters(args.delimiters.iter().cloned())
    };
    config.buffer_size = args.buffer_size;
    config.header_line = args.header_line;

    Ok(config)
}

async fn main_impl() -> Result<(), Box<dyn Error>> {
    init_tracing(env!("CARGO_BIN_NAME"))?;

    let args = AppArgs::parse();
    let config = reader_config(&args)?;

    let file = File::open(&args.path).await?;
    info!(path = %args.path.display(), "summarizing delimited file");

    let reader = DelimitedReader::new(SummaryProcessor::new(args.numeric_column), config)?;
    let summary = reader.process(file).await?;

    let processor = reader.processor();
    println!("{}", summary.message);
    println!(
        "columns:   {}",
        reader.columns().map(|c| c.join(", ")).unwrap_or_default()
    );
    println!("rows:      {}", summary.input_count);
    println!("accepted:  {}", processor.accepted.load(Ordering::Relaxed));
    println!("rejected:  {}", summary.rejected_lines.len());
    if processor.numeric_column.is_some() {
        println!("total:     {:.2}", processor.total());
    }

    for line in &summary.rejected_lines {
        println!("  rejected: {line}");
    }

    Ok(())
}
