//! Streaming delimited text processing.
//!
//! A [`reader::DelimitedReader`] consumes a byte source in fixed-size chunks, splits it into
//! lines, turns every line after the header into a [`types::Row`] and hands the rows, in order,
//! to a [`processor::RowProcessor`] running on the worker task of a [`buffer::DispatchBuffer`].
//! Reading never waits for processing, and a one-shot completion notification fires once every
//! produced row has been processed.
//!
//! ```no_run
//! use delimited::reader::DelimitedReader;
//! use delimited::types::Row;
//!
//! # async fn run() -> delimited::error::DelimitedResult<()> {
//! let input: &[u8] = b"id,name\n1,Alice\nx,Bob\n";
//! let reader = DelimitedReader::csv(|row: &Row| row.field_as::<u32, _>("id").is_ok());
//! let summary = reader.process(input).await?;
//! assert_eq!(summary.rejected_lines, vec!["x,Bob".to_string()]);
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod concurrency;
pub mod conversions;
pub mod error;
mod macros;
pub mod metrics;
pub mod processor;
pub mod reader;
pub mod types;
