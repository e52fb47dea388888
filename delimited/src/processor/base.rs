use std::future::Future;

use tracing::{info, warn};

use crate::error::{DelimitedError, DelimitedResult};
use crate::reader::ProcessCompleted;
use crate::types::Row;

/// Processing logic invoked once per data row of a delimited stream.
///
/// Rows are delivered one at a time, in stream order, from the worker task of the reader's
/// dispatch buffer. Returning `Ok(false)` rejects the row: its raw line is collected and
/// processing continues. Returning an error, or panicking, is reported through
/// [`RowProcessor::report_message`] and also collects the line. Either way the row counts as
/// processed.
pub trait RowProcessor: Send + Sync + 'static {
    /// Processes a row, returning whether it was accepted.
    fn process_row(&self, row: &Row) -> impl Future<Output = DelimitedResult<bool>> + Send;

    /// Diagnostic sink for failures raised while the stream is processed.
    ///
    /// The default implementation logs through [`tracing`].
    fn report_message(&self, message: &str, error: Option<&DelimitedError>) {
        match error {
            Some(error) => warn!(error = %error, "{message}"),
            None => info!("{message}"),
        }
    }

    /// Called once when every produced row has been processed.
    ///
    /// The default implementation does nothing.
    fn completed(&self, _completed: &ProcessCompleted) {}
}
