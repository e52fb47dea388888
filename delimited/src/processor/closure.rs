use std::fmt;

use crate::error::DelimitedResult;
use crate::processor::RowProcessor;
use crate::types::Row;

/// [`RowProcessor`] backed by a synchronous closure returning accept or reject.
pub struct FnRowProcessor<F> {
    process: F,
}

impl<F> FnRowProcessor<F>
where
    F: Fn(&Row) -> bool + Send + Sync + 'static,
{
    pub fn new(process: F) -> Self {
        Self { process }
    }
}

impl<F> fmt::Debug for FnRowProcessor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRowProcessor").finish_non_exhaustive()
    }
}

impl<F> RowProcessor for FnRowProcessor<F>
where
    F: Fn(&Row) -> bool + Send + Sync + 'static,
{
    async fn process_row(&self, row: &Row) -> DelimitedResult<bool> {
        Ok((self.process)(row))
    }
}
