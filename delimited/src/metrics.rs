//! Metric names recorded through the [`metrics`] facade.
//!
//! Without an installed recorder the calls are no-ops.

/// Label for the error kind of a failed item.
pub const ERROR_KIND_LABEL: &str = "error_kind";

/// Label for the operation that caused a control-plane failure.
pub const OPERATION_LABEL: &str = "operation";

// Reader metrics

/// Counter for rows handed to the dispatch buffer.
pub const DELIMITED_ROWS_PRODUCED_TOTAL: &str = "delimited_rows_produced_total";

/// Counter for rows whose processing finished, accepted or not.
pub const DELIMITED_ROWS_PROCESSED_TOTAL: &str = "delimited_rows_processed_total";

/// Counter for rows the processor rejected or failed on.
pub const DELIMITED_ROWS_REJECTED_TOTAL: &str = "delimited_rows_rejected_total";

// Buffer metrics

/// Counter for errors raised by the consumer or the buffer control plane.
pub const DELIMITED_BUFFER_EXCEPTIONS_TOTAL: &str = "delimited_buffer_exceptions_total";

/// Counter for queued items dropped by reset or shutdown.
pub const DELIMITED_BUFFER_ITEMS_DISCARDED_TOTAL: &str = "delimited_buffer_items_discarded_total";
