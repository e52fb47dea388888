use std::fmt;
use std::future::Future;

use crate::error::{DelimitedError, DelimitedResult};

/// Control-plane operations of a [`crate::buffer::DispatchBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferOperation {
    Enqueue,
    Deliver,
    Stop,
    Resume,
    Reset,
    Sort,
    Shutdown,
}

impl BufferOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferOperation::Enqueue => "enqueue",
            BufferOperation::Deliver => "deliver",
            BufferOperation::Stop => "stop",
            BufferOperation::Resume => "resume",
            BufferOperation::Reset => "reset",
            BufferOperation::Sort => "sort",
            BufferOperation::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for BufferOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an error reported to [`DispatchHandler::exception`] came from.
#[derive(Debug)]
pub enum ExceptionOrigin<'a, T> {
    /// The buffer machinery failed while running `operation`.
    Buffer(BufferOperation),
    /// The handler failed or panicked while processing a delivered item.
    Item { sequence: u64, item: &'a T },
}

/// Receives the items and notifications of a [`crate::buffer::DispatchBuffer`].
///
/// Item callbacks are invoked from the single worker task of the buffer, so they never overlap.
/// [`DispatchHandler::exception`] is also called from the caller of a control-plane operation
/// when that operation fails.
pub trait DispatchHandler<T>: Send + Sync + 'static {
    /// Processes a delivered item.
    ///
    /// An error or a panic is reported through [`DispatchHandler::exception`] and delivery
    /// continues with the next item.
    fn handle(&self, item: &T) -> impl Future<Output = DelimitedResult<()>> + Send;

    /// Called whenever an item handler or a buffer operation fails.
    fn exception(&self, origin: ExceptionOrigin<'_, T>, error: DelimitedError);

    /// Called once the delivery of the item with `sequence` has finished, including the report
    /// of its failure if there was one.
    fn settled(&self, _sequence: u64) {}

    /// Called when the worker finds the queue empty after delivering at least one item.
    fn drained(&self) {}
}
