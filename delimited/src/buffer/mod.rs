//! Single-consumer dispatch buffer with flow control.
//!
//! [`DispatchBuffer`] decouples the producer of items from their processing. Items are queued
//! without blocking and handed, one at a time and in submission order, to a [`DispatchHandler`]
//! by a worker task owned by the buffer.

mod base;
mod dispatch;

pub use base::{BufferOperation, DispatchHandler, ExceptionOrigin};
pub use dispatch::DispatchBuffer;
