//! Shared configuration types for delimited readers.

mod base;
mod buffer;
mod format;
mod reader;

pub use base::ValidationError;
pub use buffer::BufferConfig;
pub use format::DelimitedFormat;
pub use reader::ReaderConfig;
