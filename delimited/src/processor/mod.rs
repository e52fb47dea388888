//! Pluggable per-row processing.

mod base;
mod closure;

pub use base::RowProcessor;
pub use closure::FnRowProcessor;
