//! Data types produced by the reader.

mod row;

pub use row::*;
