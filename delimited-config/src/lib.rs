//! Configuration for streaming delimited readers.
//!
//! The [`shared`] module holds the serde types consumed by the `delimited` crate and the
//! [`load`] module builds them from configuration files and environment variables.

pub mod load;
pub mod shared;
