//! Telemetry setup shared by the delimited crates and binaries.

pub mod tracing;
