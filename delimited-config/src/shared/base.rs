use thiserror::Error;

/// Errors raised when a configuration value violates its constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A field holds a value outside of its allowed range.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
    /// A delimiter entry is the empty string.
    #[error("Delimiter at position {0} is empty")]
    EmptyDelimiter(usize),
}
