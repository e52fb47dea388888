use serde::{Deserialize, Serialize};
use std::fmt;

/// Well known delimited text variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelimitedFormat {
    /// Comma separated values.
    Csv,
    /// Tab separated values.
    Tsv,
    /// Pipe separated values.
    Pipe,
}

impl DelimitedFormat {
    /// Returns the delimiter used by this format.
    pub fn delimiter(&self) -> &'static str {
        match self {
            DelimitedFormat::Csv => ",",
            DelimitedFormat::Tsv => "\t",
            DelimitedFormat::Pipe => "|",
        }
    }

    /// Returns the delimiter set for this format.
    pub fn delimiters(&self) -> Vec<String> {
        vec![self.delimiter().to_string()]
    }
}

impl fmt::Display for DelimitedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelimitedFormat::Csv => f.write_str("csv"),
            DelimitedFormat::Tsv => f.write_str("tsv"),
            DelimitedFormat::Pipe => f.write_str("pipe"),
        }
    }
}
