use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::load::Config;
use crate::shared::{BufferConfig, DelimitedFormat, ValidationError};

/// Configuration of a streaming delimited reader.
///
/// Out-of-range values for [`ReaderConfig::buffer_size`] and [`ReaderConfig::header_line`]
/// are tolerated and normalized by [`ReaderConfig::effective_buffer_size`] and
/// [`ReaderConfig::effective_header_line`], so callers can pass raw user input through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReaderConfig {
    /// Number of bytes requested from the source on each read.
    ///
    /// Non-positive values fall back to [`ReaderConfig::DEFAULT_BUFFER_SIZE`].
    #[serde(default = "default_buffer_size")]
    pub buffer_size: i64,
    /// Zero-based physical line holding the column names.
    ///
    /// Negative values are clamped to zero.
    #[serde(default)]
    pub header_line: i64,
    /// Ordered delimiter set used for both the header and the data lines.
    #[serde(default = "default_delimiters")]
    pub delimiters: Vec<String>,
    /// Upper bound, in milliseconds, for a single read from the source.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Optional upper bound, in milliseconds, for waiting on the completion signal.
    ///
    /// When unset the reader waits until every row has been processed.
    #[serde(default)]
    pub completion_timeout_ms: Option<u64>,
    /// Dispatch buffer settings.
    #[serde(default)]
    pub buffer: BufferConfig,
}

impl ReaderConfig {
    /// Bytes requested per read when no positive size was configured.
    pub const DEFAULT_BUFFER_SIZE: usize = 1024;

    /// Default delimiter when none is configured.
    pub const DEFAULT_DELIMITER: &'static str = ",";

    /// Default upper bound for a single read.
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 30_000;

    /// Builds a configuration using the delimiter of `format` and defaults elsewhere.
    pub fn for_format(format: DelimitedFormat) -> Self {
        Self {
            delimiters: format.delimiters(),
            ..Self::default()
        }
    }

    /// Builds a configuration with the given delimiters and defaults elsewhere.
    ///
    /// An empty delimiter list falls back to a single comma.
    pub fn with_delimiters<I, S>(delimiters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let delimiters: Vec<String> = delimiters.into_iter().map(Into::into).collect();

        Self {
            delimiters,
            ..Self::default()
        }
    }

    /// Returns the number of bytes to request per read.
    pub fn effective_buffer_size(&self) -> usize {
        if self.buffer_size > 0 {
            usize::try_from(self.buffer_size).unwrap_or(Self::DEFAULT_BUFFER_SIZE)
        } else {
            Self::DEFAULT_BUFFER_SIZE
        }
    }

    /// Returns the header line index, clamped to zero.
    pub fn effective_header_line(&self) -> u64 {
        u64::try_from(self.header_line).unwrap_or(0)
    }

    /// Returns the delimiter set, falling back to a single comma when none was configured.
    pub fn effective_delimiters(&self) -> Vec<String> {
        if self.delimiters.is_empty() {
            return vec![Self::DEFAULT_DELIMITER.to_string()];
        }

        self.delimiters.clone()
    }

    /// Returns the read timeout as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Returns the completion timeout as a [`Duration`], if one is configured.
    pub fn completion_timeout(&self) -> Option<Duration> {
        self.completion_timeout_ms.map(Duration::from_millis)
    }

    /// Validates reader settings.
    ///
    /// Delimiters must be non-empty strings and the read timeout must be positive.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(position) = self.delimiters.iter().position(|d| d.is_empty()) {
            return Err(ValidationError::EmptyDelimiter(position));
        }

        if self.read_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "read_timeout_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.completion_timeout_ms == Some(0) {
            return Err(ValidationError::InvalidFieldValue {
                field: "completion_timeout_ms".to_string(),
                constraint: "must be greater than 0 when set".to_string(),
            });
        }

        self.buffer.validate()
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            header_line: 0,
            delimiters: default_delimiters(),
            read_timeout_ms: default_read_timeout_ms(),
            completion_timeout_ms: None,
            buffer: BufferConfig::default(),
        }
    }
}

impl Config for ReaderConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["delimiters"];
}

fn default_buffer_size() -> i64 {
    ReaderConfig::DEFAULT_BUFFER_SIZE as i64
}

fn default_delimiters() -> Vec<String> {
    vec![ReaderConfig::DEFAULT_DELIMITER.to_string()]
}

fn default_read_timeout_ms() -> u64 {
    ReaderConfig::DEFAULT_READ_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReaderConfig::default();
        assert_eq!(config.effective_buffer_size(), 1024);
        assert_eq!(config.effective_header_line(), 0);
        assert_eq!(config.effective_delimiters(), vec![",".to_string()]);
        assert_eq!(config.read_timeout(), Duration::from_secs(30));
        assert!(config.completion_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_positive_buffer_size_uses_default() {
        for buffer_size in [0, -1, -4096] {
            let config = ReaderConfig {
                buffer_size,
                ..Default::default()
            };
            assert_eq!(config.effective_buffer_size(), ReaderConfig::DEFAULT_BUFFER_SIZE);
        }

        let config = ReaderConfig {
            buffer_size: 7,
            ..Default::default()
        };
        assert_eq!(config.effective_buffer_size(), 7);
    }

    #[test]
    fn test_negative_header_line_is_clamped() {
        let config = ReaderConfig {
            header_line: -3,
            ..Default::default()
        };
        assert_eq!(config.effective_header_line(), 0);
    }

    #[test]
    fn test_empty_delimiter_list_falls_back_to_comma() {
        let config = ReaderConfig::with_delimiters(Vec::<String>::new());
        assert_eq!(config.effective_delimiters(), vec![",".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_delimiter() {
        let config = ReaderConfig::with_delimiters([",", ""]);
        assert_eq!(config.validate(), Err(ValidationError::EmptyDelimiter(1)));
    }

    #[test]
    fn test_validate_zero_completion_timeout() {
        let config = ReaderConfig {
            completion_timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_for_format() {
        assert_eq!(
            ReaderConfig::for_format(DelimitedFormat::Tsv).effective_delimiters(),
            vec!["\t".to_string()]
        );
        assert_eq!(
            ReaderConfig::for_format(DelimitedFormat::Pipe).effective_delimiters(),
            vec!["|".to_string()]
        );
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: ReaderConfig =
            serde_json::from_str(r#"{ "header_line": 2, "delimiters": [";"] }"#).unwrap();
        assert_eq!(config.effective_header_line(), 2);
        assert_eq!(config.effective_delimiters(), vec![";".to_string()]);
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.buffer, BufferConfig::default());
    }
}
