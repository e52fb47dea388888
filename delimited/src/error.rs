//! Error types and result definitions for delimited stream processing.
//!
//! [`DelimitedError`] carries an [`ErrorKind`], a static description, optional dynamic detail,
//! an optional source and the call site that created it. Several errors can be folded into one
//! aggregated error when more than one failure has to be reported at once.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use delimited_config::shared::ValidationError;

/// Result type for delimited operations.
pub type DelimitedResult<T> = Result<T, DelimitedError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the crate.
#[derive(Debug, Clone)]
pub struct DelimitedError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<DelimitedError>,
        location: &'static Location<'static>,
    },
}

/// Classification of the failures that can happen while streaming delimited data.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Row access errors
    FieldIndexOutOfRange,
    ColumnNotFound,
    ConversionError,

    // Row processing errors
    ProcessorFailed,
    ProcessorPanic,

    // Dispatch buffer errors
    BufferShutdown,
    BufferPoisoned,
    RuntimeUnavailable,
    WorkerPanic,
    WorkerShutdownTimeout,

    // Source errors
    SourceReadFailed,
    SourceReadTimeout,

    // Completion errors
    CompletionTimeout,
    CompletionSignalLost,

    // State & configuration errors
    InvalidState,
    ConfigError,

    /// Kind of an aggregate that holds no errors.
    Unknown,
}

impl DelimitedError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// Aggregated errors report the kind of their first inner error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every [`ErrorKind`] contained in this error, flattened.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the static description.
    ///
    /// Aggregated errors return a fixed summary.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => &payload.description,
            ErrorRepr::Many { .. } => "Multiple errors",
        }
    }

    /// Returns the dynamic detail, if any.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured backtrace for single errors.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the call site that created this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error, exposed through [`error::Error::source`].
    ///
    /// Has no effect on aggregated errors.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Appends context to the detail of a single error.
    pub fn with_detail<D>(mut self, detail: D) -> Self
    where
        D: Into<Cow<'static, str>>,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            let detail = detail.into();
            payload.detail = Some(match payload.detail.take() {
                Some(existing) => Cow::Owned(format!("{existing}; {detail}")),
                None => detail,
            });
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        DelimitedError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for DelimitedError {
    fn eq(&self, other: &DelimitedError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for DelimitedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                write!(f, "[{:?}] {}", payload.kind, payload.description)?;
                if let Some(detail) = payload.detail.as_deref() {
                    write!(f, ": {detail}")?;
                }
                write!(
                    f,
                    " @ {}:{}",
                    payload.location.file(),
                    payload.location.line()
                )
            }
            ErrorRepr::Many { errors, .. } => {
                write!(f, "[Many] {} errors aggregated", errors.len())?;
                for (index, error) in errors.iter().enumerate() {
                    write!(f, "\n  {}. {error}", index + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl error::Error for DelimitedError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for DelimitedError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> DelimitedError {
        DelimitedError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for DelimitedError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> DelimitedError {
        DelimitedError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates errors; a single error is returned unwrapped.
impl<E> From<Vec<E>> for DelimitedError
where
    E: Into<DelimitedError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> DelimitedError {
        let location = Location::caller();
        let mut errors: Vec<DelimitedError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1
            && let Some(error) = errors.pop()
        {
            return error;
        }

        DelimitedError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

/// I/O errors come from the byte source.
impl From<std::io::Error> for DelimitedError {
    #[track_caller]
    fn from(err: std::io::Error) -> DelimitedError {
        let detail = err.to_string();
        DelimitedError::from_components(
            ErrorKind::SourceReadFailed,
            Cow::Borrowed("Reading the delimited source failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<std::num::ParseIntError> for DelimitedError {
    #[track_caller]
    fn from(err: std::num::ParseIntError) -> DelimitedError {
        let detail = err.to_string();
        DelimitedError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Integer parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<std::num::ParseFloatError> for DelimitedError {
    #[track_caller]
    fn from(err: std::num::ParseFloatError) -> DelimitedError {
        let detail = err.to_string();
        DelimitedError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Float parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<std::str::ParseBoolError> for DelimitedError {
    #[track_caller]
    fn from(err: std::str::ParseBoolError) -> DelimitedError {
        let detail = err.to_string();
        DelimitedError::from_components(
            ErrorKind::ConversionError,
            Cow::Borrowed("Boolean parsing failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Source reads are the only operation bounded through `?` on [`tokio::time::timeout`].
impl From<tokio::time::error::Elapsed> for DelimitedError {
    #[track_caller]
    fn from(err: tokio::time::error::Elapsed) -> DelimitedError {
        let detail = err.to_string();
        DelimitedError::from_components(
            ErrorKind::SourceReadTimeout,
            Cow::Borrowed("Reading the delimited source timed out"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<ValidationError> for DelimitedError {
    #[track_caller]
    fn from(err: ValidationError) -> DelimitedError {
        let detail = err.to_string();
        DelimitedError::from_components(
            ErrorKind::ConfigError,
            Cow::Borrowed("Invalid reader configuration"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delimited_error;

    #[test]
    fn test_kind_and_detail() {
        let err = delimited_error!(ErrorKind::ColumnNotFound, "Column not found", "name");
        assert_eq!(err.kind(), ErrorKind::ColumnNotFound);
        assert_eq!(err.description(), "Column not found");
        assert_eq!(err.detail(), Some("name"));
        assert!(err.to_string().starts_with("[ColumnNotFound] Column not found: name @ "));
    }

    #[test]
    fn test_with_detail_appends() {
        let err = delimited_error!(ErrorKind::ProcessorFailed, "Row processing failed", "boom")
            .with_detail("row 3");
        assert_eq!(err.detail(), Some("boom; row 3"));
    }

    #[test]
    fn test_aggregation() {
        let single: DelimitedError =
            vec![delimited_error!(ErrorKind::WorkerPanic, "Worker panicked")].into();
        assert_eq!(single.kinds(), vec![ErrorKind::WorkerPanic]);

        let many: DelimitedError = vec![
            delimited_error!(ErrorKind::WorkerPanic, "Worker panicked"),
            delimited_error!(ErrorKind::SourceReadFailed, "Reading the delimited source failed"),
        ]
        .into();
        assert_eq!(many.kind(), ErrorKind::WorkerPanic);
        assert_eq!(
            many.kinds(),
            vec![ErrorKind::WorkerPanic, ErrorKind::SourceReadFailed]
        );
        assert!(many.to_string().starts_with("[Many] 2 errors aggregated"));

        let empty = DelimitedError::from(Vec::<DelimitedError>::new());
        assert_eq!(empty.kind(), ErrorKind::Unknown);
        assert!(empty.kinds().is_empty());
    }

    #[test]
    fn test_io_errors_are_source_read_failures() {
        let err: DelimitedError =
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated").into();
        assert_eq!(err.kind(), ErrorKind::SourceReadFailed);
        assert_eq!(err.detail(), Some("truncated"));
        assert!(error::Error::source(&err).is_some());
    }

    #[test]
    fn test_parse_errors_convert_to_conversion_error() {
        let err: DelimitedError = "x".parse::<i32>().unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::ConversionError);
        assert!(error::Error::source(&err).is_some());
    }
}
