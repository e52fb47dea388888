//! Shorthands for building and returning [`crate::error::DelimitedError`] values.

/// Builds a [`crate::error::DelimitedError`].
///
/// Takes an [`crate::error::ErrorKind`], a static description, an optional detail (anything
/// implementing [`ToString`]) and an optional `source:` error, in that order.
#[macro_export]
macro_rules! delimited_error {
    ($kind:expr, $desc:expr $(, source: $source:expr)?) => {
        $crate::error::DelimitedError::from(($kind, $desc))
            $(.with_source($source))?
    };
    ($kind:expr, $desc:expr, $detail:expr $(, source: $source:expr)?) => {
        $crate::error::DelimitedError::from(($kind, $desc, $detail.to_string()))
            $(.with_source($source))?
    };
}

/// Returns early with the [`crate::error::DelimitedError`] built by [`delimited_error!`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return ::core::result::Result::Err($crate::delimited_error!($($arg)*))
    };
}
