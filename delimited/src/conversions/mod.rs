//! Conversion of field text into typed values.
//!
//! Conversions receive text that has already been trimmed by the row accessor.

mod boolean;

pub use boolean::parse_bool;

use crate::error::DelimitedResult;

/// Types a field can be converted into with [`crate::types::Row::field_as`].
pub trait FromField: Sized {
    /// Converts the trimmed field text into `Self`.
    fn from_field(value: &str) -> DelimitedResult<Self>;
}

macro_rules! impl_from_field_via_parse {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromField for $ty {
                fn from_field(value: &str) -> DelimitedResult<Self> {
                    Ok(value.parse::<$ty>()?)
                }
            }
        )*
    };
}

impl_from_field_via_parse!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64
);

impl FromField for bool {
    fn from_field(value: &str) -> DelimitedResult<Self> {
        parse_bool(value)
    }
}

impl FromField for String {
    fn from_field(value: &str) -> DelimitedResult<Self> {
        Ok(value.to_owned())
    }
}
