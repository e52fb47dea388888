use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::bail;
use crate::conversions::FromField;
use crate::error::{DelimitedResult, ErrorKind};

/// A key that addresses a field of a [`Row`], either by position or by column name.
pub trait FieldKey: fmt::Display {
    /// Resolves the key to a zero-based field position.
    fn resolve(&self, columns: &[String]) -> DelimitedResult<usize>;
}

impl FieldKey for usize {
    fn resolve(&self, _columns: &[String]) -> DelimitedResult<usize> {
        Ok(*self)
    }
}

impl FieldKey for str {
    fn resolve(&self, columns: &[String]) -> DelimitedResult<usize> {
        match columns.iter().position(|column| column == self) {
            Some(position) => Ok(position),
            None => bail!(
                ErrorKind::ColumnNotFound,
                "Column not found",
                format!("column '{self}' is not one of {columns:?}")
            ),
        }
    }
}

impl FieldKey for String {
    fn resolve(&self, columns: &[String]) -> DelimitedResult<usize> {
        self.as_str().resolve(columns)
    }
}

impl<K> FieldKey for &K
where
    K: FieldKey + ?Sized,
{
    fn resolve(&self, columns: &[String]) -> DelimitedResult<usize> {
        (**self).resolve(columns)
    }
}

/// One physical data line of a delimited stream.
///
/// The raw line is immutable. It is split into fields on first access and the result is cached
/// for the lifetime of the row. The column names and delimiters are shared with every other row
/// of the same stream.
#[derive(Debug, Clone)]
pub struct Row {
    index: u64,
    line: String,
    columns: Arc<[String]>,
    delimiters: Arc<[String]>,
    fields: OnceLock<Vec<String>>,
}

impl Row {
    /// Creates a row from its zero-based sequence index and raw line text.
    pub fn new(
        index: u64,
        line: impl Into<String>,
        columns: Arc<[String]>,
        delimiters: Arc<[String]>,
    ) -> Self {
        Self {
            index,
            line: line.into(),
            columns,
            delimiters,
            fields: OnceLock::new(),
        }
    }

    /// Returns the zero-based sequence index of the row among the data rows of its stream.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Returns the raw line text, without its terminator.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Returns the column names the row is addressed with.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the ordered delimiter set the row is split with.
    pub fn delimiters(&self) -> &[String] {
        &self.delimiters
    }

    /// Returns whether the line has already been split into fields.
    pub fn is_parsed(&self) -> bool {
        self.fields.get().is_some()
    }

    /// Returns every field of the row.
    pub fn fields(&self) -> &[String] {
        self.fields.get_or_init(|| split_line(&self.line, &self.delimiters))
    }

    /// Returns the number of fields in the row.
    pub fn len(&self) -> usize {
        self.fields().len()
    }

    /// Returns `true` when the row has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Returns the text of the field addressed by `key`.
    ///
    /// Fails with [`ErrorKind::ColumnNotFound`] when a column name is not part of the header and
    /// with [`ErrorKind::FieldIndexOutOfRange`] when the line has fewer fields than required.
    pub fn field<K: FieldKey>(&self, key: K) -> DelimitedResult<&str> {
        let position = key.resolve(&self.columns)?;
        let fields = self.fields();

        match fields.get(position) {
            Some(value) => Ok(value),
            None => bail!(
                ErrorKind::FieldIndexOutOfRange,
                "Field index out of range",
                format!(
                    "field '{key}' resolves to position {position} but row {} has {} fields",
                    self.index,
                    fields.len()
                )
            ),
        }
    }

    /// Returns the field addressed by `key`, trimmed and converted to `T`.
    pub fn field_as<T, K>(&self, key: K) -> DelimitedResult<T>
    where
        T: FromField,
        K: FieldKey,
    {
        let value = self.field(&key)?;
        T::from_field(value.trim()).map_err(|err| {
            err.with_detail(format!("field '{key}' of row {}", self.index))
        })
    }
}

/// Splits `line` on the ordered delimiter set.
///
/// At each position the delimiters are tried in order and the first match cuts the line.
/// Adjacent delimiters produce empty fields. Empty delimiters never match.
pub fn split_line(line: &str, delimiters: &[String]) -> Vec<String> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut position = 0;

    while position < line.len() {
        let rest = &line[position..];
        let matched = delimiters
            .iter()
            .find(|delimiter| !delimiter.is_empty() && rest.starts_with(delimiter.as_str()));

        match matched {
            Some(delimiter) => {
                fields.push(line[start..position].to_owned());
                position += delimiter.len();
                start = position;
            }
            None => {
                position += rest.chars().next().map_or(1, char::len_utf8);
            }
        }
    }

    fields.push(line[start..].to_owned());
    fields
}
