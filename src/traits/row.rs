//! Result rows.
//!
//! All values are text: bound parameters are bound as text and every column
//! is read back as text, whatever its declared SQL type. SQL `NULL` reads
//! as an empty string.

use crate::error::Error;

/// One fetched row, copied out of the engine's buffers.
///
/// A row may carry an error that occurred *after* its data was read (while
/// stepping to the next row). The data is still valid in that case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: Vec<String>,
    error: Option<Error>,
}

impl Row {
    /// Create a new row from column values
    pub fn new(values: Vec<String>) -> Self {
        Self {
            values,
            error: None,
        }
    }

    /// Create a row with data and an error observed after reading it
    pub fn with_error(values: Vec<String>, error: Error) -> Self {
        Self {
            values,
            error: Some(error),
        }
    }

    /// Create a row that only carries an error
    pub fn failed(error: Error) -> Self {
        Self::with_error(Vec::new(), error)
    }

    /// Get the number of columns
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a column value by index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    /// All column values in order
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Iterate over column values
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    /// The error attached to this row, if any
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Remove and return the attached error
    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    /// Consume the row, returning its values
    pub fn into_values(self) -> Vec<String> {
        self.values
    }
}

impl IntoIterator for Row {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
