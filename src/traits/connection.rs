//! Core driver traits.
//!
//! This module defines the `DatabaseConnection` trait a driver implements, the
//! `PreparedStatement` and `ResultCursor` traits for the objects it hands out,
//! and [`execute_directly`], a one-shot helper built only from those traits.

use super::row::Row;
use crate::error::{Error, Result};

/// A connection that can compile and run statements.
///
/// # Example
///
/// ```ignore
/// use sqlite3_driver::traits::{DatabaseConnection, ResultCursor};
///
/// fn names<C: DatabaseConnection>(conn: &C) -> Result<Vec<Row>> {
///     let mut statement = conn.prepare("SELECT name FROM users WHERE active = ?")?;
///     match conn.execute(&mut statement, &["1"])? {
///         Some(mut cursor) => cursor.fetch_all(),
///         None => Ok(Vec::new()),
///     }
/// }
/// ```
pub trait DatabaseConnection: Sized {
    /// Precompiled statement type produced by [`prepare`](Self::prepare).
    type Statement: PreparedStatement;

    /// Cursor type produced by [`execute`](Self::execute).
    type Cursor<'s>: ResultCursor
    where
        Self: 's;

    /// Compile `query` once so it can be executed repeatedly.
    fn prepare(&self, query: &str) -> Result<Self::Statement>;

    /// Bind `params` to the statement's `?` slots in order and step once.
    ///
    /// Returns a cursor when the statement produced a row and `None` when it
    /// ran to completion. In both the `None` and the error case the
    /// statement is left ready for another execution.
    ///
    /// # Errors
    ///
    /// - A driver error when the parameter count doesn't match
    /// - An engine error when binding or stepping fails
    fn execute<'s>(
        &'s self,
        statement: &'s mut Self::Statement,
        params: &[&str],
    ) -> Result<Option<Self::Cursor<'s>>>;

    /// The engine's most recent error on this connection.
    fn last_error(&self) -> Error;

    /// Close the connection. It cannot be used afterwards.
    fn close(self) -> Result<()>;
}

/// A precompiled statement.
pub trait PreparedStatement: Sized {
    /// The original SQL text
    fn text(&self) -> String;

    /// Release the statement. It cannot be used afterwards.
    fn close(self) -> Result<()>;
}

/// A pull-based view over the rows of one execution.
///
/// Only [`has_more`](Self::has_more), [`fetch_one`](Self::fetch_one),
/// [`discard`](Self::discard) and [`close`](Self::close) are required; the
/// batch fetches are built on `fetch_one`.
pub trait ResultCursor {
    /// True until exhaustion has been observed
    fn has_more(&self) -> bool;

    /// Read the current row and advance.
    ///
    /// Fails with a driver error once the cursor is exhausted. If advancing
    /// fails after the row was read, the row is returned with the error
    /// attached.
    fn fetch_one(&mut self) -> Result<Row>;

    /// Fetch up to `count` rows.
    ///
    /// Stops at the first failed fetch, including a row returned with an
    /// attached error (that row is dropped). The error is only returned
    /// when no rows were collected at all; otherwise it is hidden and the
    /// partial list is returned.
    fn fetch_many(&mut self, count: usize) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let mut failure = None;

        while rows.len() < count {
            match next_clean_row(self) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        match failure {
            Some(e) if rows.is_empty() => Err(e),
            _ => Ok(rows),
        }
    }

    /// Fetch every remaining row.
    ///
    /// Same error policy as [`fetch_many`](Self::fetch_many). Fetching from
    /// an already exhausted cursor returns the "no results" error.
    fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();

        loop {
            match next_clean_row(self) {
                Ok(row) => rows.push(row),
                Err(e) if rows.is_empty() => return Err(e),
                Err(_) => return Ok(rows),
            }
        }
    }

    /// Abandon any unread rows and return the statement to a clean state.
    fn discard(&mut self) -> Result<()>;

    /// Stop using the cursor. Does not reset the underlying statement.
    fn close(&mut self) -> Result<()>;
}

fn next_clean_row<C: ResultCursor + ?Sized>(cursor: &mut C) -> Result<Row> {
    let mut row = cursor.fetch_one()?;
    match row.take_error() {
        Some(e) => Err(e),
        None => Ok(row),
    }
}

/// Fetch every remaining row, failing on the first row that carries an
/// error. Unlike [`ResultCursor::fetch_all`] nothing is hidden.
fn fetch_all_strict<C: ResultCursor + ?Sized>(cursor: &mut C) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    while cursor.has_more() {
        rows.push(next_clean_row(cursor)?);
    }
    Ok(rows)
}

/// Prepare, execute, fetch everything and clean up in one call.
///
/// Statements that produce no rows return an empty list. A failure while
/// stepping through the rows is returned as the error, even when some rows
/// were already read.
pub fn execute_directly<C: DatabaseConnection>(
    connection: &C,
    query: &str,
    params: &[&str],
) -> Result<Vec<Row>> {
    let mut statement = connection.prepare(query)?;

    let rows = match connection.execute(&mut statement, params) {
        Ok(Some(mut cursor)) => {
            let rows = fetch_all_strict(&mut cursor);
            if let Err(e) = cursor.close() {
                tracing::warn!("Ignoring error while closing cursor: {}", e);
            }
            rows
        }
        Ok(None) => Ok(Vec::new()),
        Err(e) => Err(e),
    };

    match rows {
        Ok(rows) => {
            statement.close()?;
            Ok(rows)
        }
        Err(e) => {
            if let Err(secondary) = statement.close() {
                tracing::warn!("Ignoring error while closing statement: {}", secondary);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Cursor over canned rows, for exercising the provided batch fetches.
    struct VecCursor {
        rows: std::vec::IntoIter<Row>,
        more: bool,
    }

    impl VecCursor {
        fn new(rows: Vec<Row>) -> Self {
            let more = !rows.is_empty();
            Self {
                rows: rows.into_iter(),
                more,
            }
        }
    }

    impl ResultCursor for VecCursor {
        fn has_more(&self) -> bool {
            self.more
        }

        fn fetch_one(&mut self) -> Result<Row> {
            if !self.more {
                return Err(Error::driver("FetchOne: no results to fetch"));
            }
            let row = self.rows.next().unwrap_or_default();
            self.more = self.rows.len() > 0;
            Ok(row)
        }

        fn discard(&mut self) -> Result<()> {
            self.more = false;
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn text_row(value: &str) -> Row {
        Row::new(vec![value.to_string()])
    }

    #[test]
    fn test_fetch_many_stops_at_count() {
        let mut cursor = VecCursor::new(vec![text_row("a"), text_row("b"), text_row("c")]);
        let rows = cursor.fetch_many(2).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(cursor.has_more());
    }

    #[test]
    fn test_fetch_many_hides_trailing_error() {
        let mut cursor = VecCursor::new(vec![
            text_row("a"),
            Row::with_error(vec!["b".to_string()], Error::driver("step failed")),
            text_row("c"),
        ]);
        let rows = cursor.fetch_many(10).unwrap();
        assert_eq!(rows, vec![text_row("a")]);
    }

    #[test]
    fn test_fetch_many_surfaces_error_without_rows() {
        let mut cursor = VecCursor::new(vec![Row::with_error(
            vec!["a".to_string()],
            Error::driver("step failed"),
        )]);
        let err = cursor.fetch_many(10).unwrap_err();
        assert_eq!(err, Error::driver("step failed"));
    }

    #[test]
    fn test_fetch_many_zero_is_empty() {
        let mut cursor = VecCursor::new(vec![]);
        assert!(cursor.fetch_many(0).unwrap().is_empty());
    }

    #[test]
    fn test_strict_fetch_fails_on_trailing_error() {
        let mut cursor = VecCursor::new(vec![
            text_row("a"),
            Row::with_error(vec!["b".to_string()], Error::driver("step failed")),
            text_row("c"),
        ]);
        let err = fetch_all_strict(&mut cursor).unwrap_err();
        assert_eq!(err, Error::driver("step failed"));
    }

    #[test]
    fn test_strict_fetch_collects_clean_rows() {
        let mut cursor = VecCursor::new(vec![text_row("x"), text_row("y")]);
        assert_eq!(
            fetch_all_strict(&mut cursor).unwrap(),
            vec![text_row("x"), text_row("y")]
        );
        assert!(fetch_all_strict(&mut cursor).unwrap().is_empty());
    }

    #[test]
    fn test_fetch_all_collects_until_exhausted() {
        let mut cursor = VecCursor::new(vec![text_row("x"), text_row("y"), text_row("z")]);
        let rows = cursor.fetch_all().unwrap();
        assert_eq!(rows.len(), 3);
        assert!(!cursor.has_more());

        let err = cursor.fetch_all().unwrap_err();
        assert!(err.is_driver());
    }
}
