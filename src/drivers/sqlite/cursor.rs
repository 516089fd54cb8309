//! Synchronous result cursor.

use std::borrow::{Borrow, BorrowMut};
use std::collections::HashMap;
use std::fmt;

use super::ffi::{SQLITE_DONE, SQLITE_ROW};
use super::statement::{Statement, StatementState};
use crate::error::{Error, Result};
use crate::traits::{ResultCursor, Row};

/// Pull-based cursor over one execution of a [`Statement`].
///
/// `S` is how the cursor holds its statement: `&mut Statement` for the usual
/// borrowed cursor, or `Statement` itself when the cursor has to move to
/// another thread (see [`Connection::stream`](super::Connection::stream)).
/// Either way the cursor has the exclusive right to step the statement.
///
/// When the rows run out the statement is reset and unbound, ready for the
/// next execution.
pub struct Cursor<S> {
    statement: S,
    more: bool,
}

impl<S: Borrow<Statement>> fmt::Debug for Cursor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("statement", self.statement.borrow())
            .field("more", &self.more)
            .finish()
    }
}

impl<S: BorrowMut<Statement>> Cursor<S> {
    /// Wrap a statement that has just produced its first row.
    pub(crate) fn new(statement: S) -> Self {
        Self {
            statement,
            more: true,
        }
    }

    /// True until exhaustion has been observed.
    pub fn has_more(&self) -> bool {
        self.more
    }

    /// The statement being stepped.
    pub fn statement(&self) -> &Statement {
        self.statement.borrow()
    }

    /// Give the statement back.
    ///
    /// If rows were left unread the statement is still `Active`; the next
    /// execution clears it.
    pub fn into_statement(self) -> S {
        self.statement
    }

    /// Names of the result columns, in order.
    pub fn column_names(&self) -> Vec<String> {
        let raw = &self.statement().raw;
        (0..raw.column_count()).map(|i| raw.column_name(i)).collect()
    }

    /// Read the current row as text, then step to the next one.
    pub fn fetch_one(&mut self) -> Result<Row> {
        if !self.more {
            return Err(Error::driver("FetchOne: no results to fetch"));
        }

        let statement = self.statement.borrow_mut();
        let columns = statement.raw.column_count();
        if columns == 0 {
            return Err(Error::driver("FetchOne: no columns in result"));
        }
        let values: Vec<String> = (0..columns).map(|i| statement.raw.column_text(i)).collect();

        match statement.raw.step() {
            SQLITE_ROW => Ok(Row::new(values)),
            SQLITE_DONE => {
                self.more = false;
                let cleared = statement.clear();
                statement.state = StatementState::Exhausted;
                Ok(match cleared {
                    Ok(()) => Row::new(values),
                    Err(e) => Row::with_error(values, e),
                })
            }
            _ => {
                // The row already read is still good; the failure to
                // advance travels with it and ends the cursor.
                let err = statement.last_error();
                self.more = false;
                statement.clear_quietly();
                statement.state = StatementState::Exhausted;
                Ok(Row::with_error(values, err))
            }
        }
    }

    /// Fetch the current row keyed by column name.
    ///
    /// A failure to advance past the row is returned as the error.
    pub fn fetch_named(&mut self) -> Result<HashMap<String, String>> {
        let names = self.column_names();
        let mut row = self.fetch_one()?;
        if let Some(e) = row.take_error() {
            return Err(e);
        }
        Ok(names.into_iter().zip(row).collect())
    }
}

impl<S: BorrowMut<Statement>> ResultCursor for Cursor<S> {
    fn has_more(&self) -> bool {
        Cursor::has_more(self)
    }

    fn fetch_one(&mut self) -> Result<Row> {
        Cursor::fetch_one(self)
    }

    fn discard(&mut self) -> Result<()> {
        if !self.more {
            return Ok(());
        }
        self.more = false;
        let statement = self.statement.borrow_mut();
        statement.clear()?;
        statement.state = StatementState::Exhausted;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.more = false;
        Ok(())
    }
}
