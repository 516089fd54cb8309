//! SQLite prepared statements.

use std::fmt;
use std::sync::Arc;

use super::ffi::{RawConnection, RawStatement, SQLITE_OK};
use crate::error::{Error, Result};
use crate::traits::PreparedStatement;

/// Where a statement is in its execute/fetch cycle.
///
/// `Prepared` and `Exhausted` are both ready for another execution; closing
/// a statement consumes it, so there is no closed state to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Compiled, nothing bound, not stepped
    Prepared,
    /// Parameters bound and at least one row produced
    Active,
    /// Rows ran out; the statement was reset and unbound
    Exhausted,
}

impl StatementState {
    /// Check whether the statement can be executed without clearing it first
    pub fn is_ready(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// A precompiled SQL statement.
///
/// Created by [`Connection::prepare`](super::Connection::prepare). Holds a
/// back-reference to its connection, so the native connection stays open
/// for as long as any statement prepared on it exists. Finalized when
/// closed or dropped.
pub struct Statement {
    // Declared first so the statement is finalized before the connection
    // reference is released.
    pub(crate) raw: RawStatement,
    connection: Arc<RawConnection>,
    pub(crate) state: StatementState,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.text())
            .field("state", &self.state)
            .finish()
    }
}

impl Statement {
    pub(crate) fn new(raw: RawStatement, connection: Arc<RawConnection>) -> Self {
        Self {
            raw,
            connection,
            state: StatementState::Prepared,
        }
    }

    /// The original SQL text, as stored by the engine.
    pub fn text(&self) -> String {
        self.raw.sql()
    }

    /// Number of `?` parameter slots.
    pub fn parameter_count(&self) -> usize {
        self.raw.bind_parameter_count()
    }

    /// Number of columns in each result row (0 for statements without rows).
    pub fn column_count(&self) -> usize {
        self.raw.column_count()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StatementState {
        self.state
    }

    /// Finalize the statement and release the connection reference.
    pub fn close(self) -> Result<()> {
        let Self {
            raw, connection, ..
        } = self;

        if raw.finalize() != SQLITE_OK {
            return Err(connection.last_error().into());
        }
        Ok(())
    }

    pub(crate) fn belongs_to(&self, connection: &Arc<RawConnection>) -> bool {
        Arc::ptr_eq(&self.connection, connection)
    }

    pub(crate) fn last_error(&self) -> Error {
        self.connection.last_error().into()
    }

    /// Reset the statement and clear its bindings.
    ///
    /// Both steps always run, so the statement ends up `Prepared` even when
    /// the reset reports the failure of a previous step.
    pub(crate) fn clear(&mut self) -> Result<()> {
        let reset_error = (self.raw.reset() != SQLITE_OK).then(|| self.last_error());
        let clear_rc = self.raw.clear_bindings();
        self.state = StatementState::Prepared;

        match reset_error {
            Some(e) => Err(e),
            None if clear_rc != SQLITE_OK => Err(self.last_error()),
            None => Ok(()),
        }
    }

    /// [`clear`](Self::clear) during cleanup of an earlier failure.
    pub(crate) fn clear_quietly(&mut self) {
        if let Err(e) = self.clear() {
            tracing::warn!("Ignoring secondary error while clearing statement: {}", e);
        }
    }
}

impl PreparedStatement for Statement {
    fn text(&self) -> String {
        Statement::text(self)
    }

    fn close(self) -> Result<()> {
        Statement::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sqlite::Connection;
    use crate::traits::OpenTarget;

    fn memory_connection() -> Connection {
        Connection::open(&OpenTarget::in_memory()).unwrap()
    }

    #[test]
    fn test_text_reads_back_source() {
        let conn = memory_connection();
        let statement = conn.prepare("SELECT 1, ?").unwrap();

        assert_eq!(statement.text(), "SELECT 1, ?");
        assert_eq!(statement.parameter_count(), 1);
        assert_eq!(statement.column_count(), 2);
        assert_eq!(statement.state(), StatementState::Prepared);
        statement.close().unwrap();
    }

    #[test]
    fn test_clear_returns_statement_to_prepared() {
        let conn = memory_connection();
        let mut statement = conn.prepare("SELECT ? UNION ALL SELECT 2").unwrap();

        let cursor = conn.execute(&mut statement, &["1"]).unwrap();
        assert!(cursor.is_some());
        drop(cursor);
        assert_eq!(statement.state(), StatementState::Active);
        assert!(!statement.state().is_ready());

        statement.clear().unwrap();
        assert_eq!(statement.state(), StatementState::Prepared);
    }

    #[test]
    fn test_statement_keeps_connection_alive() {
        let conn = memory_connection();
        let statement = conn.prepare("SELECT 1").unwrap();

        let err = conn.close().unwrap_err();
        assert!(err.is_driver());

        // The native connection is released with the last statement.
        assert_eq!(statement.text(), "SELECT 1");
        statement.close().unwrap();
    }
}
