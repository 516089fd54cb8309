//! SQLite connection implementation.
//!
//! This module implements the `DatabaseConnection` trait on top of a native
//! SQLite handle opened in serialized threading mode.

use std::borrow::BorrowMut;
use std::fmt;
use std::sync::Arc;

use super::cursor::Cursor;
use super::ffi::{self, RawConnection, SQLITE_DONE, SQLITE_OK, SQLITE_ROW};
use super::statement::{Statement, StatementState};
use super::DEFAULT_BUSY_TIMEOUT_MS;
use crate::drivers::stream::ResultSet;
use crate::error::{Error, Result};
use crate::traits::{DatabaseConnection, OpenTarget};

/// An open SQLite database.
///
/// Safe to share between threads: the engine serializes every call on the
/// handle. Statements keep the native handle alive, so dropping the
/// connection while statements are still open defers the native close
/// until the last of them is released.
pub struct Connection {
    raw: Arc<RawConnection>,
    name: String,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("handle", &"<sqlite3>")
            .finish()
    }
}

impl Connection {
    /// Open a database.
    ///
    /// Whatever flags the target asks for, the connection is opened with
    /// the full mutex and never the no-mutex mode, and read-write access is
    /// implied when neither access mode was requested. The busy timeout is
    /// set to [`DEFAULT_BUSY_TIMEOUT_MS`] and extended result codes are
    /// enabled.
    ///
    /// # Errors
    ///
    /// - A configuration error when the name or vfs contains a NUL byte
    /// - An engine error when SQLite refuses to open or configure the
    ///   database
    pub fn open(target: &OpenTarget) -> Result<Self> {
        super::initialize()?;

        let flags = target.flags.serialized();
        let (raw, rc) = RawConnection::open(&target.name, flags.bits(), target.vfs.as_deref())?;
        let raw = match raw {
            Some(raw) if rc == SQLITE_OK => raw,
            Some(raw) => return Err(abandon(raw)),
            None => return Err(ffi::code_error(rc).into()),
        };

        if raw.busy_timeout(DEFAULT_BUSY_TIMEOUT_MS) != SQLITE_OK {
            return Err(abandon(raw));
        }
        if raw.extended_result_codes(true) != SQLITE_OK {
            return Err(abandon(raw));
        }

        tracing::debug!(
            "Opened sqlite3 database {} with flags {:#x}",
            target.name,
            flags.bits()
        );

        Ok(Self {
            raw: Arc::new(raw),
            name: target.name.clone(),
        })
    }

    /// Parse a `sqlite3://name?flags=N&vfs=V` target (or a bare path) and
    /// open it.
    pub fn open_url(url: &str) -> Result<Self> {
        let target: OpenTarget = url.parse()?;
        Self::open(&target)
    }

    /// The database name this connection was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compile one SQL statement.
    ///
    /// # Errors
    ///
    /// - An engine error for invalid SQL
    /// - A driver error when the text contains no statement at all, or
    ///   contains a NUL byte
    pub fn prepare(&self, query: &str) -> Result<Statement> {
        let (raw, rc) = self.raw.prepare(query)?;

        if rc != SQLITE_OK {
            let err = self.last_error();
            if let Some(raw) = raw {
                if raw.finalize() != SQLITE_OK {
                    tracing::warn!("Ignoring secondary error while finalizing failed statement");
                }
            }
            tracing::debug!("Prepare failed for {:?}: {}", query, err);
            return Err(err);
        }

        match raw {
            Some(raw) => Ok(Statement::new(raw, Arc::clone(&self.raw))),
            None => Err(Error::driver("Prepare: query contains no SQL statement")),
        }
    }

    /// Bind `params` to the statement's `?` slots in order and step once.
    ///
    /// Returns a cursor when a row is available and `None` when the
    /// statement ran to completion. The statement can be borrowed
    /// (`&mut Statement`) or handed over by value; an owned statement that
    /// completes without rows is finalized when it is dropped here.
    ///
    /// A statement still in the middle of an earlier result is cleared
    /// before it is bound again. After a `None` result or any error the
    /// statement is left ready for another execution.
    ///
    /// # Errors
    ///
    /// - A driver error when the statement belongs to another connection
    /// - A driver error when the parameter count doesn't match
    /// - An engine error when binding or stepping fails
    pub fn execute<S: BorrowMut<Statement>>(
        &self,
        mut statement: S,
        params: &[&str],
    ) -> Result<Option<Cursor<S>>> {
        let stmt = statement.borrow_mut();

        if !stmt.belongs_to(&self.raw) {
            return Err(Error::driver(
                "Execute: statement was prepared on a different connection",
            ));
        }

        if stmt.state() == StatementState::Active {
            tracing::debug!("Execute: clearing statement left in the middle of a result");
            stmt.clear_quietly();
        }

        let expected = stmt.parameter_count();
        if params.len() != expected {
            return Err(Error::driver(format!(
                "Execute: expected {} parameters, got {}",
                expected,
                params.len()
            )));
        }

        for (index, param) in params.iter().enumerate() {
            if stmt.raw.bind_text(index + 1, param) != SQLITE_OK {
                let err = self.last_error();
                stmt.clear_quietly();
                return Err(err);
            }
        }

        match stmt.raw.step() {
            SQLITE_ROW => {
                stmt.state = StatementState::Active;
                Ok(Some(Cursor::new(statement)))
            }
            SQLITE_DONE => {
                stmt.clear()?;
                Ok(None)
            }
            _ => {
                let err = self.last_error();
                stmt.clear_quietly();
                Err(err)
            }
        }
    }

    /// Execute a statement and hand its rows to a background producer.
    ///
    /// The statement is moved into the returned [`ResultSet`]; get it back
    /// with [`ResultSet::close`] followed by [`Cursor::into_statement`].
    /// Returns `None`, and finalizes the statement, when it produced no
    /// rows.
    pub fn stream(
        &self,
        statement: Statement,
        params: &[&str],
    ) -> Result<Option<ResultSet<Cursor<Statement>>>> {
        Ok(self.execute(statement, params)?.map(ResultSet::new))
    }

    /// The engine's most recent error on this connection.
    pub fn last_error(&self) -> Error {
        self.raw.last_error().into()
    }

    /// Rows modified by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> i32 {
        self.raw.changes()
    }

    /// Rowid of the most recent successful INSERT.
    pub fn last_insert_rowid(&self) -> i64 {
        self.raw.last_insert_rowid()
    }

    /// Close the database.
    ///
    /// Fails with a driver error while statements prepared on this
    /// connection are still open; the native handle is then closed when
    /// the last of them is released.
    pub fn close(self) -> Result<()> {
        let Self { raw, name } = self;

        match Arc::try_unwrap(raw) {
            Ok(raw) => {
                raw.close()?;
                tracing::debug!("Closed sqlite3 database {}", name);
                Ok(())
            }
            Err(_) => Err(Error::driver(
                "Close: statements prepared on this connection are still open",
            )),
        }
    }
}

/// Take the error from a handle that failed to open, then close it.
fn abandon(raw: RawConnection) -> Error {
    let err = raw.last_error();
    if let Err(secondary) = raw.close() {
        tracing::warn!("Ignoring secondary error while closing failed connection: {}", secondary);
    }
    err.into()
}

impl DatabaseConnection for Connection {
    type Statement = Statement;
    type Cursor<'s> = Cursor<&'s mut Statement>;

    fn prepare(&self, query: &str) -> Result<Statement> {
        Connection::prepare(self, query)
    }

    fn execute<'s>(
        &'s self,
        statement: &'s mut Statement,
        params: &[&str],
    ) -> Result<Option<Cursor<&'s mut Statement>>> {
        Connection::execute(self, statement, params)
    }

    fn last_error(&self) -> Error {
        Connection::last_error(self)
    }

    fn close(self) -> Result<()> {
        Connection::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{execute_directly, OpenFlags, ResultCursor};

    fn create_file_target(dir: &tempfile::TempDir, flags: OpenFlags) -> OpenTarget {
        let path = dir.path().join("test.db");
        OpenTarget::new(path.to_string_lossy()).with_flags(flags)
    }

    fn memory_connection() -> Connection {
        Connection::open(&OpenTarget::in_memory()).unwrap()
    }

    fn values(rows: &[crate::traits::Row]) -> Vec<Vec<String>> {
        rows.iter().map(|row| row.values().to_vec()).collect()
    }

    #[test]
    fn test_open_missing_file_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = create_file_target(&dir, OpenFlags::READ_WRITE);

        let err = Connection::open(&target).unwrap_err();
        let engine = err.as_engine().expect("engine error");
        assert_eq!(engine.basic(), rusqlite::ffi::SQLITE_CANTOPEN);
    }

    #[test]
    fn test_open_with_create_makes_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = create_file_target(&dir, OpenFlags::READ_WRITE | OpenFlags::CREATE);

        let conn = Connection::open(&target).unwrap();
        assert!(dir.path().join("test.db").exists());
        conn.close().unwrap();
    }

    #[test]
    fn test_open_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("url.db");
        let url = format!("sqlite3://{}?flags=6", path.display());

        let conn = Connection::open_url(&url).unwrap();
        assert_eq!(conn.name(), path.to_string_lossy());
        conn.close().unwrap();

        let err = Connection::open_url("postgres://localhost/db").unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let writer = Connection::open(&create_file_target(
            &dir,
            OpenFlags::READ_WRITE | OpenFlags::CREATE,
        ))
        .unwrap();
        execute_directly(&writer, "CREATE TABLE t(a)", &[]).unwrap();
        writer.close().unwrap();

        let reader = Connection::open(&create_file_target(&dir, OpenFlags::READ_ONLY)).unwrap();
        let err = execute_directly(&reader, "INSERT INTO t VALUES ('x')", &[]).unwrap_err();
        assert_eq!(
            err.as_engine().map(|e| e.basic()),
            Some(rusqlite::ffi::SQLITE_READONLY)
        );
    }

    #[test]
    fn test_prepare_invalid_sql_is_engine_error() {
        let conn = memory_connection();
        let err = conn.prepare("SELEC * FORM t").unwrap_err();
        assert!(err.is_engine());
        assert_eq!(err, conn.last_error());
    }

    #[test]
    fn test_prepare_empty_query() {
        let conn = memory_connection();
        let err = conn.prepare("  -- nothing here").unwrap_err();
        assert!(err.is_driver());
    }

    #[test]
    fn test_insert_then_select_round_trip() {
        let conn = memory_connection();
        execute_directly(&conn, "CREATE TABLE t(a TEXT)", &[]).unwrap();

        let mut insert = conn.prepare("INSERT INTO t(a) VALUES (?)").unwrap();
        for value in ["x", "y", "z"] {
            assert!(conn.execute(&mut insert, &[value]).unwrap().is_none());
            assert_eq!(insert.state(), StatementState::Prepared);
        }
        insert.close().unwrap();

        let rows = execute_directly(&conn, "SELECT a FROM t ORDER BY rowid", &[]).unwrap();
        assert_eq!(values(&rows), vec![vec!["x"], vec!["y"], vec!["z"]]);
    }

    #[test]
    fn test_parameter_mismatch_leaves_statement_usable() {
        let conn = memory_connection();
        let mut statement = conn.prepare("SELECT ? || ?").unwrap();

        let err = conn.execute(&mut statement, &["only one"]).unwrap_err();
        assert_eq!(err, Error::driver("Execute: expected 2 parameters, got 1"));
        assert_eq!(statement.state(), StatementState::Prepared);

        let mut cursor = conn.execute(&mut statement, &["a", "b"]).unwrap().unwrap();
        assert_eq!(cursor.fetch_one().unwrap().values(), ["ab"]);
    }

    #[test]
    fn test_reexecute_clears_unfinished_result() {
        let conn = memory_connection();
        let mut statement = conn
            .prepare("SELECT ? UNION ALL SELECT 'tail'")
            .unwrap();

        let mut cursor = conn.execute(&mut statement, &["first"]).unwrap().unwrap();
        assert_eq!(cursor.fetch_one().unwrap().values(), ["first"]);
        drop(cursor);

        let mut cursor = conn.execute(&mut statement, &["second"]).unwrap().unwrap();
        let rows = cursor.fetch_all().unwrap();
        assert_eq!(values(&rows), vec![vec!["second"], vec!["tail"]]);
    }

    #[test]
    fn test_statement_from_other_connection_rejected() {
        let first = memory_connection();
        let second = memory_connection();
        let mut statement = first.prepare("SELECT 1").unwrap();

        let err = second.execute(&mut statement, &[]).unwrap_err();
        assert!(err.is_driver());
        assert_eq!(statement.state(), StatementState::Prepared);
    }

    #[test]
    fn test_step_failure_is_engine_error() {
        let conn = memory_connection();
        execute_directly(&conn, "CREATE TABLE t(a UNIQUE)", &[]).unwrap();
        execute_directly(&conn, "INSERT INTO t VALUES (?)", &["x"]).unwrap();

        let mut insert = conn.prepare("INSERT INTO t VALUES (?)").unwrap();
        let err = conn.execute(&mut insert, &["x"]).unwrap_err();
        let engine = err.as_engine().expect("engine error");
        assert_eq!(engine.basic(), rusqlite::ffi::SQLITE_CONSTRAINT);
        assert_eq!(engine.extended(), rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE);
        assert_eq!(insert.state(), StatementState::Prepared);

        assert!(conn.execute(&mut insert, &["y"]).unwrap().is_none());
    }

    #[test]
    fn test_changes_and_last_insert_rowid() {
        let conn = memory_connection();
        execute_directly(&conn, "CREATE TABLE t(a)", &[]).unwrap();
        execute_directly(&conn, "INSERT INTO t VALUES ('x'), ('y')", &[]).unwrap();
        assert_eq!(conn.changes(), 2);
        assert_eq!(conn.last_insert_rowid(), 2);

        execute_directly(&conn, "UPDATE t SET a = 'z'", &[]).unwrap();
        assert_eq!(conn.changes(), 2);
    }

    #[test]
    fn test_execute_directly_reports_failure_after_first_row() {
        let conn = memory_connection();
        let err = execute_directly(
            &conn,
            "SELECT v FROM (SELECT 1 AS v UNION ALL SELECT 2) \
             UNION ALL SELECT sum(x) FROM (SELECT 9223372036854775807 AS x UNION ALL SELECT 1)",
            &[],
        )
        .unwrap_err();

        assert!(err.is_engine());
        assert!(err.to_string().contains("integer overflow"));
    }

    #[test]
    fn test_select_without_order_by_via_cursor_and_stream() {
        let conn = memory_connection();
        execute_directly(&conn, "CREATE TABLE t(a)", &[]).unwrap();
        let mut insert = conn.prepare("INSERT INTO t(a) VALUES (?)").unwrap();
        for value in ["x", "y", "z"] {
            assert!(conn.execute(&mut insert, &[value]).unwrap().is_none());
        }
        insert.close().unwrap();

        let mut select = conn.prepare("SELECT a FROM t").unwrap();
        let mut cursor = conn.execute(&mut select, &[]).unwrap().unwrap();
        let rows = cursor.fetch_all().unwrap();
        assert_eq!(values(&rows), vec![vec!["x"], vec!["y"], vec!["z"]]);
        assert!(!cursor.has_more());
        drop(cursor);

        let mut streamed = conn.stream(select, &[]).unwrap().unwrap();
        let rows: Vec<_> = streamed.by_ref().collect();
        assert_eq!(values(&rows), vec![vec!["x"], vec!["y"], vec!["z"]]);
        assert!(streamed.next().is_none());
        streamed.close().unwrap().into_statement().close().unwrap();
        conn.close().unwrap();
    }

    #[test]
    fn test_no_mutex_request_still_opens_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let target = create_file_target(
            &dir,
            OpenFlags::READ_WRITE | OpenFlags::CREATE | OpenFlags::NO_MUTEX,
        );

        let conn = Arc::new(Connection::open(&target).unwrap());
        execute_directly(conn.as_ref(), "CREATE TABLE t(a)", &[]).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let conn = Arc::clone(&conn);
                std::thread::spawn(move || {
                    let value = i.to_string();
                    execute_directly(conn.as_ref(), "INSERT INTO t VALUES (?)", &[value.as_str()])
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let rows = execute_directly(conn.as_ref(), "SELECT count(*) FROM t", &[]).unwrap();
        assert_eq!(values(&rows), vec![vec!["4"]]);
    }

    #[test]
    fn test_query_with_nul_byte_is_driver_error() {
        let conn = memory_connection();
        let err = conn.prepare("SELECT 1\0").unwrap_err();
        assert!(err.is_driver());

        let err = Connection::open(&OpenTarget::new("bad\0.db")).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_execute_directly_without_rows() {
        let conn = memory_connection();
        let rows = execute_directly(&conn, "CREATE TABLE t(a)", &[]).unwrap();
        assert!(rows.is_empty());

        let rows = execute_directly(&conn, "SELECT a FROM t", &[]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_owned_statement_cursor() {
        let conn = memory_connection();
        let statement = conn.prepare("SELECT 1").unwrap();

        let mut cursor = conn.execute(statement, &[]).unwrap().unwrap();
        assert_eq!(cursor.fetch_one().unwrap().values(), ["1"]);

        let statement = cursor.into_statement();
        assert_eq!(statement.state(), StatementState::Exhausted);
        statement.close().unwrap();
        conn.close().unwrap();
    }

    #[test]
    fn test_connection_is_shareable_across_threads() {
        let conn = Arc::new(memory_connection());
        execute_directly(conn.as_ref(), "CREATE TABLE t(a)", &[]).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let conn = Arc::clone(&conn);
                std::thread::spawn(move || {
                    let value = i.to_string();
                    execute_directly(conn.as_ref(), "INSERT INTO t VALUES (?)", &[value.as_str()])
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let rows = execute_directly(conn.as_ref(), "SELECT count(*) FROM t", &[]).unwrap();
        assert_eq!(values(&rows), vec![vec!["4"]]);
    }
}
