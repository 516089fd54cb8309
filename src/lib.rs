//! SQLite driver with prepared statements, pull cursors and streaming
//! result sets.
//!
//! - [`traits`]: driver-agnostic open targets, rows and the connection,
//!   statement and cursor traits
//! - [`drivers::sqlite`]: the SQLite implementation
//! - [`drivers::stream`]: background producer turning a cursor into a
//!   demand-driven row stream
//! - [`error`]: the crate's error type
//!
//! # Example
//!
//! ```ignore
//! use sqlite3_driver::{execute_directly, Connection};
//!
//! let conn = Connection::open_url("sqlite3://app.db?flags=6")?;
//! execute_directly(&conn, "CREATE TABLE IF NOT EXISTS users(name TEXT)", &[])?;
//! execute_directly(&conn, "INSERT INTO users(name) VALUES (?)", &["alice"])?;
//!
//! let statement = conn.prepare("SELECT name FROM users")?;
//! if let Some(rows) = conn.stream(statement, &[])? {
//!     for row in rows {
//!         println!("{:?}", row.values());
//!     }
//! }
//! ```

pub mod drivers;
pub mod error;
pub mod traits;

pub use drivers::sqlite::{Connection, Cursor, Statement, StatementState};
pub use drivers::{ResultSet, StreamState};
pub use error::{EngineError, Error, Result};
pub use traits::{
    execute_directly, DatabaseConnection, OpenFlags, OpenTarget, PreparedStatement, ResultCursor,
    Row,
};
