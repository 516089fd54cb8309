//! SQLite database driver implementation.
//!
//! This module provides a SQLite driver that implements the
//! `DatabaseConnection` trait directly on the engine's C interface (linked
//! through `rusqlite::ffi`, with SQLite bundled).
//!
//! Every value crosses the boundary as text: parameters are bound as text
//! and columns are read back as text, with NULL reading as an empty string.
//!
//! # Example
//!
//! ```ignore
//! use sqlite3_driver::drivers::sqlite::Connection;
//! use sqlite3_driver::traits::{OpenFlags, OpenTarget, ResultCursor};
//!
//! let target = OpenTarget::new("app.db").with_flags(OpenFlags::READ_WRITE | OpenFlags::CREATE);
//! let conn = Connection::open(&target)?;
//!
//! let mut statement = conn.prepare("SELECT name FROM users WHERE id = ?")?;
//! if let Some(mut cursor) = conn.execute(&mut statement, &["42"])? {
//!     for row in cursor.fetch_all()? {
//!         println!("{}", row.values().join(", "));
//!     }
//! }
//! statement.close()?;
//! conn.close()?;
//! ```

mod connection;
mod cursor;
mod ffi;
mod statement;

use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::error::{Error, Result};

pub use connection::Connection;
pub use cursor::Cursor;
pub use statement::{Statement, StatementState};

/// Busy timeout set on every new connection, in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: i32 = 16_000;

/// First library version that reports a source id.
const SOURCE_ID_MIN_VERSION: i32 = 3_006_018;

static INITIALIZED: OnceLock<Result<()>> = OnceLock::new();

/// Put the library in serialized threading mode.
///
/// Runs once per process; later calls return the first outcome. Called by
/// [`Connection::open`], so calling it directly is only needed to surface
/// a failure early.
///
/// If the library was already initialized by someone else the mode can no
/// longer be changed. That is accepted as long as the library has mutexes,
/// since every connection is opened with the full mutex anyway.
///
/// # Errors
///
/// - A driver error when the library was built without thread safety
/// - An engine error when configuration fails for any other reason
pub fn initialize() -> Result<()> {
    INITIALIZED
        .get_or_init(|| {
            if !ffi::threadsafe() {
                return Err(Error::driver(
                    "sqlite3 library was built without thread safety",
                ));
            }

            match ffi::config_serialized() {
                ffi::SQLITE_OK => {
                    tracing::debug!("sqlite3 configured for serialized threading");
                    Ok(())
                }
                ffi::SQLITE_MISUSE => {
                    tracing::debug!(
                        "sqlite3 already initialized; relying on per-connection full mutex"
                    );
                    Ok(())
                }
                rc => Err(ffi::code_error(rc).into()),
            }
        })
        .clone()
}

/// Library version information.
///
/// Always has `version` and `version-number`; `source-id` is added when the
/// library is new enough to report one.
pub fn version() -> BTreeMap<String, String> {
    let number = ffi::libversion_number();

    let mut info = BTreeMap::new();
    info.insert("version".to_string(), ffi::libversion());
    info.insert("version-number".to_string(), number.to_string());
    if number >= SOURCE_ID_MIN_VERSION {
        info.insert("source-id".to_string(), ffi::sourceid());
    }
    info
}
