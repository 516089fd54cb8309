//! Driver abstraction traits and types.
//!
//! This module provides the driver-agnostic surface of the crate:
//!
//! - **Types** (`types`): Open target and open-mode flags
//! - **Row** (`row`): Text-only result rows
//! - **Connection** (`connection`): Connection, statement and cursor traits,
//!   plus the direct-execute helper
//!
//! # Example
//!
//! ```ignore
//! use sqlite3_driver::traits::{OpenFlags, OpenTarget};
//!
//! let target: OpenTarget = "sqlite3://app.db?flags=6".parse()?;
//! assert!(target.flags.contains(OpenFlags::CREATE));
//! ```

pub mod connection;
pub mod row;
pub mod types;

pub use connection::{execute_directly, DatabaseConnection, PreparedStatement, ResultCursor};

pub use row::Row;

pub use types::{OpenFlags, OpenTarget};
