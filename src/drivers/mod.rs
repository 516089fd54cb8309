//! Database driver implementations.
//!
//! - **SQLite** (`sqlite`): Connection, statement and cursor over the
//!   native library
//! - **Stream** (`stream`): Background producer that turns any cursor into
//!   a demand-driven row stream

pub mod sqlite;
pub mod stream;

pub use stream::{ResultSet, StreamState};
