//! Driver error types.
//!
//! Every fallible operation returns [`Error`], which separates the three
//! kinds of failure a caller can see:
//!
//! - `Config` - a malformed open target, reported before any native call
//! - `Driver` - caller misuse (wrong statement, parameter count, no rows)
//! - `Engine` - a status code reported by SQLite itself

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The open target could not be understood.
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller used the driver incorrectly. Never retried.
    #[error("driver error: {0}")]
    Driver(String),

    /// The engine returned a status other than ok, row or done.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn driver(message: impl Into<String>) -> Self {
        Self::Driver(message.into())
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is a driver/usage error
    pub fn is_driver(&self) -> bool {
        matches!(self, Self::Driver(_))
    }

    /// Check if this error came from the engine
    pub fn is_engine(&self) -> bool {
        matches!(self, Self::Engine(_))
    }

    /// The engine error, if this is one.
    pub fn as_engine(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(e) => Some(e),
            _ => None,
        }
    }
}

/// An error reported by SQLite.
///
/// Connections are opened with extended result codes enabled, so the code
/// read back from the engine is the extended one; the basic code is its
/// low byte.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sqlite3 error {extended} (basic {basic}): {message}")]
pub struct EngineError {
    basic: i32,
    extended: i32,
    message: String,
}

impl EngineError {
    /// Build an engine error from an extended code and message.
    pub fn new(extended: i32, message: impl Into<String>) -> Self {
        Self {
            basic: extended & 0xff,
            extended,
            message: message.into(),
        }
    }

    /// The basic result code (for example 14 for `SQLITE_CANTOPEN`)
    pub fn basic(&self) -> i32 {
        self.basic
    }

    /// The extended result code
    pub fn extended(&self) -> i32 {
        self.extended
    }

    /// The engine's message text
    pub fn message(&self) -> &str {
        &self.message
    }
}
