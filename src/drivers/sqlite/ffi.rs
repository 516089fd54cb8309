//! Owned wrappers around native SQLite handles.
//!
//! This is the only module containing `unsafe` code. Each wrapper owns one
//! native resource, exposes exactly the primitive calls the driver needs,
//! returns raw status codes, and releases the resource on drop if it was
//! not released explicitly.

use std::ffi::{c_char, c_int, CStr, CString};
use std::ptr;

use rusqlite::ffi;

use crate::error::{EngineError, Error, Result};

pub(crate) const SQLITE_OK: c_int = ffi::SQLITE_OK;
pub(crate) const SQLITE_ROW: c_int = ffi::SQLITE_ROW;
pub(crate) const SQLITE_DONE: c_int = ffi::SQLITE_DONE;
pub(crate) const SQLITE_MISUSE: c_int = ffi::SQLITE_MISUSE;

/// Convert to a C string. `error` builds the failure for an interior NUL:
/// a configuration error for open targets, a driver error for queries.
fn to_cstring(value: &str, what: &str, error: fn(String) -> Error) -> Result<CString> {
    CString::new(value).map_err(|_| error(format!("{} contains an interior NUL byte", what)))
}

/// Copy a NUL-terminated C string, treating NULL as empty.
///
/// # Safety
///
/// `ptr` must be NULL or point to a valid NUL-terminated string.
unsafe fn copy_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Force the library into serialized threading mode.
///
/// Only succeeds before the library has been initialized.
pub(crate) fn config_serialized() -> c_int {
    unsafe { ffi::sqlite3_config(ffi::SQLITE_CONFIG_SERIALIZED) }
}

/// Whether the library was compiled with mutexes at all.
pub(crate) fn threadsafe() -> bool {
    unsafe { ffi::sqlite3_threadsafe() != 0 }
}

pub(crate) fn libversion() -> String {
    unsafe { copy_str(ffi::sqlite3_libversion()) }
}

pub(crate) fn libversion_number() -> i32 {
    unsafe { ffi::sqlite3_libversion_number() }
}

pub(crate) fn sourceid() -> String {
    unsafe { copy_str(ffi::sqlite3_sourceid()) }
}

/// Engine error for a status code with no connection to ask.
pub(crate) fn code_error(rc: c_int) -> EngineError {
    EngineError::new(rc, unsafe { copy_str(ffi::sqlite3_errstr(rc)) })
}

/// Owned `sqlite3*` connection handle.
pub(crate) struct RawConnection {
    db: *mut ffi::sqlite3,
}

// Connections are always opened with SQLITE_OPEN_FULLMUTEX, so the engine
// serializes every call made through this handle.
unsafe impl Send for RawConnection {}
unsafe impl Sync for RawConnection {}

impl RawConnection {
    /// Open a database.
    ///
    /// SQLite may hand back a handle even when opening fails; it is
    /// returned alongside the status so the caller can read the error
    /// message from it before it is closed.
    pub(crate) fn open(
        name: &str,
        flags: i32,
        vfs: Option<&str>,
    ) -> Result<(Option<Self>, c_int)> {
        let name = to_cstring(name, "database name", Error::Config)?;
        let vfs = vfs.map(|v| to_cstring(v, "vfs name", Error::Config)).transpose()?;

        let mut db = ptr::null_mut();
        let rc = unsafe {
            ffi::sqlite3_open_v2(
                name.as_ptr(),
                &mut db,
                flags,
                vfs.as_ref().map_or(ptr::null(), |v| v.as_ptr()),
            )
        };

        let handle = (!db.is_null()).then_some(Self { db });
        Ok((handle, rc))
    }

    pub(crate) fn busy_timeout(&self, milliseconds: i32) -> c_int {
        unsafe { ffi::sqlite3_busy_timeout(self.db, milliseconds) }
    }

    pub(crate) fn extended_result_codes(&self, on: bool) -> c_int {
        unsafe { ffi::sqlite3_extended_result_codes(self.db, c_int::from(on)) }
    }

    /// Build an error from the handle's current error state.
    pub(crate) fn last_error(&self) -> EngineError {
        let code = unsafe { ffi::sqlite3_extended_errcode(self.db) };
        let message = unsafe { copy_str(ffi::sqlite3_errmsg(self.db)) };
        EngineError::new(code, message)
    }

    pub(crate) fn changes(&self) -> i32 {
        unsafe { ffi::sqlite3_changes(self.db) }
    }

    pub(crate) fn last_insert_rowid(&self) -> i64 {
        unsafe { ffi::sqlite3_last_insert_rowid(self.db) }
    }

    /// Compile a statement.
    ///
    /// The engine is not supposed to produce a handle on failure, but if it
    /// does the handle is returned so the caller can finalize it.
    pub(crate) fn prepare(&self, query: &str) -> Result<(Option<RawStatement>, c_int)> {
        let query = to_cstring(query, "Prepare: query", Error::Driver)?;

        let mut stmt = ptr::null_mut();
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(self.db, query.as_ptr(), -1, &mut stmt, ptr::null_mut())
        };

        let handle = (!stmt.is_null()).then_some(RawStatement { stmt });
        Ok((handle, rc))
    }

    /// Close the handle.
    ///
    /// On success the handle is nulled out so drop does nothing. On failure
    /// the error is read from the still-open handle and drop falls back to
    /// a deferred close.
    pub(crate) fn close(mut self) -> Result<(), EngineError> {
        let rc = unsafe { ffi::sqlite3_close(self.db) };
        if rc == SQLITE_OK {
            self.db = ptr::null_mut();
            Ok(())
        } else {
            Err(self.last_error())
        }
    }
}

impl Drop for RawConnection {
    fn drop(&mut self) {
        if !self.db.is_null() {
            unsafe { ffi::sqlite3_close_v2(self.db) };
            self.db = ptr::null_mut();
        }
    }
}

/// Owned `sqlite3_stmt*` prepared statement handle.
pub(crate) struct RawStatement {
    stmt: *mut ffi::sqlite3_stmt,
}

// A statement is only ever driven by one owner at a time, and its
// connection runs in serialized mode.
unsafe impl Send for RawStatement {}

impl RawStatement {
    pub(crate) fn sql(&self) -> String {
        unsafe { copy_str(ffi::sqlite3_sql(self.stmt)) }
    }

    pub(crate) fn bind_parameter_count(&self) -> usize {
        let count = unsafe { ffi::sqlite3_bind_parameter_count(self.stmt) };
        usize::try_from(count).unwrap_or(0)
    }

    /// Bind text to the 1-based parameter slot `index`.
    ///
    /// The engine makes its own copy of the text.
    pub(crate) fn bind_text(&mut self, index: usize, text: &str) -> c_int {
        let (Ok(index), Ok(len)) = (c_int::try_from(index), c_int::try_from(text.len())) else {
            return ffi::SQLITE_TOOBIG;
        };
        unsafe {
            ffi::sqlite3_bind_text(
                self.stmt,
                index,
                text.as_ptr().cast::<c_char>(),
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        }
    }

    pub(crate) fn step(&mut self) -> c_int {
        unsafe { ffi::sqlite3_step(self.stmt) }
    }

    pub(crate) fn column_count(&self) -> usize {
        let count = unsafe { ffi::sqlite3_column_count(self.stmt) };
        usize::try_from(count).unwrap_or(0)
    }

    pub(crate) fn column_name(&self, index: usize) -> String {
        let Ok(index) = c_int::try_from(index) else {
            return String::new();
        };
        unsafe { copy_str(ffi::sqlite3_column_name(self.stmt, index)) }
    }

    /// Copy column `index` of the current row out as text.
    ///
    /// The engine's buffer is only valid until the next step, so the text
    /// is always copied. NULL reads as an empty string.
    pub(crate) fn column_text(&self, index: usize) -> String {
        let Ok(index) = c_int::try_from(index) else {
            return String::new();
        };
        unsafe {
            let text = ffi::sqlite3_column_text(self.stmt, index);
            if text.is_null() {
                return String::new();
            }
            let len = usize::try_from(ffi::sqlite3_column_bytes(self.stmt, index)).unwrap_or(0);
            let bytes = std::slice::from_raw_parts(text, len);
            String::from_utf8_lossy(bytes).into_owned()
        }
    }

    pub(crate) fn reset(&mut self) -> c_int {
        unsafe { ffi::sqlite3_reset(self.stmt) }
    }

    pub(crate) fn clear_bindings(&mut self) -> c_int {
        unsafe { ffi::sqlite3_clear_bindings(self.stmt) }
    }

    /// Finalize the handle. It is nulled out whatever the outcome.
    pub(crate) fn finalize(mut self) -> c_int {
        let rc = unsafe { ffi::sqlite3_finalize(self.stmt) };
        self.stmt = ptr::null_mut();
        rc
    }
}

impl Drop for RawStatement {
    fn drop(&mut self) {
        if !self.stmt.is_null() {
            unsafe { ffi::sqlite3_finalize(self.stmt) };
            self.stmt = ptr::null_mut();
        }
    }
}
