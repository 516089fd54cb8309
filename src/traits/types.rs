//! Open target and open-mode flag definitions.
//!
//! This module contains:
//! - `OpenFlags` - Bitmask of SQLite open-mode flags
//! - `OpenTarget` - Where and how to open a database, parseable from
//!   `sqlite3://<name>?flags=<int>&vfs=<name>`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use crate::error::{Error, Result};

/// URL scheme accepted by [`OpenTarget::from_str`].
pub const SCHEME: &str = "sqlite3";

/// Open-mode flags passed through to `sqlite3_open_v2`.
///
/// Flags can be or'd together. Several only matter to custom VFS
/// implementations. [`OpenFlags::NO_MUTEX`] never reaches the engine:
/// every connection is forced into serialized (full mutex) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpenFlags(i32);

impl OpenFlags {
    pub const READ_ONLY: Self = Self(0x0000_0001);
    pub const READ_WRITE: Self = Self(0x0000_0002);
    pub const CREATE: Self = Self(0x0000_0004);
    /// VFS only
    pub const DELETE_ON_CLOSE: Self = Self(0x0000_0008);
    /// VFS only
    pub const EXCLUSIVE: Self = Self(0x0000_0010);
    pub const URI: Self = Self(0x0000_0040);
    pub const MEMORY: Self = Self(0x0000_0080);
    /// VFS only
    pub const MAIN_DB: Self = Self(0x0000_0100);
    /// VFS only
    pub const TEMP_DB: Self = Self(0x0000_0200);
    /// VFS only
    pub const TRANSIENT_DB: Self = Self(0x0000_0400);
    /// VFS only
    pub const MAIN_JOURNAL: Self = Self(0x0000_0800);
    /// VFS only
    pub const TEMP_JOURNAL: Self = Self(0x0000_1000);
    /// VFS only
    pub const SUB_JOURNAL: Self = Self(0x0000_2000);
    /// VFS only
    pub const MASTER_JOURNAL: Self = Self(0x0000_4000);
    pub const NO_MUTEX: Self = Self(0x0000_8000);
    pub const FULL_MUTEX: Self = Self(0x0001_0000);
    pub const SHARED_CACHE: Self = Self(0x0002_0000);
    pub const PRIVATE_CACHE: Self = Self(0x0004_0000);

    /// No flags set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build flags from a raw bitmask
    pub const fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    /// The raw bitmask
    pub const fn bits(self) -> i32 {
        self.0
    }

    /// Check whether every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Flags as actually handed to the engine.
    ///
    /// Clears `NO_MUTEX`, sets `FULL_MUTEX`, and implies `READ_WRITE` when
    /// no access mode was requested.
    pub const fn serialized(self) -> Self {
        let mut bits = (self.0 & !Self::NO_MUTEX.0) | Self::FULL_MUTEX.0;
        if bits & (Self::READ_ONLY.0 | Self::READ_WRITE.0) == 0 {
            bits |= Self::READ_WRITE.0;
        }
        Self(bits)
    }

    /// Render as the `flags=<int>` query fragment used by open targets.
    pub fn to_query(self) -> String {
        format!("flags={}", self.0)
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Everything needed to open a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenTarget {
    /// Database file name, `:memory:`, or a `file:` URI
    pub name: String,
    /// Requested open-mode flags
    #[serde(default)]
    pub flags: OpenFlags,
    /// Name of the VFS module to use, if not the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vfs: Option<String>,
}

impl OpenTarget {
    /// Create a target for the given database name with no flags
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: OpenFlags::empty(),
            vfs: None,
        }
    }

    /// Create a target for a private in-memory database
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    /// Replace the requested flags
    pub fn with_flags(mut self, flags: OpenFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Use a named VFS
    pub fn with_vfs(mut self, vfs: impl Into<String>) -> Self {
        self.vfs = Some(vfs.into());
        self
    }

    fn parse_query(&mut self, query: &str) -> Result<()> {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "flags" => {
                    let bits = value.parse::<i32>().map_err(|e| {
                        Error::config(format!("Open: malformed flags {:?}: {}", value, e))
                    })?;
                    self.flags = OpenFlags::from_bits(bits);
                }
                "vfs" => self.vfs = Some(value.into_owned()),
                other => tracing::debug!("Open: ignoring unknown option {}", other),
            }
        }
        Ok(())
    }
}

impl FromStr for OpenTarget {
    type Err = Error;

    /// Parse `sqlite3://<name>?flags=<int>&vfs=<name>`.
    ///
    /// The scheme is optional; without one the whole string is the name
    /// plus an optional query. The name is percent-decoded, so a literal
    /// `?` in a name is written `%3F`.
    fn from_str(s: &str) -> Result<Self> {
        let rest = match s.split_once("://") {
            Some((scheme, rest)) if scheme == SCHEME => rest,
            Some((scheme, _)) => {
                return Err(Error::config(format!(
                    "Open: unknown scheme {} expected {}",
                    scheme, SCHEME
                )));
            }
            None => s,
        };

        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (rest, None),
        };

        if name.is_empty() {
            return Err(Error::config("Open: no path or database name"));
        }
        let name = urlencoding::decode(name)
            .map_err(|e| Error::config(format!("Open: malformed name {:?}: {}", name, e)))?;

        let mut target = Self::new(name);
        if let Some(query) = query {
            target.parse_query(query)?;
        }
        Ok(target)
    }
}

impl fmt::Display for OpenTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}?{}",
            SCHEME,
            urlencoding::encode(&self.name),
            self.flags.to_query()
        )?;
        if let Some(vfs) = &self.vfs {
            let encoded: String = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("vfs", vfs)
                .finish();
            write!(f, "&{}", encoded)?;
        }
        Ok(())
    }
}
