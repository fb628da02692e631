//! Access capability flags
//!
//! Every I/O object advertises the operations it supports as an
//! [`AccessMode`]. `open` computes the mode a caller asks for and refuses
//! anything the object cannot honour.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Read/write capability set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AccessMode {
    pub read: bool,
    pub write: bool,
}

/// Errors from capability checks
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("requested access {requested} exceeds supported access {supported}")]
    Unsupported {
        requested: AccessMode,
        supported: AccessMode,
    },
}

impl AccessMode {
    /// No access
    pub const fn none() -> Self {
        Self {
            read: false,
            write: false,
        }
    }

    /// Read-only
    pub const fn read_only() -> Self {
        Self {
            read: true,
            write: false,
        }
    }

    /// Write-only
    pub const fn write_only() -> Self {
        Self {
            read: false,
            write: true,
        }
    }

    /// Read and write
    pub const fn read_write() -> Self {
        Self {
            read: true,
            write: true,
        }
    }

    /// Returns true if every flag in `other` is also set here
    pub fn contains(&self, other: AccessMode) -> bool {
        (!other.read || self.read) && (!other.write || self.write)
    }

    /// Checks that `requested` is a subset of this (supported) mode
    pub fn check(&self, requested: AccessMode) -> Result<(), AccessError> {
        if self.contains(requested) {
            Ok(())
        } else {
            Err(AccessError::Unsupported {
                requested,
                supported: *self,
            })
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = if self.read { 'r' } else { '-' };
        let w = if self.write { 'w' } else { '-' };
        write!(f, "{}{}", r, w)
    }
}
