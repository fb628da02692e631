//! Open options parsing
//!
//! `open` takes a short options string in the spirit of `fopen`:
//!
//! | char | meaning |
//! |------|---------|
//! | `r`  | allow read |
//! | `w`  | allow write, truncating objects that support it |
//! | `a`  | allow write, appending |
//! | `+`  | allow both read and write |
//!
//! Characters may appear in any order but at most once each. `w` and `a`
//! are mutually exclusive.

use crate::RuntimeError;
use core_types::AccessMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing an options string
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("empty options string")]
    Empty,

    #[error("unknown option {0:?}")]
    Unknown(char),

    #[error("option {0:?} given twice")]
    Duplicate(char),

    #[error("'w' and 'a' cannot be combined")]
    TruncateAndAppend,
}

impl From<OptionsError> for RuntimeError {
    fn from(error: OptionsError) -> Self {
        RuntimeError::InvalidOption(error.to_string())
    }
}

/// Parsed open options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
}

impl OpenOptions {
    /// Parses an options string
    pub fn parse(options: &str) -> Result<Self, OptionsError> {
        if options.is_empty() {
            return Err(OptionsError::Empty);
        }

        let mut seen = [false; 4];
        for c in options.chars() {
            let slot = match c {
                'r' => 0,
                'w' => 1,
                'a' => 2,
                '+' => 3,
                other => return Err(OptionsError::Unknown(other)),
            };
            if seen[slot] {
                return Err(OptionsError::Duplicate(c));
            }
            seen[slot] = true;
        }

        let [r, w, a, plus] = seen;
        if w && a {
            return Err(OptionsError::TruncateAndAppend);
        }

        Ok(Self {
            read: r || plus,
            write: w || a || plus,
            append: a,
            truncate: w,
        })
    }

    /// Read-only options, as used for the pre-bound stdin
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    /// Write-only options, as used for the pre-bound stdout/stderr
    pub fn write_only() -> Self {
        Self {
            write: true,
            ..Self::default()
        }
    }

    /// Returns the access mode these options request
    pub fn access(&self) -> AccessMode {
        AccessMode {
            read: self.read,
            write: self.write,
        }
    }
}
