//! Identifiers for runtime entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to an open I/O object
///
/// Descriptors are small and dense. Values 0, 1 and 2 are pre-bound to
/// stdin, stdout and stderr and stay valid for the lifetime of the runtime.
/// Everything at or above [`FileDescriptor::FIRST_DYNAMIC`] is handed out
/// by `open`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FileDescriptor(u16);

impl FileDescriptor {
    /// Standard input
    pub const STDIN: FileDescriptor = FileDescriptor(0);
    /// Standard output
    pub const STDOUT: FileDescriptor = FileDescriptor(1);
    /// Standard error
    pub const STDERR: FileDescriptor = FileDescriptor(2);
    /// Lowest descriptor value `open` may allocate
    pub const FIRST_DYNAMIC: u16 = 3;

    /// Creates a descriptor from its raw ABI value
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw ABI value
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns true for stdin, stdout and stderr
    pub const fn is_reserved(&self) -> bool {
        self.0 < Self::FIRST_DYNAMIC
    }
}

impl From<u16> for FileDescriptor {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Display for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd:{}", self.0)
    }
}

/// Handle to a registered timer
///
/// Unique among live registrations only. A handle freed by unregistration
/// may be handed out again.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimerHandle(u16);

impl TimerHandle {
    /// Creates a handle from its raw ABI value
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw ABI value
    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl From<u16> for TimerHandle {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer:{}", self.0)
    }
}

/// Timer period measured in 1/8192ths of a second (122.0703125 µs)
///
/// A period of zero means the timer is registered but disabled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TimerPeriod(u16);

impl TimerPeriod {
    /// Sentinel for "never fires"
    pub const DISABLED: TimerPeriod = TimerPeriod(0);
    /// Longest period the ABI can express (~8 seconds)
    pub const MAX: TimerPeriod = TimerPeriod(u16::MAX);

    /// Creates a period from a number of quanta
    pub const fn from_ticks(ticks: u16) -> Self {
        Self(ticks)
    }

    /// Returns the period in quanta
    pub const fn ticks(&self) -> u16 {
        self.0
    }

    /// Returns true if this is the disabled sentinel
    pub const fn is_disabled(&self) -> bool {
        self.0 == 0
    }

    /// Clamps an internal 64-bit period to the ABI width
    pub fn saturating_from(ticks: u64) -> Self {
        Self(u16::try_from(ticks).unwrap_or(u16::MAX))
    }
}

impl fmt::Display for TimerPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}q", self.0)
    }
}
