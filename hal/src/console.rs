//! Character device abstraction
//!
//! The console is a byte-at-a-time device: a serial port, a VGA text
//! buffer with a keyboard behind it, or a test double.
//!
//! ## Design
//!
//! - Poll-based: `poll_byte` reports `Pending` instead of blocking
//! - Backpressure is explicit: `put_byte` reports `Busy` when full
//! - Retry policy belongs to the adapter above this layer

use thiserror::Error;

/// Result of polling a character device for input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharPoll {
    /// A byte was available
    Ready(u8),
    /// Nothing available yet
    Pending,
    /// Input side is closed; no more bytes will arrive
    Closed,
}

/// Errors from character device output
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CharDeviceError {
    #[error("device busy")]
    Busy,

    #[error("device disconnected")]
    Disconnected,
}

/// Byte-oriented device
pub trait CharDevice: Send {
    /// Polls for one input byte
    fn poll_byte(&mut self) -> CharPoll;

    /// Emits one output byte
    fn put_byte(&mut self, byte: u8) -> Result<(), CharDeviceError>;

    /// Flushes any device-side buffering
    fn flush(&mut self) -> Result<(), CharDeviceError> {
        Ok(())
    }

    /// Human-readable device name
    fn identify(&self) -> &str;
}
