//! # Timer Device
//!
//! Hardware abstraction for monotonic time measurement.
//!
//! ## Philosophy
//!
//! **Time is a service, not a global variable.**
//!
//! A [`TimerDevice`] reports how many hardware quanta have elapsed. It does NOT:
//! - Provide wall-clock time (no UTC, no timezones)
//! - Block or sleep (polling only)
//! - Dispatch callbacks (that's the runtime's tick source)
//!
//! ## Design Principles
//!
//! 1. **Monotonic**: Ticks never go backwards
//! 2. **Non-blocking**: Always returns immediately
//! 3. **Cumulative**: Returns total ticks since boot
//!
//! ## Quantum
//!
//! The runtime's quantum is the CMOS real-time clock's fastest reliable
//! periodic rate: rate 3 divides the 32.768 kHz crystal down to 8192 Hz.
//! [`RtcRate`] captures that derivation.

use thiserror::Error;

/// Hardware timer device trait
///
/// Provides access to a monotonic tick counter. Ticks are cumulative
/// and never decrease.
///
/// # Implementation Notes
///
/// - Must be monotonic (never return a smaller value)
/// - Must not block
/// - Tick frequency is implementation-defined
pub trait TimerDevice {
    /// Returns the current tick count
    fn poll_ticks(&mut self) -> u64;
}

/// Periodic interrupt configuration for a timer device
pub trait TimerInterrupt {
    /// Programs the device to raise a periodic interrupt at `hz`
    fn configure_periodic(&mut self, hz: u32);

    /// Unmasks the periodic interrupt
    fn enable_interrupts(&mut self);

    /// Masks the periodic interrupt
    fn disable_interrupts(&mut self);
}

/// Errors from RTC rate selection
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RtcRateError {
    #[error("RTC rate {0} is outside 3..=15")]
    InvalidRate(u8),

    #[error("{0} Hz is not an RTC periodic frequency")]
    InvalidFrequency(u32),
}

/// CMOS real-time clock periodic interrupt rate selector
///
/// The RTC divides its 32768 Hz base by `2^(rate - 1)`. Rates 1 and 2
/// roll over on real hardware, so the usable range is 3 (8192 Hz) to
/// 15 (2 Hz).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RtcRate(u8);

impl RtcRate {
    /// RTC crystal frequency
    pub const BASE_HZ: u32 = 32_768;
    /// Fastest usable rate; the runtime quantum
    pub const FASTEST: RtcRate = RtcRate(3);
    /// Slowest rate
    pub const SLOWEST: RtcRate = RtcRate(15);

    /// Creates a rate selector, rejecting values outside 3..=15
    pub fn new(rate: u8) -> Result<Self, RtcRateError> {
        if (Self::FASTEST.0..=Self::SLOWEST.0).contains(&rate) {
            Ok(Self(rate))
        } else {
            Err(RtcRateError::InvalidRate(rate))
        }
    }

    /// Finds the rate selector producing exactly `hz`
    pub fn from_frequency(hz: u32) -> Result<Self, RtcRateError> {
        (Self::FASTEST.0..=Self::SLOWEST.0)
            .map(Self)
            .find(|rate| rate.frequency_hz() == hz)
            .ok_or(RtcRateError::InvalidFrequency(hz))
    }

    /// Returns the raw selector written to status register A
    pub const fn selector(&self) -> u8 {
        self.0
    }

    /// Returns the periodic interrupt frequency
    pub const fn frequency_hz(&self) -> u32 {
        Self::BASE_HZ >> (self.0 - 1)
    }

    /// Returns the length of one period in nanoseconds (may be fractional)
    pub fn period_nanos(&self) -> f64 {
        1_000_000_000.0 / f64::from(self.frequency_hz())
    }
}
