//! Time abstractions
//!
//! All runtime time is counted in quanta of 1/8192 second
//! (122.0703125 µs). The unit is fixed by the ABI and never reinterpreted.

use crate::{RuntimeError, RuntimeResult};
use core::ops::{Add, Sub};
use hal::RtcRate;
use serde::{Deserialize, Serialize};

/// RTC rate that produces one interrupt per quantum
pub const TICK_RATE: RtcRate = RtcRate::FASTEST;

/// Quanta per second
pub const TICK_HZ: u64 = TICK_RATE.frequency_hz() as u64;

const _: () = assert!(TICK_HZ == 8192, "the ABI quantum is 1/8192 s");

/// Length of one quantum in nanoseconds (fractional)
pub const QUANTUM_NANOS: f64 = 1_000_000_000.0 / TICK_HZ as f64;

/// Durations whose quanta count falls below this are treated as zero
const NEAR_ZERO_TICKS: f64 = 1e-6;

/// A point in runtime time
///
/// Counts quanta since boot. Unlike wall-clock time this never jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Instant {
    ticks: u64,
}

impl Instant {
    /// Boot
    pub const ZERO: Instant = Instant { ticks: 0 };

    /// Creates an instant from an absolute tick count
    pub const fn from_ticks(ticks: u64) -> Self {
        Self { ticks }
    }

    /// Returns the absolute tick count
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Returns the time since boot in seconds
    pub fn as_secs_f64(&self) -> f64 {
        self.ticks as f64 / TICK_HZ as f64
    }

    /// Returns the span since another instant
    pub fn duration_since(&self, earlier: Instant) -> TickSpan {
        TickSpan::from_ticks(self.ticks.saturating_sub(earlier.ticks))
    }
}

impl Add<TickSpan> for Instant {
    type Output = Instant;

    fn add(self, span: TickSpan) -> Self::Output {
        Instant::from_ticks(self.ticks.saturating_add(span.ticks))
    }
}

impl Sub<TickSpan> for Instant {
    type Output = Instant;

    fn sub(self, span: TickSpan) -> Self::Output {
        Instant::from_ticks(self.ticks.saturating_sub(span.ticks))
    }
}

/// A span of runtime time in quanta
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TickSpan {
    ticks: u64,
}

impl TickSpan {
    /// Empty span
    pub const ZERO: TickSpan = TickSpan { ticks: 0 };

    /// Creates a span from a number of quanta
    pub const fn from_ticks(ticks: u64) -> Self {
        Self { ticks }
    }

    /// Creates a span from whole seconds
    pub const fn from_secs(secs: u64) -> Self {
        Self {
            ticks: secs * TICK_HZ,
        }
    }

    /// Converts seconds to quanta, rounding up
    ///
    /// Rejects negative and non-finite input. Values whose quanta count is
    /// vanishingly small (floating point noise around zero) become
    /// [`TickSpan::ZERO`].
    pub fn from_secs_f64(seconds: f64) -> RuntimeResult<Self> {
        if !seconds.is_finite() {
            return Err(RuntimeError::InvalidArgument(format!(
                "duration must be finite, got {}",
                seconds
            )));
        }
        if seconds < 0.0 {
            return Err(RuntimeError::InvalidArgument(format!(
                "duration must not be negative, got {}",
                seconds
            )));
        }

        let quanta = seconds * TICK_HZ as f64;
        if quanta < NEAR_ZERO_TICKS {
            return Ok(Self::ZERO);
        }
        if quanta >= u64::MAX as f64 {
            return Err(RuntimeError::InvalidArgument(format!(
                "duration of {} seconds overflows the tick counter",
                seconds
            )));
        }
        Ok(Self::from_ticks(quanta.ceil() as u64))
    }

    /// Returns the number of quanta
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Returns true for an empty span
    pub const fn is_zero(&self) -> bool {
        self.ticks == 0
    }

    /// Returns the span in seconds
    pub fn as_secs_f64(&self) -> f64 {
        self.ticks as f64 / TICK_HZ as f64
    }

    /// Converts to a standard library duration (nanosecond precision)
    pub fn as_duration(&self) -> std::time::Duration {
        let secs = self.ticks / TICK_HZ;
        let rem = self.ticks % TICK_HZ;
        // rem < 8192, so rem * 1e9 fits comfortably in u64
        let nanos = (rem * 1_000_000_000) / TICK_HZ;
        std::time::Duration::new(secs, nanos as u32)
    }
}

impl Add for TickSpan {
    type Output = TickSpan;

    fn add(self, other: TickSpan) -> Self::Output {
        TickSpan::from_ticks(self.ticks.saturating_add(other.ticks))
    }
}

impl Sub for TickSpan {
    type Output = TickSpan;

    fn sub(self, other: TickSpan) -> Self::Output {
        TickSpan::from_ticks(self.ticks.saturating_sub(other.ticks))
    }
}
