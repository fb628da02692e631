//! # Hardware Abstraction Layer (HAL)
//!
//! This crate defines the hardware traits the runtime core is built on.
//!
//! ## Philosophy
//!
//! **Hardware is a source of events, not a place for policy.**
//!
//! The runtime never talks to a device directly. It polls a
//! [`TimerDevice`] for elapsed quanta and moves bytes through a
//! [`CharDevice`]. Simulated implementations live next to the runtime so
//! the whole core runs under `cargo test`.
//!
//! ## Design Principles
//!
//! 1. **Trait-based**: All hardware operations go through traits
//! 2. **Poll-based**: Devices never block, they report `Pending`/`Busy`
//! 3. **Testable**: Every trait can be faked

pub mod console;
pub mod timer;

pub use console::{CharDevice, CharDeviceError, CharPoll};
pub use timer::{RtcRate, RtcRateError, TimerDevice, TimerInterrupt};
