//! # Runtime API
//!
//! This crate defines the ABI between initrd userland and the runtime core.
//!
//! ## Philosophy
//!
//! The runtime provides **mechanisms**, not policies:
//! - Descriptor-based I/O (open, read, write, close)
//! - Periodic timers at a fixed 8192 Hz quantum
//! - Sleeping built on those timers
//!
//! ## Design Goals
//!
//! 1. **Testability**: The entire API can be implemented in-process
//! 2. **Explicitness**: Runtime state is a value, not an ambient global
//! 3. **ABI fidelity**: Widths and units match the userland header
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A filesystem (paths resolve against a flat mount namespace)
//! - A process model (no fork, exec, signals)
//! - A network stack

pub mod error;
pub mod options;
pub mod runtime;
pub mod syscalls;
pub mod time;

pub use error::{RuntimeError, RuntimeResult};
pub use options::{OpenOptions, OptionsError};
pub use runtime::{RuntimeApi, TimerCallback};
pub use syscalls::{Syscall, SyscallError, SyscallErrorKind, SyscallReply};
pub use time::{Instant, TickSpan, TICK_HZ, TICK_RATE};
