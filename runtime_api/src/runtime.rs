//! Runtime API trait and timer callback capability

use crate::{Instant, RuntimeResult};
use core_types::{FileDescriptor, TimerHandle, TimerPeriod};
use std::sync::Arc;

/// Callable with one 64-bit tick argument
///
/// This is the type-erased form of the ABI's `timer_callback`. Any
/// `Fn(u64) + Send + Sync` closure is a callback.
pub trait TimerCallback: Send + Sync {
    /// Invoked by the dispatch loop with the tick that made the timer due
    fn on_tick(&self, tick: u64);
}

impl<F> TimerCallback for F
where
    F: Fn(u64) + Send + Sync,
{
    fn on_tick(&self, tick: u64) {
        self(tick)
    }
}

/// The runtime API trait
///
/// This is the interface userland sees. Implementations:
/// - Simulated runtime (in-process, deterministic time)
/// - Syscall gate (serialized requests routed to a runtime)
///
/// # Example
///
/// ```ignore
/// fn greet(rt: &dyn RuntimeApi) -> RuntimeResult<()> {
///     let out = rt.open("stdout", "w")?;
///     rt.write(out, b"hi")?;
///     rt.close(out, &[])
/// }
/// ```
pub trait RuntimeApi {
    /// Opens `path` with an options string and returns a descriptor
    fn open(&self, path: &str, options: &str) -> RuntimeResult<FileDescriptor>;

    /// Reads up to `buffer.len()` bytes; `Ok(0)` is end-of-stream
    fn read(&self, fd: FileDescriptor, buffer: &mut [u8]) -> RuntimeResult<usize>;

    /// Writes up to `buffer.len()` bytes and reports exactly how many went out
    fn write(&self, fd: FileDescriptor, buffer: &[u8]) -> RuntimeResult<usize>;

    /// Flushes `pending` to the object, then releases the descriptor
    ///
    /// Closing a descriptor that is not open is a successful no-op.
    fn close(&self, fd: FileDescriptor, pending: &[u8]) -> RuntimeResult<()>;

    /// Registers a callback; the timer starts disabled (period 0)
    fn register_timer_cb(&self, callback: Arc<dyn TimerCallback>) -> RuntimeResult<TimerHandle>;

    /// Returns the current period of a timer
    fn timer_period(&self, timer: TimerHandle) -> RuntimeResult<TimerPeriod>;

    /// Sets a timer's period and restarts its phase from now
    fn set_timer_period(&self, timer: TimerHandle, period: TimerPeriod) -> RuntimeResult<()>;

    /// Blocks the calling context for at least `seconds`
    fn sleep(&self, seconds: f64) -> RuntimeResult<()>;

    /// Returns the current tick
    fn now(&self) -> Instant;
}
