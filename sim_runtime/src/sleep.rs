//! Blocking sleep built on one-shot timers
//!
//! The sleeping thread parks; a one-shot timer's callback unparks it. The
//! timer is removed before `sleep` returns, whichever way it ends, so no
//! stray firing can reach a caller that already resumed.
//!
//! Something else must drive the clock while a thread sleeps: a
//! [`TickThread`](crate::tick_source::TickThread) or another thread calling
//! [`Runtime::advance_ticks`].

use crate::Runtime;
use log::debug;
use runtime_api::{RuntimeResult, TickSpan, TimerCallback};
use spin::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};

/// How a sleep ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Elapsed,
    Cancelled,
}

struct WakeSignal {
    fired: AtomicBool,
    sleeper: Thread,
}

impl WakeSignal {
    fn new(sleeper: Thread) -> Self {
        Self {
            fired: AtomicBool::new(false),
            sleeper,
        }
    }

    fn fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl TimerCallback for WakeSignal {
    fn on_tick(&self, _tick: u64) {
        self.fired.store(true, Ordering::Release);
        self.sleeper.unpark();
    }
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    sleeper: Mutex<Option<Thread>>,
}

/// Cancels a sleep from another thread
///
/// Clones share state. A canceller that is already cancelled makes any
/// sleep using it return [`SleepOutcome::Cancelled`] immediately, until
/// [`SleepCanceller::reset`] is called.
#[derive(Clone, Default)]
pub struct SleepCanceller {
    state: Arc<CancelState>,
}

impl SleepCanceller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        if let Some(sleeper) = self.state.sleeper.lock().as_ref() {
            sleeper.unpark();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.state.cancelled.store(false, Ordering::Release);
    }

    fn attach(&self, sleeper: Thread) {
        *self.state.sleeper.lock() = Some(sleeper);
    }

    fn detach(&self) {
        self.state.sleeper.lock().take();
    }
}

pub(crate) fn sleep_for(
    runtime: &Runtime,
    seconds: f64,
    canceller: Option<&SleepCanceller>,
) -> RuntimeResult<SleepOutcome> {
    let span = TickSpan::from_secs_f64(seconds)?;
    let cancelled = || canceller.map(SleepCanceller::is_cancelled).unwrap_or(false);

    if cancelled() {
        return Ok(SleepOutcome::Cancelled);
    }
    if span.is_zero() {
        return Ok(SleepOutcome::Elapsed);
    }

    let signal = Arc::new(WakeSignal::new(thread::current()));
    let (handle, serial) = runtime.register_one_shot(signal.clone(), span.ticks())?;
    if let Some(canceller) = canceller {
        canceller.attach(thread::current());
    }
    debug!("{}: sleeping {} quanta", handle, span.ticks());

    let outcome = loop {
        if signal.fired() {
            break SleepOutcome::Elapsed;
        }
        if cancelled() {
            break SleepOutcome::Cancelled;
        }
        thread::park();
    };

    if let Some(canceller) = canceller {
        canceller.detach();
    }
    runtime.unregister_registration(handle, serial);
    debug!("{}: sleep ended ({:?})", handle, outcome);
    Ok(outcome)
}
