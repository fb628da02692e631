//! Test utilities
//!
//! Helpers for unit and integration tests that drive a [`Runtime`].

use crate::config::MountKind;
use crate::console::SimConsole;
use crate::Runtime;
use runtime_api::TimerCallback;
use spin::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Callback recording every tick it was invoked with
#[derive(Debug, Default)]
pub struct RecordingCallback {
    ticks: Mutex<Vec<u64>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ticks seen so far, in invocation order
    pub fn ticks(&self) -> Vec<u64> {
        self.ticks.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.ticks.lock().len()
    }

    pub fn last(&self) -> Option<u64> {
        self.ticks.lock().last().copied()
    }
}

impl TimerCallback for RecordingCallback {
    fn on_tick(&self, tick: u64) {
        self.ticks.lock().push(tick);
    }
}

/// Runtime plus an observer handle on its console
pub fn runtime_with_console() -> (Runtime, SimConsole) {
    let console = SimConsole::new();
    let runtime = Runtime::builder().console(console.clone()).build();
    match runtime {
        Ok(runtime) => (runtime, console),
        Err(err) => panic!("default configuration rejected: {}", err),
    }
}

/// Runtime with a loopback mount at `path`
pub fn runtime_with_loopback(path: &str, capacity: usize) -> Runtime {
    match Runtime::builder()
        .mount(path, MountKind::Loopback { capacity })
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => panic!("loopback mount {} rejected: {}", path, err),
    }
}

/// Spins until `condition` holds, panicking after `timeout`
pub fn wait_until<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within {:?}", timeout);
        std::thread::yield_now();
    }
}
