//! # Tick Source
//!
//! Converts hardware time into runtime quanta.
//!
//! ## Philosophy
//!
//! **One clock, one writer.**
//!
//! The [`TickCounter`] is the authoritative count of elapsed quanta. Only
//! the dispatcher advances it, one quantum per pass, so every tick the
//! counter ever shows has had exactly one dispatch pass. Everything else
//! reads it.
//!
//! A [`TickSource`] sits between a [`TimerDevice`] and a [`Runtime`]: it
//! programs the device for [`TICK_RATE`], polls it, works out how many
//! quanta elapsed since the last poll, and runs one dispatch pass per
//! quantum.
//!
//! ## Devices
//!
//! - [`SimTimerDevice`]: advances only when a test says so
//! - [`FakeTimerDevice`]: replays a scripted sequence
//! - [`HostClockDevice`]: derives quanta from the host's monotonic clock

use crate::Runtime;
use hal::{TimerDevice, TimerInterrupt};
use log::{debug, trace};
use runtime_api::{TickSpan, TICK_HZ, TICK_RATE};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Monotonic count of elapsed quanta since boot
#[derive(Debug, Default)]
pub struct TickCounter {
    ticks: AtomicU64,
}

impl TickCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tick
    pub fn current(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Advances by one quantum and returns the new tick
    pub(crate) fn advance(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Simulated timer device with controllable time progression
///
/// Only advances when explicitly instructed via `advance_ticks()`, which
/// keeps tests predictable and reproducible.
///
/// # Examples
///
/// ```
/// use sim_runtime::tick_source::SimTimerDevice;
/// use hal::TimerDevice;
///
/// let mut timer = SimTimerDevice::new();
/// assert_eq!(timer.poll_ticks(), 0);
///
/// timer.advance_ticks(8192);
/// assert_eq!(timer.poll_ticks(), 8192);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimTimerDevice {
    ticks: u64,
    configured_hz: Option<u32>,
    interrupts_enabled: bool,
}

impl SimTimerDevice {
    /// Creates a timer starting at tick 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the timer by `delta` quanta
    pub fn advance_ticks(&mut self, delta: u64) {
        self.ticks = self.ticks.saturating_add(delta);
    }

    /// Sets the timer to a specific tick count
    ///
    /// # Panics
    ///
    /// Panics if `new_ticks` is behind the current count.
    pub fn set_ticks(&mut self, new_ticks: u64) {
        assert!(
            new_ticks >= self.ticks,
            "Cannot set ticks backwards: {} < {}",
            new_ticks,
            self.ticks
        );
        self.ticks = new_ticks;
    }

    /// Current count without requiring `&mut`
    pub fn current_ticks(&self) -> u64 {
        self.ticks
    }

    pub fn configured_hz(&self) -> Option<u32> {
        self.configured_hz
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled
    }
}

impl TimerDevice for SimTimerDevice {
    fn poll_ticks(&mut self) -> u64 {
        self.ticks
    }
}

impl TimerInterrupt for SimTimerDevice {
    fn configure_periodic(&mut self, hz: u32) {
        self.configured_hz = Some(hz);
    }

    fn enable_interrupts(&mut self) {
        self.interrupts_enabled = true;
    }

    fn disable_interrupts(&mut self) {
        self.interrupts_enabled = false;
    }
}

/// Timer replaying a scripted, monotonic tick sequence
///
/// Once the script runs out the last value repeats.
#[derive(Debug)]
pub struct FakeTimerDevice {
    ticks: Vec<u64>,
    index: usize,
    configured_hz: Option<u32>,
    interrupts_enabled: bool,
}

impl FakeTimerDevice {
    /// # Panics
    ///
    /// Panics if `ticks` is not monotonic.
    pub fn new(ticks: Vec<u64>) -> Self {
        for pair in ticks.windows(2) {
            assert!(
                pair[1] >= pair[0],
                "Tick sequence must be monotonic: {} < {}",
                pair[1],
                pair[0]
            );
        }
        Self {
            ticks,
            index: 0,
            configured_hz: None,
            interrupts_enabled: false,
        }
    }

    /// Scripted values not yet returned
    pub fn remaining(&self) -> usize {
        self.ticks.len().saturating_sub(self.index)
    }

    pub fn configured_hz(&self) -> Option<u32> {
        self.configured_hz
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled
    }
}

impl TimerInterrupt for FakeTimerDevice {
    fn configure_periodic(&mut self, hz: u32) {
        self.configured_hz = Some(hz);
    }

    fn enable_interrupts(&mut self) {
        self.interrupts_enabled = true;
    }

    fn disable_interrupts(&mut self) {
        self.interrupts_enabled = false;
    }
}

impl TimerDevice for FakeTimerDevice {
    fn poll_ticks(&mut self) -> u64 {
        match self.ticks.get(self.index) {
            Some(&ticks) => {
                self.index += 1;
                ticks
            }
            None => self.ticks.last().copied().unwrap_or(0),
        }
    }
}

/// Timer derived from the host's monotonic clock
///
/// Counts at [`TICK_HZ`] until programmed otherwise. Masking interrupts
/// freezes the count.
#[derive(Debug)]
pub struct HostClockDevice {
    start: std::time::Instant,
    hz: u32,
    frozen_at: Option<u64>,
}

impl HostClockDevice {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
            hz: TICK_RATE.frequency_hz(),
            frozen_at: None,
        }
    }

    fn elapsed_ticks(&self) -> u64 {
        let nanos = self.start.elapsed().as_nanos();
        let ticks = nanos * u128::from(self.hz) / 1_000_000_000;
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }
}

impl Default for HostClockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerDevice for HostClockDevice {
    fn poll_ticks(&mut self) -> u64 {
        match self.frozen_at {
            Some(ticks) => ticks,
            None => self.elapsed_ticks(),
        }
    }
}

impl TimerInterrupt for HostClockDevice {
    fn configure_periodic(&mut self, hz: u32) {
        self.hz = hz;
    }

    fn enable_interrupts(&mut self) {
        self.frozen_at = None;
    }

    fn disable_interrupts(&mut self) {
        self.frozen_at = Some(self.elapsed_ticks());
    }
}

/// Drives a runtime from a timer device
#[derive(Debug)]
pub struct TickSource<T: TimerDevice + TimerInterrupt> {
    device: T,
    last_seen: u64,
}

impl<T: TimerDevice + TimerInterrupt> TickSource<T> {
    /// Programs the device for one interrupt per quantum and unmasks it
    ///
    /// Quanta elapsed before this call are not replayed.
    pub fn new(mut device: T) -> Self {
        device.configure_periodic(TICK_RATE.frequency_hz());
        device.enable_interrupts();
        let last_seen = device.poll_ticks();
        debug!("tick source armed at {} Hz", TICK_HZ);
        Self { device, last_seen }
    }

    /// Polls the device and runs one dispatch pass per elapsed quantum
    ///
    /// Returns the number of passes run. If another driver holds the
    /// dispatcher, the remaining quanta are kept for the next pump.
    pub fn pump(&mut self, runtime: &Runtime) -> u64 {
        let current = self.device.poll_ticks();
        let delta = current.saturating_sub(self.last_seen);
        let mut passes = 0;
        while passes < delta {
            if let Err(err) = runtime.tick() {
                trace!("tick source: {}, {} quanta deferred", err, delta - passes);
                break;
            }
            passes += 1;
        }
        self.last_seen += passes;
        if passes > 0 {
            trace!("tick source: {} quanta, now at tick {}", passes, runtime.ticks());
        }
        passes
    }

    /// Masks the device's interrupt and hands it back
    pub fn into_device(mut self) -> T {
        self.device.disable_interrupts();
        self.device
    }

    pub fn device(&self) -> &T {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut T {
        &mut self.device
    }
}

/// Background thread pumping a [`TickSource`] in real time
///
/// Stopped and joined on [`TickThread::stop`] or on drop.
pub struct TickThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<u64>>,
}

impl TickThread {
    /// Spawns the driver thread
    pub fn spawn<T>(runtime: Arc<Runtime>, device: T) -> std::io::Result<Self>
    where
        T: TimerDevice + TimerInterrupt + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let quantum = TickSpan::from_ticks(1).as_duration();

        let handle = thread::Builder::new()
            .name("tick-source".to_string())
            .spawn(move || {
                let mut source = TickSource::new(device);
                let mut passes = 0;
                while !flag.load(Ordering::Acquire) {
                    passes += source.pump(&runtime);
                    thread::sleep(quantum);
                }
                source.into_device();
                passes
            })?;

        debug!("tick thread started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stops the thread and returns how many dispatch passes it ran
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        self.stop.store(true, Ordering::Release);
        let passes = match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(0),
            None => 0,
        };
        debug!("tick thread stopped after {} passes", passes);
        passes
    }
}

impl Drop for TickThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}
