//! # Simulated Runtime
//!
//! In-process implementation of the runtime API.
//!
//! ## Purpose
//!
//! The simulated runtime runs the initrd core without hardware:
//! - Runs under `cargo test`
//! - Deterministic (time advances only when a tick source or test says so)
//! - Inspectable (descriptor table, registry and console are all visible)
//!
//! ## Layout
//!
//! - [`descriptor_table`]: descriptors → I/O objects
//! - [`io_object`], [`streams`], [`console`]: the objects themselves
//! - [`namespace`]: path resolution
//! - [`timer_registry`], [`dispatch`], [`tick_source`]: timers and time
//! - [`sleep`]: blocking sleep on one-shot timers
//! - [`syscall_gate`]: serialized ABI entry point
//!
//! All state lives in a [`Runtime`] value. There are no globals.

pub mod config;
pub mod console;
pub mod descriptor_table;
pub mod dispatch;
pub mod io_object;
pub mod namespace;
pub mod sleep;
pub mod streams;
pub mod syscall_gate;
pub mod test_utils;
pub mod tick_source;
pub mod timer_registry;

use config::{ConfigError, MountConfig, MountKind, RuntimeConfig};
use console::SimConsole;
use core_types::{AccessMode, FileDescriptor, TimerHandle, TimerPeriod};
use descriptor_table::{DescriptorTable, OpenFile};
use dispatch::{DispatchError, DispatchReport, DispatchState, Dispatcher};
use hal::CharDevice;
use io_object::{share_console, ConsoleAdapter, IoObject, SharedConsole};
use log::{debug, info};
use namespace::{ConsolePath, Namespace, Resolved};
use runtime_api::{
    Instant, OpenOptions, RuntimeApi, RuntimeError, RuntimeResult, TimerCallback, TICK_HZ,
};
use sleep::{SleepCanceller, SleepOutcome};
use spin::Mutex;
use std::sync::Arc;
use tick_source::TickCounter;
use timer_registry::TimerRegistry;

/// Runtime state
///
/// Owns the descriptor table, the timer registry and the tick counter.
/// Shared between threads behind an `Arc`; every entry point takes `&self`.
pub struct Runtime {
    config: RuntimeConfig,
    counter: TickCounter,
    registry: Mutex<TimerRegistry>,
    descriptors: DescriptorTable,
    namespace: Namespace,
    console: SharedConsole,
    dispatcher: Dispatcher,
}

impl Runtime {
    /// Creates a runtime with the default configuration and a
    /// [`SimConsole`] nobody observes
    pub fn new() -> Self {
        let config = RuntimeConfig::default();
        let console = share_console(SimConsole::new());
        Self::assemble(config, console.clone(), console)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    fn assemble(config: RuntimeConfig, console: SharedConsole, error_console: SharedConsole) -> Self {
        let descriptors = DescriptorTable::new(config.max_descriptors);
        let retries = config.console_retry_limit;
        let bind = |fd: FileDescriptor, path: &str, device: &SharedConsole, options: OpenOptions| {
            let adapter = ConsoleAdapter::new(device.clone(), options.access(), retries);
            descriptors.bind_reserved(fd, OpenFile::new(path, options, IoObject::Console(adapter)));
        };
        bind(FileDescriptor::STDIN, "stdin", &console, OpenOptions::read_only());
        bind(FileDescriptor::STDOUT, "stdout", &console, OpenOptions::write_only());
        bind(FileDescriptor::STDERR, "stderr", &error_console, OpenOptions::write_only());

        let namespace = Namespace::from_config(&config.mounts);
        info!(
            "runtime up: {} descriptors, {} timers, {} mounts",
            config.max_descriptors,
            config.max_timers,
            config.mounts.len()
        );

        Self {
            registry: Mutex::new(TimerRegistry::new(config.max_timers)),
            counter: TickCounter::new(),
            descriptors,
            namespace,
            console,
            dispatcher: Dispatcher::new(),
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Current tick
    pub fn ticks(&self) -> u64 {
        self.counter.current()
    }

    /// Time since boot in seconds
    pub fn uptime_seconds(&self) -> f64 {
        self.ticks() as f64 / TICK_HZ as f64
    }

    /// Runs one dispatch pass, advancing the clock by one quantum
    ///
    /// Fails with [`DispatchError::Busy`] while another pass is running,
    /// including when called from a timer callback.
    pub fn tick(&self) -> Result<DispatchReport, DispatchError> {
        self.dispatcher.run_tick(&self.registry, &self.counter)
    }

    /// Runs `quanta` dispatch passes and returns how many callbacks fired
    ///
    /// Stops at the first pass that cannot run.
    pub fn advance_ticks(&self, quanta: u64) -> Result<usize, DispatchError> {
        let mut fired = 0;
        for _ in 0..quanta {
            fired += self.tick()?.fired_count();
        }
        Ok(fired)
    }

    pub fn dispatch_state(&self) -> DispatchState {
        self.dispatcher.state()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Live timer registrations, internal sleep timers included
    pub fn timer_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Earliest tick at which some timer is due
    pub fn next_deadline(&self) -> Option<u64> {
        self.registry.lock().next_deadline()
    }

    /// Removes a timer registered through `register_timer_cb`
    pub fn unregister_timer(&self, timer: TimerHandle) -> RuntimeResult<()> {
        self.registry.lock().unregister(timer)
    }

    /// Descriptors currently in the table, reserved ones included
    pub fn open_descriptors(&self) -> Vec<FileDescriptor> {
        self.descriptors.descriptors()
    }

    pub fn is_open(&self, fd: FileDescriptor) -> bool {
        self.descriptors.is_open(fd)
    }

    /// Sleeps like [`RuntimeApi::sleep`], but can be cut short
    pub fn sleep_cancellable(
        &self,
        seconds: f64,
        canceller: &SleepCanceller,
    ) -> RuntimeResult<SleepOutcome> {
        sleep::sleep_for(self, seconds, Some(canceller))
    }

    pub(crate) fn register_one_shot(
        &self,
        callback: Arc<dyn TimerCallback>,
        delay: u64,
    ) -> RuntimeResult<(TimerHandle, u64)> {
        let mut registry = self.registry.lock();
        registry.register_one_shot(callback, delay, self.counter.current())
    }

    pub(crate) fn unregister_registration(&self, timer: TimerHandle, serial: u64) -> bool {
        self.registry.lock().unregister_registration(timer, serial)
    }

    fn open_console(&self, console: ConsolePath, path: &str, options: OpenOptions) -> RuntimeResult<FileDescriptor> {
        match console.reserved_descriptor() {
            Some(fd) => {
                let bound = self.descriptors.options(fd)?;
                bound
                    .access()
                    .check(options.access())
                    .map_err(|e| RuntimeError::InvalidOption(format!("{}: {}", path, e)))?;
                debug!("{}: reopened as {}", fd, path);
                Ok(fd)
            }
            None => {
                let adapter = ConsoleAdapter::new(
                    self.console.clone(),
                    AccessMode::read_write(),
                    self.config.console_retry_limit,
                );
                self.descriptors
                    .insert(OpenFile::new(path, options, IoObject::Console(adapter)))
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeApi for Runtime {
    fn open(&self, path: &str, options: &str) -> RuntimeResult<FileDescriptor> {
        let options = OpenOptions::parse(options)?;
        match self.namespace.resolve(path) {
            Some(Resolved::Console(console)) => self.open_console(console, path, options),
            Some(Resolved::Mount(backing)) => {
                backing
                    .capabilities()
                    .check(options.access())
                    .map_err(|e| RuntimeError::InvalidOption(format!("{}: {}", path, e)))?;
                let stream = backing.instantiate(&options);
                self.descriptors
                    .insert(OpenFile::new(path, options, IoObject::Stream(stream)))
            }
            None => Err(RuntimeError::NotFound(path.to_string())),
        }
    }

    fn read(&self, fd: FileDescriptor, buffer: &mut [u8]) -> RuntimeResult<usize> {
        self.descriptors.read(fd, buffer)
    }

    fn write(&self, fd: FileDescriptor, buffer: &[u8]) -> RuntimeResult<usize> {
        self.descriptors.write(fd, buffer)
    }

    fn close(&self, fd: FileDescriptor, pending: &[u8]) -> RuntimeResult<()> {
        self.descriptors.close(fd, pending)
    }

    fn register_timer_cb(&self, callback: Arc<dyn TimerCallback>) -> RuntimeResult<TimerHandle> {
        let mut registry = self.registry.lock();
        registry.register(callback, self.counter.current())
    }

    fn timer_period(&self, timer: TimerHandle) -> RuntimeResult<TimerPeriod> {
        self.registry.lock().period(timer)
    }

    fn set_timer_period(&self, timer: TimerHandle, period: TimerPeriod) -> RuntimeResult<()> {
        let mut registry = self.registry.lock();
        registry.set_period(timer, period, self.counter.current())
    }

    fn sleep(&self, seconds: f64) -> RuntimeResult<()> {
        sleep::sleep_for(self, seconds, None).map(|_| ())
    }

    fn now(&self) -> Instant {
        Instant::from_ticks(self.ticks())
    }
}

/// Builder for a [`Runtime`]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    console: Option<SharedConsole>,
    error_console: Option<SharedConsole>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            console: None,
            error_console: None,
        }
    }

    /// Replaces the whole configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Console behind stdin, stdout and `/dev/console`
    pub fn console<D: CharDevice + 'static>(mut self, device: D) -> Self {
        self.console = Some(share_console(device));
        self
    }

    /// Console behind stderr; defaults to the main console
    pub fn error_console<D: CharDevice + 'static>(mut self, device: D) -> Self {
        self.error_console = Some(share_console(device));
        self
    }

    pub fn mount(mut self, path: &str, kind: MountKind) -> Self {
        self.config.mounts.push(MountConfig::new(path, kind));
        self
    }

    pub fn max_descriptors(mut self, max: u32) -> Self {
        self.config.max_descriptors = max;
        self
    }

    pub fn max_timers(mut self, max: u32) -> Self {
        self.config.max_timers = max;
        self
    }

    /// Validates the configuration and builds the runtime
    pub fn build(self) -> Result<Runtime, ConfigError> {
        self.config.validate()?;
        let console = match self.console {
            Some(console) => console,
            None => match self.config.console_output_capacity {
                Some(capacity) => share_console(SimConsole::with_output_capacity(capacity)),
                None => share_console(SimConsole::new()),
            },
        };
        let error_console = self.error_console.unwrap_or_else(|| console.clone());
        Ok(Runtime::assemble(self.config, console, error_console))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
