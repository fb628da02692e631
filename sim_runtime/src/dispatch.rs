//! Dispatch loop
//!
//! One pass per quantum. The snapshot of due timers is taken while holding
//! the registry lock; callbacks run after it is released, so they may call
//! back into the registry (register, unregister, re-period) freely.
//!
//! A pass has a single driver. A second caller, on another thread or from
//! inside a callback, gets [`DispatchError::Busy`] instead of a pass.

use crate::tick_source::TickCounter;
use crate::timer_registry::{TimerKind, TimerRegistry};
use core_types::TimerHandle;
use log::trace;
use spin::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;

/// Dispatch errors
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Another pass is running; the clock was not advanced
    #[error("dispatch pass already in progress")]
    Busy,
}

/// Whether a pass is currently invoking callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Firing,
}

/// Outcome of one dispatch pass
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Tick this pass ran for
    pub tick: u64,
    /// Timers whose callback ran, in invocation order
    pub fired: Vec<TimerHandle>,
    /// Snapshot entries unregistered by an earlier callback of this pass
    pub skipped: Vec<TimerHandle>,
}

impl DispatchReport {
    pub fn fired_count(&self) -> usize {
        self.fired.len()
    }
}

/// Per-runtime dispatch state and counters
#[derive(Debug, Default)]
pub struct Dispatcher {
    /// Held for the whole pass
    driver: Mutex<()>,
    firing: AtomicBool,
    passes: AtomicU64,
    fired_total: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by one quantum and fires everything due
    pub fn run_tick(
        &self,
        registry: &Mutex<TimerRegistry>,
        counter: &TickCounter,
    ) -> Result<DispatchReport, DispatchError> {
        let _driver = self.driver.try_lock().ok_or(DispatchError::Busy)?;
        let (tick, due) = {
            let mut registry = registry.lock();
            let tick = counter.advance();
            (tick, registry.collect_due(tick))
        };
        self.passes.fetch_add(1, Ordering::Relaxed);

        let mut report = DispatchReport {
            tick,
            ..DispatchReport::default()
        };
        if due.is_empty() {
            return Ok(report);
        }

        self.firing.store(true, Ordering::Release);
        for entry in due {
            if !registry.lock().contains_registration(entry.handle, entry.serial) {
                trace!("{}: unregistered earlier in tick {}, skipped", entry.handle, tick);
                report.skipped.push(entry.handle);
                continue;
            }

            entry.callback.on_tick(tick);
            if entry.kind == TimerKind::OneShot {
                registry
                    .lock()
                    .unregister_registration(entry.handle, entry.serial);
            }
            report.fired.push(entry.handle);
        }
        self.firing.store(false, Ordering::Release);

        self.fired_total
            .fetch_add(report.fired.len() as u64, Ordering::Relaxed);
        trace!(
            "tick {}: fired {:?}, skipped {:?}",
            tick,
            report.fired,
            report.skipped
        );
        Ok(report)
    }

    pub fn state(&self) -> DispatchState {
        if self.firing.load(Ordering::Acquire) {
            DispatchState::Firing
        } else {
            DispatchState::Idle
        }
    }

    /// Passes run since boot
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Callbacks invoked since boot
    pub fn fired_total(&self) -> u64 {
        self.fired_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::TimerPeriod;
    use runtime_api::TimerCallback;
    use std::sync::Arc;

    fn periodic(registry: &Mutex<TimerRegistry>, period: u16, callback: Arc<dyn TimerCallback>) -> TimerHandle {
        let mut registry = registry.lock();
        let handle = registry.register(callback, 0).unwrap();
        registry
            .set_period(handle, TimerPeriod::from_ticks(period), 0)
            .unwrap();
        handle
    }

    #[test]
    fn test_idle_pass() {
        let registry = Mutex::new(TimerRegistry::new(4));
        let counter = TickCounter::new();
        let dispatcher = Dispatcher::new();

        let report = dispatcher.run_tick(&registry, &counter).unwrap();
        assert_eq!(report.tick, 1);
        assert!(report.fired.is_empty());
        assert_eq!(dispatcher.state(), DispatchState::Idle);
        assert_eq!(dispatcher.passes(), 1);
    }

    #[test]
    fn test_callback_sees_current_tick() {
        let registry = Mutex::new(TimerRegistry::new(4));
        let counter = TickCounter::new();
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(AtomicU64::new(0));
        let sink = seen.clone();
        periodic(
            &registry,
            3,
            Arc::new(move |tick: u64| sink.store(tick, Ordering::SeqCst)),
        );

        dispatcher.run_tick(&registry, &counter).unwrap();
        dispatcher.run_tick(&registry, &counter).unwrap();
        let report = dispatcher.run_tick(&registry, &counter).unwrap();
        assert_eq!(report.fired, vec![TimerHandle::new(0)]);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(dispatcher.fired_total(), 1);
    }

    #[test]
    fn test_state_is_firing_inside_callback() {
        let registry = Arc::new(Mutex::new(TimerRegistry::new(4)));
        let counter = TickCounter::new();
        let dispatcher = Arc::new(Dispatcher::new());
        let observed = Arc::new(Mutex::new(None));

        let watcher = dispatcher.clone();
        let out = observed.clone();
        periodic(
            &registry,
            1,
            Arc::new(move |_tick: u64| *out.lock() = Some(watcher.state())),
        );

        dispatcher.run_tick(&registry, &counter).unwrap();
        assert_eq!(*observed.lock(), Some(DispatchState::Firing));
        assert_eq!(dispatcher.state(), DispatchState::Idle);
    }

    #[test]
    fn test_callback_unregistering_later_entry_skips_it() {
        let registry = Arc::new(Mutex::new(TimerRegistry::new(4)));
        let counter = TickCounter::new();
        let dispatcher = Dispatcher::new();

        let victim = TimerHandle::new(1);
        let reg = registry.clone();
        periodic(
            &registry,
            1,
            Arc::new(move |_tick: u64| {
                let _ = reg.lock().unregister(victim);
            }),
        );
        periodic(&registry, 1, Arc::new(|_tick: u64| {}));

        let report = dispatcher.run_tick(&registry, &counter).unwrap();
        assert_eq!(report.fired, vec![TimerHandle::new(0)]);
        assert_eq!(report.skipped, vec![victim]);
        assert_eq!(registry.lock().len(), 1);
    }

    #[test]
    fn test_callback_registering_does_not_fire_in_same_pass() {
        let registry = Arc::new(Mutex::new(TimerRegistry::new(4)));
        let counter = TickCounter::new();
        let dispatcher = Dispatcher::new();

        let reg = registry.clone();
        let handle = periodic(
            &registry,
            1,
            Arc::new(move |tick: u64| {
                let mut reg = reg.lock();
                if reg.len() == 1 {
                    let added = reg.register(Arc::new(|_tick: u64| {}), tick).unwrap();
                    reg.set_period(added, TimerPeriod::from_ticks(1), tick).unwrap();
                }
            }),
        );

        let report = dispatcher.run_tick(&registry, &counter).unwrap();
        assert_eq!(report.fired, vec![handle]);
        let report = dispatcher.run_tick(&registry, &counter).unwrap();
        assert_eq!(report.fired, vec![TimerHandle::new(0), TimerHandle::new(1)]);
    }

    #[test]
    fn test_callback_cannot_drive_the_clock() {
        let registry = Arc::new(Mutex::new(TimerRegistry::new(4)));
        let counter = Arc::new(TickCounter::new());
        let dispatcher = Arc::new(Dispatcher::new());
        let nested = Arc::new(Mutex::new(None));

        let (reg, cnt, disp, out) = (
            registry.clone(),
            counter.clone(),
            dispatcher.clone(),
            nested.clone(),
        );
        periodic(
            &registry,
            1,
            Arc::new(move |_tick: u64| *out.lock() = Some(disp.run_tick(&reg, &cnt).map(|r| r.tick))),
        );

        let report = dispatcher.run_tick(&registry, &counter).unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(*nested.lock(), Some(Err(DispatchError::Busy)));
        assert_eq!(counter.current(), 1);
        assert_eq!(dispatcher.passes(), 1);
        assert_eq!(dispatcher.state(), DispatchState::Idle);

        assert_eq!(dispatcher.run_tick(&registry, &counter).unwrap().tick, 2);
    }

    #[test]
    fn test_one_shot_removed_after_firing() {
        let registry = Mutex::new(TimerRegistry::new(4));
        let counter = TickCounter::new();
        let dispatcher = Dispatcher::new();
        registry
            .lock()
            .register_one_shot(Arc::new(|_tick: u64| {}), 2, 0)
            .unwrap();

        assert!(dispatcher.run_tick(&registry, &counter).unwrap().fired.is_empty());
        assert_eq!(dispatcher.run_tick(&registry, &counter).unwrap().fired_count(), 1);
        assert!(registry.lock().is_empty());
    }
}
