//! Timer registry
//!
//! Live timer registrations keyed by handle. The registry itself never
//! invokes callbacks: [`TimerRegistry::collect_due`] hands the dispatcher a
//! snapshot of due entries and reschedules them, and the dispatcher runs
//! the callbacks after releasing the lock.

use core_types::{TimerHandle, TimerPeriod};
use log::{debug, trace};
use runtime_api::{RuntimeError, RuntimeResult, TimerCallback};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How an entry behaves after it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Rescheduled by its period after every firing
    Periodic,
    /// Fires once and is then removed
    OneShot,
}

struct TimerEntry {
    callback: Arc<dyn TimerCallback>,
    /// Zero means disabled
    period: u64,
    next_fire: u64,
    kind: TimerKind,
    /// Cleared on a one-shot entry once it has been handed to the dispatcher
    armed: bool,
    /// Distinguishes this registration from later ones reusing the handle
    serial: u64,
}

impl TimerEntry {
    fn is_due(&self, now: u64) -> bool {
        self.armed && self.period != 0 && self.next_fire <= now
    }
}

/// One due entry, as captured under the registry lock
#[derive(Clone)]
pub struct DueTimer {
    pub handle: TimerHandle,
    pub serial: u64,
    pub kind: TimerKind,
    pub callback: Arc<dyn TimerCallback>,
    /// Tick the entry was due at
    pub scheduled: u64,
}

/// Registered timers
pub struct TimerRegistry {
    entries: BTreeMap<TimerHandle, TimerEntry>,
    max_timers: u32,
    next_serial: u64,
}

impl TimerRegistry {
    pub fn new(max_timers: u32) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_timers,
            next_serial: 1,
        }
    }

    fn lowest_free(&self) -> RuntimeResult<TimerHandle> {
        let mut candidate: u32 = 0;
        for handle in self.entries.keys() {
            if u32::from(handle.as_u16()) != candidate {
                break;
            }
            candidate += 1;
        }
        if candidate >= self.max_timers {
            return Err(RuntimeError::ResourceExhausted(format!(
                "all {} timers in use",
                self.max_timers
            )));
        }
        u16::try_from(candidate)
            .map(TimerHandle::new)
            .map_err(|_| RuntimeError::ResourceExhausted("timer handle space".to_string()))
    }

    fn insert(
        &mut self,
        callback: Arc<dyn TimerCallback>,
        period: u64,
        kind: TimerKind,
        now: u64,
    ) -> RuntimeResult<(TimerHandle, u64)> {
        let handle = self.lowest_free()?;
        let serial = self.next_serial;
        self.next_serial += 1;
        self.entries.insert(
            handle,
            TimerEntry {
                callback,
                period,
                next_fire: now.saturating_add(period),
                kind,
                armed: true,
                serial,
            },
        );
        Ok((handle, serial))
    }

    /// Adds a periodic timer, disabled until a period is set
    pub fn register(
        &mut self,
        callback: Arc<dyn TimerCallback>,
        now: u64,
    ) -> RuntimeResult<TimerHandle> {
        let (handle, serial) = self.insert(callback, 0, TimerKind::Periodic, now)?;
        debug!("{}: registered (serial {})", handle, serial);
        Ok(handle)
    }

    /// Adds a timer that fires once, `delay` quanta from `now`
    ///
    /// Returns the handle and the registration serial.
    pub fn register_one_shot(
        &mut self,
        callback: Arc<dyn TimerCallback>,
        delay: u64,
        now: u64,
    ) -> RuntimeResult<(TimerHandle, u64)> {
        if delay == 0 {
            return Err(RuntimeError::InvalidArgument(
                "one-shot delay must be at least one quantum".to_string(),
            ));
        }
        let (handle, serial) = self.insert(callback, delay, TimerKind::OneShot, now)?;
        debug!(
            "{}: one-shot registered, fires at tick {} (serial {})",
            handle,
            now.saturating_add(delay),
            serial
        );
        Ok((handle, serial))
    }

    /// Periodic entry behind `handle`
    ///
    /// One-shot entries belong to whoever armed them and are invisible to
    /// the handle-based calls.
    fn periodic(&self, handle: TimerHandle) -> RuntimeResult<&TimerEntry> {
        self.entries
            .get(&handle)
            .filter(|entry| entry.kind == TimerKind::Periodic)
            .ok_or(RuntimeError::BadHandle(handle))
    }

    pub fn period(&self, handle: TimerHandle) -> RuntimeResult<TimerPeriod> {
        self.periodic(handle)
            .map(|entry| TimerPeriod::saturating_from(entry.period))
    }

    /// Sets the period and restarts the phase from `now`
    pub fn set_period(
        &mut self,
        handle: TimerHandle,
        period: TimerPeriod,
        now: u64,
    ) -> RuntimeResult<()> {
        let entry = self
            .entries
            .get_mut(&handle)
            .filter(|entry| entry.kind == TimerKind::Periodic)
            .ok_or(RuntimeError::BadHandle(handle))?;
        entry.period = u64::from(period.ticks());
        entry.next_fire = now.saturating_add(entry.period);
        debug!(
            "{}: period set to {}, next fire at tick {}",
            handle, period, entry.next_fire
        );
        Ok(())
    }

    /// Removes a live periodic entry
    pub fn unregister(&mut self, handle: TimerHandle) -> RuntimeResult<()> {
        let serial = self.periodic(handle)?.serial;
        self.entries.remove(&handle);
        debug!("{}: unregistered (serial {})", handle, serial);
        Ok(())
    }

    /// Removes the entry only if it is still the registration `serial`
    ///
    /// Returns false if the registration is already gone.
    pub fn unregister_registration(&mut self, handle: TimerHandle, serial: u64) -> bool {
        if !self.contains_registration(handle, serial) {
            return false;
        }
        self.entries.remove(&handle);
        trace!("{}: registration {} removed", handle, serial);
        true
    }

    pub fn contains_registration(&self, handle: TimerHandle, serial: u64) -> bool {
        self.entries
            .get(&handle)
            .map(|entry| entry.serial == serial)
            .unwrap_or(false)
    }

    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    /// Number of live registrations, internal one-shots included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest tick at which an armed, enabled entry is due
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries
            .values()
            .filter(|entry| entry.armed && entry.period != 0)
            .map(|entry| entry.next_fire)
            .min()
    }

    /// Snapshots every entry due at `now`, in ascending handle order
    ///
    /// Periodic entries are rescheduled by accumulation: `next_fire` moves
    /// forward by whole periods until it is in the future. An entry that
    /// missed several periods still fires once per pass. One-shot entries
    /// are disarmed; the dispatcher removes them after their callback.
    pub fn collect_due(&mut self, now: u64) -> Vec<DueTimer> {
        let mut due = Vec::new();
        for (handle, entry) in self.entries.iter_mut() {
            if !entry.is_due(now) {
                continue;
            }
            let scheduled = entry.next_fire;
            match entry.kind {
                TimerKind::Periodic => {
                    while entry.next_fire <= now {
                        entry.next_fire = entry.next_fire.saturating_add(entry.period);
                    }
                }
                TimerKind::OneShot => entry.armed = false,
            }
            due.push(DueTimer {
                handle: *handle,
                serial: entry.serial,
                kind: entry.kind,
                callback: entry.callback.clone(),
                scheduled,
            });
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Arc<dyn TimerCallback> {
        Arc::new(|_tick: u64| {})
    }

    fn handles(due: &[DueTimer]) -> Vec<u16> {
        due.iter().map(|d| d.handle.as_u16()).collect()
    }

    #[test]
    fn test_register_defaults_to_disabled() {
        let mut registry = TimerRegistry::new(4);
        let handle = registry.register(noop(), 0).unwrap();
        assert_eq!(handle, TimerHandle::new(0));
        assert_eq!(registry.period(handle).unwrap(), TimerPeriod::DISABLED);
        assert!(registry.collect_due(1_000_000).is_empty());
        assert_eq!(registry.next_deadline(), None);
    }

    #[test]
    fn test_lowest_free_handle() {
        let mut registry = TimerRegistry::new(8);
        let a = registry.register(noop(), 0).unwrap();
        let b = registry.register(noop(), 0).unwrap();
        let c = registry.register(noop(), 0).unwrap();
        assert_eq!((a.as_u16(), b.as_u16(), c.as_u16()), (0, 1, 2));

        registry.unregister(b).unwrap();
        assert_eq!(registry.register(noop(), 0).unwrap(), b);
        assert_eq!(registry.register(noop(), 0).unwrap(), TimerHandle::new(3));
    }

    #[test]
    fn test_exhaustion() {
        let mut registry = TimerRegistry::new(2);
        registry.register(noop(), 0).unwrap();
        registry.register(noop(), 0).unwrap();
        assert!(matches!(
            registry.register(noop(), 0),
            Err(RuntimeError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn test_bad_handle() {
        let mut registry = TimerRegistry::new(2);
        let ghost = TimerHandle::new(1);
        assert_eq!(registry.period(ghost), Err(RuntimeError::BadHandle(ghost)));
        assert_eq!(
            registry.set_period(ghost, TimerPeriod::from_ticks(1), 0),
            Err(RuntimeError::BadHandle(ghost))
        );
        assert_eq!(registry.unregister(ghost), Err(RuntimeError::BadHandle(ghost)));
    }

    #[test]
    fn test_set_period_resets_phase() {
        let mut registry = TimerRegistry::new(2);
        let handle = registry.register(noop(), 0).unwrap();
        registry
            .set_period(handle, TimerPeriod::from_ticks(10), 0)
            .unwrap();
        assert_eq!(registry.next_deadline(), Some(10));

        registry
            .set_period(handle, TimerPeriod::from_ticks(10), 7)
            .unwrap();
        assert_eq!(registry.next_deadline(), Some(17));
        assert_eq!(registry.period(handle).unwrap().ticks(), 10);
    }

    #[test]
    fn test_collect_due_accumulates() {
        let mut registry = TimerRegistry::new(2);
        let handle = registry.register(noop(), 0).unwrap();
        registry.set_period(handle, TimerPeriod::from_ticks(4), 0).unwrap();

        assert!(registry.collect_due(3).is_empty());
        let due = registry.collect_due(4);
        assert_eq!(handles(&due), vec![0]);
        assert_eq!(due[0].scheduled, 4);
        assert_eq!(registry.next_deadline(), Some(8));

        // Late pass: fires once, schedule stays on the original grid
        let due = registry.collect_due(13);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].scheduled, 8);
        assert_eq!(registry.next_deadline(), Some(16));
    }

    #[test]
    fn test_collect_due_ascending_handles() {
        let mut registry = TimerRegistry::new(4);
        for _ in 0..3 {
            let handle = registry.register(noop(), 0).unwrap();
            registry.set_period(handle, TimerPeriod::from_ticks(2), 0).unwrap();
        }
        assert_eq!(handles(&registry.collect_due(2)), vec![0, 1, 2]);
    }

    #[test]
    fn test_one_shot_disarms() {
        let mut registry = TimerRegistry::new(2);
        let (handle, serial) = registry.register_one_shot(noop(), 3, 10).unwrap();
        assert_eq!(registry.next_deadline(), Some(13));

        let due = registry.collect_due(13);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].kind, TimerKind::OneShot);
        assert!(registry.collect_due(100).is_empty());

        assert!(registry.unregister_registration(handle, serial));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_one_shot_rejects_zero_delay() {
        let mut registry = TimerRegistry::new(2);
        assert!(matches!(
            registry.register_one_shot(noop(), 0, 0),
            Err(RuntimeError::InvalidArgument(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_serial_guards_reused_handle() {
        let mut registry = TimerRegistry::new(2);
        let (handle, old_serial) = registry.register_one_shot(noop(), 5, 0).unwrap();
        assert!(registry.unregister_registration(handle, old_serial));

        let reused = registry.register(noop(), 0).unwrap();
        assert_eq!(reused, handle);
        assert!(!registry.contains_registration(handle, old_serial));
        assert!(!registry.unregister_registration(handle, old_serial));
        assert!(registry.contains(handle));
    }

    #[test]
    fn test_one_shot_hidden_from_handle_calls() {
        let mut registry = TimerRegistry::new(2);
        let (handle, serial) = registry.register_one_shot(noop(), 81_920, 0).unwrap();

        assert_eq!(registry.period(handle), Err(RuntimeError::BadHandle(handle)));
        assert_eq!(
            registry.set_period(handle, TimerPeriod::DISABLED, 0),
            Err(RuntimeError::BadHandle(handle))
        );
        assert_eq!(registry.unregister(handle), Err(RuntimeError::BadHandle(handle)));

        assert!(registry.contains_registration(handle, serial));
        assert_eq!(registry.next_deadline(), Some(81_920));
        assert_eq!(registry.collect_due(81_920).len(), 1);
    }
}
