//! Timer registration, dispatch and sleep

use core_types::{TimerHandle, TimerPeriod};
use runtime_api::{RuntimeApi, RuntimeError, TimerCallback, TICK_HZ};
use sim_runtime::dispatch::DispatchError;
use sim_runtime::sleep::{SleepCanceller, SleepOutcome};
use sim_runtime::test_utils::{wait_until, RecordingCallback};
use sim_runtime::tick_source::{HostClockDevice, SimTimerDevice, TickSource, TickThread};
use sim_runtime::Runtime;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);

fn periodic(runtime: &Runtime, period: u16) -> (TimerHandle, Arc<RecordingCallback>) {
    let recorder = RecordingCallback::new();
    let handle = runtime.register_timer_cb(recorder.clone()).unwrap();
    runtime
        .set_timer_period(handle, TimerPeriod::from_ticks(period))
        .unwrap();
    (handle, recorder)
}

#[test]
fn test_one_hz_timer_fires_once_per_second() {
    let runtime = Runtime::new();
    let (_, recorder) = periodic(&runtime, 8192);

    runtime.advance_ticks(TICK_HZ - 1).unwrap();
    assert_eq!(recorder.count(), 0);
    runtime.advance_ticks(1).unwrap();
    assert_eq!(recorder.ticks(), vec![8192]);

    runtime.advance_ticks(3 * TICK_HZ).unwrap();
    assert_eq!(recorder.ticks(), vec![8192, 16384, 24576, 32768]);
}

#[test]
fn test_accumulated_schedule_has_no_drift() {
    let runtime = Runtime::new();
    runtime.advance_ticks(5).unwrap();
    let (_, recorder) = periodic(&runtime, 3);

    runtime.advance_ticks(300).unwrap();
    let ticks = recorder.ticks();
    assert_eq!(ticks.len(), 100);
    let first = ticks[0];
    let last = ticks[ticks.len() - 1];
    assert_eq!(last - first, (ticks.len() as u64 - 1) * 3);
    assert!(ticks.windows(2).all(|w| w[1] - w[0] == 3));
}

#[test]
fn test_timer_period_round_trip() {
    let runtime = Runtime::new();
    let handle = runtime.register_timer_cb(RecordingCallback::new()).unwrap();
    assert_eq!(runtime.timer_period(handle).unwrap(), TimerPeriod::DISABLED);

    for period in [1u16, 100, 8192, u16::MAX] {
        runtime
            .set_timer_period(handle, TimerPeriod::from_ticks(period))
            .unwrap();
        assert_eq!(runtime.timer_period(handle).unwrap().ticks(), period);
    }
}

#[test]
fn test_disabled_timer_never_fires() {
    let runtime = Runtime::new();
    let recorder = RecordingCallback::new();
    runtime.register_timer_cb(recorder.clone()).unwrap();
    runtime.advance_ticks(1000).unwrap();
    assert_eq!(recorder.count(), 0);
}

#[test]
fn test_period_change_resets_phase() {
    let runtime = Runtime::new();
    let (handle, recorder) = periodic(&runtime, 10);
    runtime.advance_ticks(7).unwrap();
    runtime
        .set_timer_period(handle, TimerPeriod::from_ticks(10))
        .unwrap();
    runtime.advance_ticks(10).unwrap();
    assert_eq!(recorder.ticks(), vec![17]);
}

#[test]
fn test_simultaneous_timers_fire_in_handle_order() {
    let runtime = Runtime::new();
    let order = Arc::new(spin::Mutex::new(Vec::new()));
    for id in 0..4u16 {
        let sink = order.clone();
        let handle = runtime
            .register_timer_cb(Arc::new(move |_tick: u64| sink.lock().push(id)))
            .unwrap();
        runtime
            .set_timer_period(handle, TimerPeriod::from_ticks(5))
            .unwrap();
    }

    let report = (0..5).map(|_| runtime.tick().unwrap()).last().unwrap();
    assert_eq!(report.tick, 5);
    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    assert_eq!(
        report.fired,
        (0..4).map(TimerHandle::new).collect::<Vec<_>>()
    );
}

#[test]
fn test_unknown_handle() {
    let runtime = Runtime::new();
    let ghost = TimerHandle::new(42);
    assert_eq!(runtime.timer_period(ghost), Err(RuntimeError::BadHandle(ghost)));
    assert_eq!(
        runtime.set_timer_period(ghost, TimerPeriod::from_ticks(1)),
        Err(RuntimeError::BadHandle(ghost))
    );
}

struct Reentrant {
    runtime: Weak<Runtime>,
    spawned: AtomicUsize,
}

impl TimerCallback for Reentrant {
    fn on_tick(&self, _tick: u64) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        if self.spawned.fetch_add(1, Ordering::SeqCst) == 0 {
            let child = runtime.register_timer_cb(RecordingCallback::new()).unwrap();
            runtime
                .set_timer_period(child, TimerPeriod::from_ticks(1))
                .unwrap();
        }
        let me = TimerHandle::new(0);
        let period = runtime.timer_period(me).unwrap();
        runtime
            .set_timer_period(me, TimerPeriod::from_ticks(period.ticks() * 2))
            .unwrap();
    }
}

#[test]
fn test_callbacks_may_reenter_the_registry() {
    let runtime = Arc::new(Runtime::new());
    let callback = Arc::new(Reentrant {
        runtime: Arc::downgrade(&runtime),
        spawned: AtomicUsize::new(0),
    });
    let handle = runtime.register_timer_cb(callback.clone()).unwrap();
    runtime
        .set_timer_period(handle, TimerPeriod::from_ticks(1))
        .unwrap();

    runtime.tick().unwrap();
    assert_eq!(runtime.timer_count(), 2);
    assert_eq!(runtime.timer_period(handle).unwrap().ticks(), 2);

    runtime.advance_ticks(2).unwrap();
    assert_eq!(callback.spawned.load(Ordering::SeqCst), 2);
    assert_eq!(runtime.timer_period(handle).unwrap().ticks(), 4);
}

#[test]
fn test_sleep_zero_registers_nothing() {
    let runtime = Runtime::new();
    runtime.register_timer_cb(RecordingCallback::new()).unwrap();
    let before = runtime.timer_count();

    runtime.sleep(0.0).unwrap();
    runtime.sleep(1e-12).unwrap();
    assert_eq!(runtime.timer_count(), before);
}

#[test]
fn test_sleep_rejects_negative() {
    let runtime = Runtime::new();
    assert!(matches!(
        runtime.sleep(-1.0),
        Err(RuntimeError::InvalidArgument(_))
    ));
    assert!(matches!(
        runtime.sleep(f64::INFINITY),
        Err(RuntimeError::InvalidArgument(_))
    ));
}

#[test]
fn test_sleep_blocks_until_quanta_elapse() {
    let runtime = Arc::new(Runtime::new());
    let rt = runtime.clone();
    let sleeper = thread::spawn(move || rt.sleep(0.5));

    wait_until(WAIT, || runtime.timer_count() == 1);
    runtime.advance_ticks(4095).unwrap();
    assert!(!sleeper.is_finished());

    runtime.advance_ticks(1).unwrap();
    sleeper.join().unwrap().unwrap();
    assert_eq!(runtime.timer_count(), 0);
}

#[test]
fn test_sleep_rounds_up_to_whole_quanta() {
    let runtime = Arc::new(Runtime::new());
    let rt = runtime.clone();
    // 1.5 quanta
    let sleeper = thread::spawn(move || rt.sleep(1.5 / 8192.0));

    wait_until(WAIT, || runtime.timer_count() == 1);
    runtime.advance_ticks(1).unwrap();
    assert!(!sleeper.is_finished());
    runtime.advance_ticks(1).unwrap();
    sleeper.join().unwrap().unwrap();
}

#[test]
fn test_cancelled_sleep_leaves_no_timer() {
    let runtime = Arc::new(Runtime::new());
    let recorder = RecordingCallback::new();
    let user = runtime.register_timer_cb(recorder.clone()).unwrap();
    runtime
        .set_timer_period(user, TimerPeriod::from_ticks(1))
        .unwrap();

    let canceller = SleepCanceller::new();
    let rt = runtime.clone();
    let c = canceller.clone();
    let sleeper = thread::spawn(move || rt.sleep_cancellable(1.0, &c));

    wait_until(WAIT, || runtime.timer_count() == 2);
    runtime.advance_ticks(10).unwrap();
    canceller.cancel();
    assert_eq!(sleeper.join().unwrap(), Ok(SleepOutcome::Cancelled));

    assert_eq!(runtime.timer_count(), 1);
    runtime.advance_ticks(2 * TICK_HZ).unwrap();
    assert_eq!(runtime.timer_count(), 1);
    assert_eq!(recorder.count() as u64, 10 + 2 * TICK_HZ);
}

#[test]
fn test_sleep_timer_unreachable_through_handle_calls() {
    let runtime = Arc::new(Runtime::new());
    let rt = runtime.clone();
    let sleeper = thread::spawn(move || rt.sleep(10.0));
    wait_until(WAIT, || runtime.timer_count() == 1);

    let internal = TimerHandle::new(0);
    assert_eq!(
        runtime.timer_period(internal),
        Err(RuntimeError::BadHandle(internal))
    );
    assert_eq!(
        runtime.set_timer_period(internal, TimerPeriod::DISABLED),
        Err(RuntimeError::BadHandle(internal))
    );
    assert_eq!(
        runtime.unregister_timer(internal),
        Err(RuntimeError::BadHandle(internal))
    );

    let (user, _) = periodic(&runtime, 1);
    assert_eq!(user, TimerHandle::new(1));

    runtime.advance_ticks(10 * TICK_HZ).unwrap();
    sleeper.join().unwrap().unwrap();
    assert_eq!(runtime.timer_count(), 1);
}

#[test]
fn test_concurrent_sleepers_wake_in_deadline_order() {
    let runtime = Arc::new(Runtime::new());
    let woke = Arc::new(spin::Mutex::new(Vec::new()));

    let sleepers: Vec<_> = [3.0f64, 1.0, 2.0]
        .into_iter()
        .map(|secs| {
            let rt = runtime.clone();
            let woke = woke.clone();
            thread::spawn(move || {
                rt.sleep(secs).unwrap();
                woke.lock().push((secs as u64, rt.ticks()));
            })
        })
        .collect();

    wait_until(WAIT, || runtime.timer_count() == 3);
    for second in 1..=3u64 {
        runtime.advance_ticks(TICK_HZ).unwrap();
        wait_until(WAIT, || woke.lock().len() as u64 == second);
    }
    for sleeper in sleepers {
        sleeper.join().unwrap();
    }

    let order: Vec<u64> = woke.lock().iter().map(|(secs, _)| *secs).collect();
    assert_eq!(order, vec![1, 2, 3]);
    assert_eq!(runtime.timer_count(), 0);
}

struct NestedTick {
    runtime: Weak<Runtime>,
    results: spin::Mutex<Vec<Result<u64, DispatchError>>>,
}

impl TimerCallback for NestedTick {
    fn on_tick(&self, _tick: u64) {
        if let Some(runtime) = self.runtime.upgrade() {
            self.results.lock().push(runtime.tick().map(|report| report.tick));
        }
    }
}

#[test]
fn test_callback_cannot_advance_the_clock() {
    let runtime = Arc::new(Runtime::new());
    let callback = Arc::new(NestedTick {
        runtime: Arc::downgrade(&runtime),
        results: spin::Mutex::new(Vec::new()),
    });
    let handle = runtime.register_timer_cb(callback.clone()).unwrap();
    runtime
        .set_timer_period(handle, TimerPeriod::from_ticks(2))
        .unwrap();

    assert_eq!(runtime.advance_ticks(4).unwrap(), 2);
    assert_eq!(runtime.ticks(), 4);
    assert_eq!(
        *callback.results.lock(),
        vec![Err(DispatchError::Busy), Err(DispatchError::Busy)]
    );
}

#[test]
fn test_tick_source_drives_dispatch() {
    let runtime = Runtime::new();
    let (_, recorder) = periodic(&runtime, 100);
    let mut source = TickSource::new(SimTimerDevice::new());

    source.device_mut().advance_ticks(250);
    assert_eq!(source.pump(&runtime), 250);
    assert_eq!(recorder.ticks(), vec![100, 200]);
}

#[test]
fn test_sleep_with_real_time_tick_thread() {
    let runtime = Arc::new(Runtime::new());
    let driver = TickThread::spawn(runtime.clone(), HostClockDevice::new()).unwrap();

    runtime.sleep(0.01).unwrap();
    assert!(runtime.ticks() >= 82);
    assert!(driver.stop() >= 82);
    assert_eq!(runtime.timer_count(), 0);
}
