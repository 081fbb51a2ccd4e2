//! Property tests for five of the seven quantified invariants.
//!
//! These drive the public API only (no internal list introspection is
//! available from an integration test crate), so each property is phrased
//! in terms of what a caller can actually observe: which alarms the mock
//! backend ends up holding, whether a timer reports itself armed, and the
//! order in which callbacks fire. The remaining two — list ordering and the
//! offset-sum-to-fire-time identity — need the crate-private `offset`/`next`
//! fields to check directly, so they live as `proptest!` properties in
//! `src/device.rs`'s own `#[cfg(test)] mod tests` instead.

use core::cell::RefCell;

use proptest::collection::vec;
use proptest::prelude::*;

use ztimer_core::mock::MockBackend;
use ztimer_core::{Device, Timer, TimerClient, DEFAULT_GUARD};

struct RecordingClient<'a> {
    id: u32,
    log: &'a RefCell<Vec<u32>>,
}

impl TimerClient for RecordingClient<'_> {
    fn fired(&self) {
        self.log.borrow_mut().push(self.id);
    }
}

proptest! {
    /// "For any armed timer with delay d <= 0xFFFF - GUARD, the callback
    /// fires exactly once, after between d and d + epsilon counts."
    #[test]
    fn delay_within_guard_fires_once_at_the_requested_target(
        delay in 0u32..(0xFFFF - DEFAULT_GUARD),
    ) {
        let backend = MockBackend::new(0);
        let device: Device<MockBackend> = Device::new(backend);
        let log = RefCell::new(Vec::new());
        let client = RecordingClient { id: 1, log: &log };
        let timer = Timer::new();
        timer.set_client(&client);

        device.arm(&timer, delay);
        let target = device.backend().alarm();
        prop_assert_eq!(target, Some(delay & 0xFFFF));
        prop_assert!(!device.backend().overflow_alarm());

        device.backend().set_now(target.unwrap());
        device.on_alarm();

        prop_assert_eq!(log.borrow().as_slice(), &[1]);
        prop_assert!(!timer.is_armed());
    }

    /// "Arm-then-disarm before fire time -> callback never fires."
    #[test]
    fn arm_then_disarm_before_fire_never_fires(
        now in 0u32..0x9000,
        delay in 1u32..0x4000,
        disarm_delay in 0u32..0x4000,
    ) {
        let backend = MockBackend::new(now);
        let device: Device<MockBackend> = Device::new(backend);
        let log = RefCell::new(Vec::new());
        let client = RecordingClient { id: 1, log: &log };
        let timer = Timer::new();
        timer.set_client(&client);

        device.arm(&timer, delay);

        let disarm_at = now.wrapping_add(disarm_delay % (delay + 1)) & 0xFFFF;
        device.backend().set_now(disarm_at);
        device.disarm(&timer);

        prop_assert!(!timer.is_armed());
        prop_assert_eq!(device.backend().alarm(), None);
        prop_assert!(!device.backend().overflow_alarm());

        let fire_time = now.wrapping_add(delay) & 0xFFFF;
        device.backend().set_now(fire_time);
        device.on_alarm();
        device.on_overflow();

        prop_assert!(log.borrow().is_empty());
    }

    /// "Re-arm of an armed timer behaves as disarm-then-arm (callback
    /// fires once, at the new time)."
    #[test]
    fn rearming_an_armed_timer_behaves_as_disarm_then_arm(
        now in 0u32..0x1000,
        first in 1u32..0x4000,
        second in 1u32..0x4000,
    ) {
        let backend = MockBackend::new(now);
        let device: Device<MockBackend> = Device::new(backend);
        let log = RefCell::new(Vec::new());
        let client = RecordingClient { id: 1, log: &log };
        let timer = Timer::new();
        timer.set_client(&client);

        device.arm(&timer, first);
        device.arm(&timer, second);

        let target = now.wrapping_add(second) & 0xFFFF;
        prop_assert_eq!(device.backend().alarm(), Some(target));

        device.backend().set_now(target);
        device.on_alarm();

        prop_assert_eq!(log.borrow().as_slice(), &[1]);
        prop_assert!(!timer.is_armed());
    }

    /// "Callbacks armed for the same target fire in insertion order."
    #[test]
    fn equal_targets_fire_in_insertion_order(
        now in 0u32..0x1000,
        delay in 1u32..0x4000,
    ) {
        let backend = MockBackend::new(now);
        let device: Device<MockBackend> = Device::new(backend);
        let log = RefCell::new(Vec::new());
        let a_client = RecordingClient { id: 1, log: &log };
        let b_client = RecordingClient { id: 2, log: &log };
        let c_client = RecordingClient { id: 3, log: &log };
        let a = Timer::new();
        let b = Timer::new();
        let c = Timer::new();
        a.set_client(&a_client);
        b.set_client(&b_client);
        c.set_client(&c_client);

        device.arm(&a, delay);
        device.arm(&b, delay);
        device.arm(&c, delay);

        device.backend().set_now(now.wrapping_add(delay) & 0xFFFF);
        device.on_alarm();

        prop_assert_eq!(log.borrow().as_slice(), &[1, 2, 3]);
    }

    /// "At most one of {real alarm, overflow alarm} is outstanding; both
    /// are off iff the list is empty." Exercised over a batch of short
    /// delays (real-alarm branch).
    #[test]
    fn at_most_one_alarm_outstanding_short_delays(
        now in 0u32..0x1000,
        delays in vec(1u32..0x4000, 0..5),
    ) {
        let backend = MockBackend::new(now);
        let device: Device<MockBackend> = Device::new(backend);
        let log = RefCell::new(Vec::new());
        let clients: Vec<RecordingClient> = (0..delays.len())
            .map(|i| RecordingClient { id: i as u32, log: &log })
            .collect();
        let timers: Vec<Timer> = (0..delays.len()).map(|_| Timer::new()).collect();
        for (timer, client) in timers.iter().zip(clients.iter()) {
            timer.set_client(client);
        }
        for (timer, delay) in timers.iter().zip(delays.iter()) {
            device.arm(timer, *delay);
        }

        let real = device.backend().alarm().is_some();
        let overflow = device.backend().overflow_alarm();
        prop_assert!(!(real && overflow));

        let any_armed = timers.iter().any(|t| t.is_armed());
        prop_assert_eq!(real || overflow, any_armed);
    }

    /// Same mutual-exclusion invariant, but over delays that straddle the
    /// overflow boundary and so exercise the overflow-alarm branch.
    #[test]
    fn at_most_one_alarm_outstanding_crossing_overflow(
        delay in 0x1000u32..0x8000,
    ) {
        let backend = MockBackend::new(0xFF00);
        let device: Device<MockBackend> = Device::new(backend);
        let timer = Timer::new();
        struct NoopClient;
        impl TimerClient for NoopClient {
            fn fired(&self) {}
        }
        let client = NoopClient;
        timer.set_client(&client);

        device.arm(&timer, delay);

        let real = device.backend().alarm().is_some();
        let overflow = device.backend().overflow_alarm();
        prop_assert!(!(real && overflow));
        prop_assert!(real || overflow);
    }
}
