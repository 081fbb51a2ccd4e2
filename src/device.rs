//! The scheduler core: a device bound to one backend, and the arm / disarm /
//! dispatch algorithms that reconcile the pending-timer list against it.

use core::cell::Cell;

use crate::backend::Backend;
use crate::timer::Timer;

/// Default value for the [`Device`] `GUARD` const parameter (§4.5, §9).
///
/// A board integration that has measured its backend's alarm-programming
/// latency may pick a tighter or looser value per board by supplying its
/// own `GUARD` when naming the `Device` type.
pub const DEFAULT_GUARD: u32 = 20;

/// A generous bound on pending-list length used purely to turn an
/// accidental cycle in `next` links into a debug-time panic instead of a
/// hang. Not a limit on how many timers a `Device` may actually hold.
#[cfg(debug_assertions)]
const MAX_INVARIANT_WALK: u32 = 100_000;

macro_rules! log_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::trace!($($arg)*);
    };
}

macro_rules! log_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "defmt")]
        defmt::debug!($($arg)*);
    };
}

/// A timer scheduler bound to one [`Backend`].
///
/// `Device` owns the head of a singly-linked list of borrowed, caller-owned
/// [`Timer`]s (the list is empty on construction) and a `reference` count:
/// the backend value from which the head entry's `offset` is measured
/// (§3). `GUARD` is the compile-time alarm-programming margin used by the
/// backend rearm policy (§4.5); see [`DEFAULT_GUARD`].
///
/// Every public method brackets its work in a [`critical_section`], which
/// is this crate's rendering of "disable interrupts ... restore" (§5): the
/// critical section is the only synchronization primitive the core uses,
/// and it nests correctly with whatever interrupt-context callers this
/// `Device` is also driven from (e.g. [`Device::on_alarm`] running inside
/// an ISR while a lower-priority thread is inside [`Device::arm`] — on the
/// single core this crate targets, the hardware itself guarantees the ISR
/// preempts rather than races).
pub struct Device<'a, B: Backend, const GUARD: u32 = DEFAULT_GUARD> {
    backend: B,
    head: Cell<Option<&'a Timer<'a>>>,
    reference: Cell<u32>,
}

// Every field is only ever touched from inside a `critical_section`, which
// on this crate's single-core, non-SMP target (see the Non-goals) is
// sufficient to rule out data races — there is nothing else that could be
// concurrently executing the core's state machine (§5).
unsafe impl<B: Backend, const GUARD: u32> Sync for Device<'_, B, GUARD> {}

impl<'a, B: Backend, const GUARD: u32> Device<'a, B, GUARD> {
    /// Initializes a device against `backend` (§6 `device_init`).
    ///
    /// Cancels any alarm the backend may already have outstanding, and
    /// samples `backend.now()` as the initial `reference`. The pending list
    /// starts empty.
    pub fn new(backend: B) -> Self {
        backend.cancel_alarm();
        backend.cancel_overflow_alarm();
        let reference = backend.now();
        Self {
            backend,
            head: Cell::new(None),
            reference: Cell::new(reference),
        }
    }

    /// Returns the backend's free-running counter, unchanged (§6 `now`).
    pub fn now(&self) -> u32 {
        self.backend.now()
    }

    /// A reference to the bound backend, mainly useful for board glue that
    /// needs to reach backend-specific functionality this trait doesn't
    /// expose.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Arms `timer` to fire `val` backend counts from now (§4.3).
    ///
    /// Idempotent with respect to prior arming: if `timer` is already
    /// pending, it is first disarmed and then re-inserted at the new fire
    /// time, exactly as if the caller had called [`Device::disarm`] first
    /// (I6).
    pub fn arm(&self, timer: &'a Timer<'a>, val: u32) {
        critical_section::with(|_cs| {
            let n = self.backend.now();
            log_trace!("ztimer: arm now={} val={}", n, val);

            self.remove(timer);
            timer.offset.set(val);

            let elapsed = n.wrapping_sub(self.reference.get()) & 0xFFFF;
            self.advance_head(elapsed);
            self.insert(timer);

            let became_head = self
                .head
                .get()
                .is_some_and(|head| core::ptr::eq(head, timer));
            if became_head {
                self.rearm();
            }
        });

        #[cfg(debug_assertions)]
        self.debug_check_invariants();
    }

    /// Disarms `timer` if it is currently pending; otherwise does nothing
    /// (§4.4).
    pub fn disarm(&self, timer: &'a Timer<'a>) {
        critical_section::with(|_cs| {
            let n = self.backend.now();
            log_trace!("ztimer: disarm now={}", n);

            let elapsed = n.wrapping_sub(self.reference.get()) & 0xFFFF;
            self.advance_head(elapsed);
            self.remove(timer);
            self.rearm();
        });

        #[cfg(debug_assertions)]
        self.debug_check_invariants();
    }

    /// Called by board glue from the backend's alarm interrupt (§4.6).
    ///
    /// Runs the drain-and-dispatch loop and reprograms the backend. Must be
    /// called with the backend's interrupt already active (the method
    /// itself establishes the core's own critical section; it does not
    /// acknowledge or unmask the interrupt at the hardware level — that is
    /// the caller's responsibility).
    pub fn on_alarm(&self) {
        critical_section::with(|_cs| {
            log_trace!("ztimer: on_alarm");
            self.backend.cancel_alarm();
            self.backend.cancel_overflow_alarm();

            // The backend may not have delivered the interrupt at exactly
            // the programmed target (ISR latency, a higher-priority
            // handler running first): rebase the whole list against the
            // elapsed time since the last rebase, the same way arm/disarm
            // do, before collapsing any leftover slack on the head.
            let n = self.backend.now();
            let elapsed = n.wrapping_sub(self.reference.get()) & 0xFFFF;
            self.advance_head(elapsed);

            if let Some(head) = self.head.get() {
                head.offset.set(0);
            }

            self.dispatch_due();
            self.rearm();
        });

        #[cfg(debug_assertions)]
        self.debug_check_invariants();
    }

    /// Called by board glue from the backend's overflow interrupt (§4.7).
    pub fn on_overflow(&self) {
        critical_section::with(|_cs| {
            log_trace!("ztimer: on_overflow");
            let elapsed = 0x1_0000u32.wrapping_sub(self.reference.get() & 0xFFFF);
            self.advance_head(elapsed);

            self.dispatch_due();
            self.rearm();
        });

        #[cfg(debug_assertions)]
        self.debug_check_invariants();
    }

    /// Subtracts `elapsed` backend counts from the head's offset, cascading
    /// into later entries as needed, producing a contiguous prefix of
    /// zero-offset (due) entries. Performs no dispatch (§4.1).
    ///
    /// Also rebases `reference` forward by `elapsed`, preserving I3.
    fn advance_head(&self, elapsed: u32) {
        let mut remaining = elapsed;
        let mut cursor = self.head.get();

        while remaining > 0 {
            let Some(entry) = cursor else { break };
            let offset = entry.offset.get();

            if remaining <= offset {
                entry.offset.set(offset - remaining);
                remaining = 0;
            } else {
                remaining -= offset;
                entry.offset.set(0);

                cursor = entry.next.get();
                while let Some(next) = cursor {
                    if next.offset.get() != 0 {
                        break;
                    }
                    cursor = next.next.get();
                }
            }
        }

        self.reference.set(self.reference.get().wrapping_add(elapsed));
    }

    /// Splices `entry` into the sorted pending list by fire time (§4.1).
    ///
    /// `entry.offset` must already hold the delay relative to `reference`
    /// (i.e. its absolute fire time minus whatever has already elapsed);
    /// on return it has been rewritten relative to its new predecessor.
    fn insert(&self, entry: &'a Timer<'a>) {
        let mut delta_sum: u32 = 0;
        let mut prev: Option<&'a Timer<'a>> = None;
        let mut cursor = self.head.get();

        while let Some(node) = cursor {
            let node_offset = node.offset.get();
            if node_offset.wrapping_add(delta_sum) > entry.offset.get() {
                break;
            }
            delta_sum = delta_sum.wrapping_add(node_offset);
            prev = Some(node);
            cursor = node.next.get();
        }

        entry.next.set(cursor);
        entry.offset.set(entry.offset.get().wrapping_sub(delta_sum));

        if let Some(next) = cursor {
            next.offset.set(next.offset.get().wrapping_sub(entry.offset.get()));
        }

        match prev {
            Some(p) => p.next.set(Some(entry)),
            None => self.head.set(Some(entry)),
        }
        entry.armed.set(true);

        log_trace!("ztimer: insert offset={}", entry.offset.get());
    }

    /// Unlinks `entry` if it is present, folding its offset into its
    /// successor to preserve I1. Idempotent: returns `false` and does
    /// nothing if `entry` is not currently armed on this device (§4.1).
    fn remove(&self, entry: &'a Timer<'a>) -> bool {
        if !entry.armed.get() {
            return false;
        }

        let mut prev: Option<&'a Timer<'a>> = None;
        let mut cursor = self.head.get();

        while let Some(node) = cursor {
            if core::ptr::eq(node, entry) {
                let successor = node.next.get();
                match prev {
                    Some(p) => p.next.set(successor),
                    None => self.head.set(successor),
                }
                if let Some(next) = successor {
                    next.offset
                        .set(next.offset.get().wrapping_add(node.offset.get()));
                }
                entry.armed.set(false);
                entry.next.set(None);
                return true;
            }
            prev = Some(node);
            cursor = node.next.get();
        }

        // Not found: armed was stale (should not happen if invariants hold,
        // but `remove` stays idempotent rather than panicking — see §4.9).
        entry.armed.set(false);
        false
    }

    /// Unlinks and returns the head if its offset is already zero.
    fn pop_if_due(&self) -> Option<&'a Timer<'a>> {
        match self.head.get() {
            Some(head) if head.offset.get() == 0 => {
                self.head.set(head.next.get());
                head.armed.set(false);
                head.next.set(None);
                Some(head)
            }
            _ => None,
        }
    }

    /// Drains and invokes every currently-due entry (§4.6 step 3, §4.7).
    ///
    /// A callback may arm or disarm arbitrary timers, including itself;
    /// after the immediately-due prefix is exhausted, this resamples `now`
    /// to see whether the counts spent inside callbacks brought further
    /// entries due, and keeps draining until neither is true.
    fn dispatch_due(&self) {
        let mut checkpoint = self.backend.now();

        loop {
            let entry = match self.pop_if_due() {
                Some(entry) => entry,
                None => {
                    let now = self.backend.now();
                    let elapsed = now.wrapping_sub(checkpoint) & 0xFFFF;
                    checkpoint = now;
                    if elapsed == 0 {
                        break;
                    }
                    self.advance_head(elapsed);
                    match self.pop_if_due() {
                        Some(entry) => entry,
                        None => break,
                    }
                }
            };

            log_trace!("ztimer: dispatch");
            entry.fire();
        }
    }

    /// Reprograms the backend for the current head, per the rearm policy
    /// (§4.5). Always resamples `now` and rebases `reference` to it, the
    /// way the source's relaunch routine does unconditionally.
    fn rearm(&self) {
        let n = self.backend.now();

        match self.head.get() {
            None => {
                self.backend.cancel_alarm();
                self.backend.cancel_overflow_alarm();
                log_debug!("ztimer: rearm -> idle");
            }
            Some(head) => {
                let h = head.offset.get();
                // Widen to u64 before summing: `h` may be up to u32::MAX
                // (arm() accepts delays far beyond the 16-bit horizon, per
                // §4.3), so a u32 sum of h + n + GUARD can itself wrap past
                // 0x1_0000 and falsely take the "fires this wrap" branch.
                if (h as u64) + (n as u64) + (GUARD as u64) < 0x1_0000 {
                    self.backend.set_alarm(n.wrapping_add(h) & 0xFFFF);
                    self.backend.cancel_overflow_alarm();
                    log_debug!("ztimer: rearm -> short, target={}", (n.wrapping_add(h)) & 0xFFFF);
                } else {
                    self.backend.set_overflow_alarm();
                    self.backend.cancel_alarm();
                    log_debug!("ztimer: rearm -> long, overflow armed");
                }
            }
        }

        self.reference.set(n);
    }

    #[cfg(debug_assertions)]
    fn debug_check_invariants(&self) {
        let mut walked: u32 = 0;
        let mut cursor = self.head.get();
        while let Some(node) = cursor {
            walked += 1;
            debug_assert!(
                walked <= MAX_INVARIANT_WALK,
                "ztimer: cycle detected in pending list (I1/I2 violated)"
            );
            debug_assert!(
                node.armed.get(),
                "ztimer: linked entry not marked armed (I6 violated)"
            );
            cursor = node.next.get();
        }
    }
}
