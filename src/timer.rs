//! The caller-owned timer entry and its list linkage.

use core::cell::Cell;
use core::fmt;

/// Receives the expiry callback for a [`Timer`].
///
/// Re-architected from the source's `callback: fn(arg)` pair: the opaque
/// `arg` becomes whatever state the implementing type closes over.
///
/// `fired` is invoked from interrupt context with the device's interrupts
/// still disabled (see the crate-level documentation on reentrancy). It may
/// freely call [`Device::arm`](crate::Device::arm) or
/// [`Device::disarm`](crate::Device::disarm) on any timer belonging to any
/// device, including the timer currently dispatching.
pub trait TimerClient {
    /// Called once when the timer's fire time has been reached.
    fn fired(&self);
}

/// A single pending one-shot timeout.
///
/// A `Timer` is a node in a device's intrusive, singly-linked pending list.
/// Callers own the storage (typically a `static` or a stack slot borrowed for
/// the lifetime `'a` of the device); the core never allocates or frees one.
///
/// `offset` is relative, not absolute: while linked, it holds the number of
/// backend counts between this entry's predecessor's fire time and this
/// entry's own fire time (or, for the head of the list, between the device's
/// `reference` and this entry's fire time). See the module documentation on
/// [`Device`](crate::Device) for the full encoding.
pub struct Timer<'a> {
    pub(crate) offset: Cell<u32>,
    pub(crate) next: Cell<Option<&'a Timer<'a>>>,
    pub(crate) armed: Cell<bool>,
    client: Cell<Option<&'a dyn TimerClient>>,
}

impl<'a> Timer<'a> {
    /// Creates a new, unarmed timer with no client attached.
    ///
    /// Call [`Timer::set_client`] before the first arm, otherwise expiry is
    /// silently dropped (there is nothing to invoke).
    pub const fn new() -> Self {
        Self {
            offset: Cell::new(0),
            next: Cell::new(None),
            armed: Cell::new(false),
            client: Cell::new(None),
        }
    }

    /// Attaches the client whose [`TimerClient::fired`] is invoked on expiry.
    ///
    /// Safe to call whether or not the timer is currently armed; it only
    /// takes effect for callbacks dispatched after this call returns.
    pub fn set_client(&self, client: &'a dyn TimerClient) {
        self.client.set(Some(client));
    }

    /// Whether this timer is currently linked into a device's pending list.
    pub fn is_armed(&self) -> bool {
        self.armed.get()
    }

    pub(crate) fn fire(&self) {
        if let Some(client) = self.client.get() {
            client.fired();
        }
    }
}

impl Default for Timer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Timer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("offset", &self.offset.get())
            .field("armed", &self.armed.get())
            .finish()
    }
}

// A `Timer` is shared behind `&Timer` across interrupt preemption on a
// single core; every mutation happens through a `Cell` inside a critical
// section established by the owning `Device`. There is no cross-core
// sharing (see the crate's single-core Non-goal), so this is sound the same
// way `Device` itself is `Sync` (see `device.rs`).
unsafe impl Sync for Timer<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell as StdCell;

    struct CountingClient<'a>(&'a StdCell<u32>);

    impl TimerClient for CountingClient<'_> {
        fn fired(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn fire_without_client_is_a_noop() {
        let timer = Timer::new();
        timer.fire();
    }

    #[test]
    fn fire_invokes_attached_client() {
        let count = StdCell::new(0u32);
        let client = CountingClient(&count);
        let timer = Timer::new();
        timer.set_client(&client);

        timer.fire();
        timer.fire();

        assert_eq!(count.get(), 2);
    }

    #[test]
    fn new_timer_is_not_armed() {
        let timer = Timer::new();
        assert!(!timer.is_armed());
    }
}
