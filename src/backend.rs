//! The backend capability interface (§4.2): the abstract clock/alarm source
//! a [`Device`](crate::Device) drives.
//!
//! Concrete backend drivers — a hardware real-time counter, a software
//! extender, a periodic-interrupt emulation — are deliberately outside this
//! crate. The core only ever touches backends through this trait; board
//! integrations provide an implementation and wire its interrupt vectors to
//! [`Device::on_alarm`](crate::Device::on_alarm) and
//! [`Device::on_overflow`](crate::Device::on_overflow).

/// A free-running counter with one single-shot alarm and one overflow alarm.
///
/// Implementations are driven entirely from the methods below; there is no
/// separate "install callback" step, because the core owns the backend by
/// value ([`Device`](crate::Device) holds a `B: Backend` directly) rather
/// than the two halves referencing each other. Board-glue interrupt
/// handlers call [`Device::on_alarm`](crate::Device::on_alarm) /
/// [`Device::on_overflow`](crate::Device::on_overflow) directly when the
/// hardware interrupt fires.
///
/// Every method must be safe to call from interrupt context and must
/// complete in O(1).
pub trait Backend {
    /// Reads the free-running counter.
    ///
    /// Only the low 16 bits are significant to the scheduler; any higher
    /// bits are ignored. Implementations backed by a counter narrower than
    /// 16 bits should zero-extend.
    fn now(&self) -> u32;

    /// Requests a one-shot interrupt the next time the counter equals
    /// `target & 0xFFFF`. Replaces any alarm previously requested through
    /// this method.
    fn set_alarm(&self, target: u32);

    /// Disables the alarm requested by [`Backend::set_alarm`]. Idempotent:
    /// calling it with no alarm outstanding does nothing.
    fn cancel_alarm(&self);

    /// Requests an interrupt the next time the counter wraps from `0xFFFF`
    /// to `0`. Idempotent if already requested.
    fn set_overflow_alarm(&self);

    /// Disables the overflow alarm. Idempotent.
    fn cancel_overflow_alarm(&self);
}
