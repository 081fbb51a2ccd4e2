//! A hierarchical timer scheduler core.
//!
//! A [`Device`] multiplexes any number of caller-owned [`Timer`]s onto a
//! single hardware [`Backend`]: a free-running counter with one single-shot
//! alarm and one overflow alarm. Timers are kept in an intrusive,
//! relative-offset singly-linked list so that arming, disarming, and
//! dispatch are all O(1) relative to the position being touched, with only
//! the insertion walk being O(n) in the number of currently-pending timers.
//!
//! # Concurrency
//!
//! All scheduler state is mutated from inside a [`critical_section`], which
//! on the single-core, non-SMP targets this crate is built for is
//! equivalent to "interrupts disabled". [`Device::on_alarm`] and
//! [`Device::on_overflow`] are meant to be called directly from the
//! backend's interrupt handlers; [`Device::arm`] and [`Device::disarm`] are
//! safe to call from thread context or from inside another timer's
//! [`TimerClient::fired`] callback. A callback may arm or disarm any timer
//! on any device, including the one currently dispatching it, without
//! deadlocking or corrupting the list — critical sections on this target
//! nest by construction (re-disabling already-disabled interrupts is a
//! no-op).
//!
//! # No backend included
//!
//! This crate only implements the scheduling algorithm. A board
//! integration supplies a [`Backend`] wired to its hardware timer/counter
//! peripheral; [`mock::MockBackend`] is a software backend used by this
//! crate's own tests and suitable for host-side simulation.
#![cfg_attr(not(feature = "std"), no_std)]

pub mod backend;
pub mod device;
pub mod mock;
pub mod timer;

pub use backend::Backend;
pub use device::{Device, DEFAULT_GUARD};
pub use timer::{Timer, TimerClient};
