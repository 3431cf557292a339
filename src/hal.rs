//! # Hardware Abstraction
//!
//! The scheduler core never touches hardware. It talks to a [`Hal`]
//! implementation that owns the tick counter, its compare channel and the
//! mechanism that runs the Worker and Job bottom halves later (on Cortex-M,
//! pending a software interrupt).
//!
//! ```text
//!   compare match ──► Instance::trigger() ──► schedule(Trigger, Worker)
//!                                                     │
//!   Instance::worker() ◄──────────────────────────────┘
//!        └─► schedule(Worker, Job) ──► Instance::job() ──► compare_set()
//! ```

use crate::config::{CNTR_CMP_OFFSET_MIN, CNTR_SET_LATENCY};

/// Execution contexts that request, or are requested to run, a bottom half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallId {
    /// The compare-match interrupt.
    Trigger,
    /// The Worker bottom half.
    Worker,
    /// The Job bottom half.
    Job,
    /// A user context, identified by the value returned from
    /// [`Hal::caller_id`].
    User(u8),
}

/// Platform services consumed by the ticker.
pub trait Hal {
    /// Ticks a compare value must lie ahead of the counter to fire.
    const CMP_OFFSET_MIN: u32 = CNTR_CMP_OFFSET_MIN;

    /// Ticks between a compare write and it taking effect.
    const SET_LATENCY: u32 = CNTR_SET_LATENCY;

    /// Current counter value, already masked to the counter width.
    fn ticks_now(&self) -> u32;

    /// Arm the compare channel at the absolute tick `value`.
    fn compare_set(&mut self, value: u32);

    /// Request the counter to run. Returns `true` if this call actually
    /// started a stopped counter.
    fn counter_start(&mut self) -> bool;

    /// Release the counter. Returns `true` if this call actually stopped it.
    fn counter_stop(&mut self) -> bool;

    /// Run `callee` (Worker or Job) on behalf of `caller`. With `chain`
    /// set the callee must be deferred, never run inline.
    fn schedule(&mut self, caller: CallId, callee: CallId, chain: bool);

    /// Execution context id of a ticker user.
    fn caller_id(&self, user: u8) -> CallId {
        CallId::User(user)
    }
}
