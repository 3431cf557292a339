//! # Ticker Node
//!
//! A node is one schedulable event slot. Nodes live in a fixed pool inside
//! the [`Instance`](crate::Instance) and are addressed by `u8` index; the
//! pool is threaded into a singly linked list sorted by expiry, where each
//! node's `ticks_to_expire` is relative to its predecessor.
//!
//! ## Sequence Lock
//!
//! Two wrapping counters, `req` and `ack`, encode the node's scheduling
//! state without a lock. Only the Job increments `req`; only the Worker
//! decrements `ack`.
//!
//! ```text
//!   req - ack == 0   Idle       not in the list
//!   req - ack == 1   Scheduled  in the list, waiting for expiry
//!   req - ack >= 2   Pending    Worker fired it (or the Job is moving it);
//!                               updates and stops wait one Job pass
//! ```
//!
//! ```text
//!   Idle ──start──► Scheduled ──worker fires──► Pending ──job──► Scheduled (periodic)
//!                                                    └──────────► Idle      (one-shot)
//! ```

use crate::config::REMAINDER_RANGE;
use crate::instance::Requests;
use crate::ticks::{is_behind, ticks_diff};

/// Timeout callback, invoked from the Worker when a scheduled node
/// expires. The [`Requests`] handle lets the callback queue further
/// operations (typically an `update` or `stop` of its own node).
pub type TimeoutFn = fn(expiry: Expiry, requests: &mut dyn Requests, context: usize);

/// Arguments delivered to a [`TimeoutFn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Expiry {
    /// Absolute counter value of this expiry, negative drift applied.
    pub ticks_at_expire: u32,
    /// Sub-tick remainder (picoseconds) accumulated at this expiry.
    pub remainder: u32,
    /// Number of periods skipped since the previous callback.
    pub lazy: u16,
}

/// Scheduling state derived from the `req`/`ack` counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NodeState {
    /// Not scheduled.
    Idle,
    /// Linked in the list, waiting to expire.
    Scheduled,
    /// Expired or being moved by the Job; list mutations must wait.
    Pending,
}

/// One schedulable entity.
#[derive(Clone, Copy)]
pub struct Node {
    /// Next node in the sorted list.
    pub(crate) next: Option<u8>,

    /// Request counter, incremented by the Job.
    pub(crate) req: u8,

    /// Acknowledge counter, decremented by the Worker.
    pub(crate) ack: u8,

    /// Slot collision priority. Reset after every expiry.
    pub(crate) force: u8,

    /// Whole ticks between expiries; zero for one-shot nodes.
    pub(crate) ticks_periodic: u32,

    /// Sub-tick part of the period, in picoseconds.
    pub(crate) remainder_periodic: u32,

    /// Ticks to expiry, relative to the previous node in the list.
    pub(crate) ticks_to_expire: u32,

    /// Negative drift still to be taken off `ticks_to_expire`.
    pub(crate) ticks_to_expire_minus: u32,

    /// Exclusive reservation following expiry; zero reserves nothing.
    pub(crate) ticks_slot: u32,

    /// Requested latency in periods.
    pub(crate) lazy_periodic: u16,

    /// Periods actually elapsed since the last callback.
    pub(crate) lazy_current: u16,

    /// Running sub-tick accumulator, folded against [`REMAINDER_RANGE`].
    pub(crate) remainder_current: u32,

    pub(crate) timeout: Option<TimeoutFn>,
    pub(crate) context: usize,

    /// `update` op (user, ring index) completed once the node is relinked.
    pub(crate) op_pending: Option<(u8, u8)>,
}

impl Node {
    /// An idle node. Used to initialize the pool.
    pub const EMPTY: Self = Self {
        next: None,
        req: 0,
        ack: 0,
        force: 0,
        ticks_periodic: 0,
        remainder_periodic: 0,
        ticks_to_expire: 0,
        ticks_to_expire_minus: 0,
        ticks_slot: 0,
        lazy_periodic: 0,
        lazy_current: 0,
        remainder_current: 0,
        timeout: None,
        context: 0,
        op_pending: None,
    };

    /// Current scheduling state.
    #[inline]
    pub fn state(&self) -> NodeState {
        match self.req.wrapping_sub(self.ack) {
            0 => NodeState::Idle,
            1 => NodeState::Scheduled,
            _ => NodeState::Pending,
        }
    }

    /// Slot reservation in ticks.
    pub fn ticks_slot(&self) -> u32 {
        self.ticks_slot
    }

    /// Period in whole ticks (zero for one-shot nodes).
    pub fn ticks_periodic(&self) -> u32 {
        self.ticks_periodic
    }

    /// Periods skipped since the last callback.
    pub fn lazy_current(&self) -> u16 {
        self.lazy_current
    }

    /// Current collision priority.
    pub fn force(&self) -> u8 {
        self.force
    }

    /// Mark the node as linked and waiting for expiry.
    #[inline]
    pub(crate) fn mark_scheduled(&mut self) {
        self.req = self.ack.wrapping_add(1);
    }

    /// Mark the node as not scheduled.
    #[inline]
    pub(crate) fn mark_idle(&mut self) {
        self.req = self.ack;
    }

    /// Intervals skipped beyond the requested latency.
    #[inline]
    pub(crate) fn skipped(&self) -> u16 {
        self.lazy_current.saturating_sub(self.lazy_periodic)
    }

    /// Add one period's remainder. Returns 1 when the accumulator crossed
    /// half a tick and was folded back, meaning this period is one tick
    /// longer.
    pub(crate) fn remainder_inc(&mut self) -> u32 {
        self.remainder_current = self.remainder_current.wrapping_add(self.remainder_periodic);
        if self.remainder_current < (1 << 31) && self.remainder_current > (REMAINDER_RANGE >> 1) {
            self.remainder_current = self.remainder_current.wrapping_sub(REMAINDER_RANGE);
            return 1;
        }
        0
    }

    /// Undo one [`remainder_inc`](Self::remainder_inc). Returns 1 when the
    /// period being removed was one tick longer.
    pub(crate) fn remainder_dec(&mut self) -> u32 {
        // The accumulator stays within (-RANGE/2, RANGE/2] read as signed
        let half = (REMAINDER_RANGE >> 1) as i32;
        let remainder = (self.remainder_current as i32).wrapping_sub(self.remainder_periodic as i32);
        if remainder > -half {
            self.remainder_current = remainder as u32;
            0
        } else {
            self.remainder_current = remainder.wrapping_add(REMAINDER_RANGE as i32) as u32;
            1
        }
    }

    /// Rebase `ticks_to_expire` from `ticks_at_start` onto `ticks_current`
    /// and consume any pending negative drift.
    ///
    /// An anchor behind `ticks_current` shortens the expiry; if the node is
    /// already late, the lateness is carried in `ticks_to_expire_minus`.
    pub(crate) fn expire_prep(&mut self, ticks_current: u32, ticks_at_start: u32) {
        let mut ticks_to_expire = self.ticks_to_expire;
        let mut ticks_to_expire_minus = self.ticks_to_expire_minus;

        if !is_behind(ticks_at_start, ticks_current) {
            ticks_to_expire += ticks_diff(ticks_at_start, ticks_current);
        } else {
            let delta_current_start = ticks_diff(ticks_current, ticks_at_start);
            if ticks_to_expire > delta_current_start {
                ticks_to_expire -= delta_current_start;
            } else {
                ticks_to_expire_minus += delta_current_start - ticks_to_expire;
                ticks_to_expire = 0;
            }
        }

        self.ticks_to_expire = ticks_to_expire;
        self.ticks_to_expire_minus = ticks_to_expire_minus;
        self.drain_minus();
    }

    /// Take as much of `ticks_to_expire_minus` off `ticks_to_expire` as it
    /// can absorb.
    pub(crate) fn drain_minus(&mut self) {
        if self.ticks_to_expire > self.ticks_to_expire_minus {
            self.ticks_to_expire -= self.ticks_to_expire_minus;
            self.ticks_to_expire_minus = 0;
        } else {
            self.ticks_to_expire_minus -= self.ticks_to_expire;
            self.ticks_to_expire = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
