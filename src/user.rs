//! # User Operations
//!
//! Each ticker *user* (one per calling execution context) owns a private
//! ring of operations with three cursors:
//!
//! ```text
//!        first            middle              last
//!          │                │                   │
//!   ───────┼────────────────┼───────────────────┼───────────
//!          │ managed by Job,│ not yet seen by   │ free
//!          │ awaiting insert│ the Job           │
//!          │ or inquiry     │                   │
//! ```
//!
//! - `last` is advanced only by the submitting context.
//! - `middle` is advanced only by the Job's list management step.
//! - `first` is advanced only by the Job's inquiry step, once every
//!   operation before it has delivered its completion.
//!
//! The ring is full when `last + 1 == first`, so one slot is always unused.

use crate::error::{Status, TickerError};
use crate::node::TimeoutFn;

/// Completion callback for a queued operation.
pub type OpFn = fn(status: Status, reply: Reply, context: usize);

/// Completion callback and its opaque context.
#[derive(Clone, Copy)]
pub struct Completion {
    pub func: OpFn,
    pub context: usize,
}

impl Completion {
    pub const fn new(func: OpFn, context: usize) -> Self {
        Self { func, context }
    }
}

/// Position in a walk over slot-reserving nodes. Feed the cursor from one
/// [`Reply::NextSlot`] back into the next `next_slot_get` to continue the
/// walk; a cursor whose `ticks_current` no longer matches the instance
/// restarts from the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotCursor {
    /// Last node reported, `None` to start from the head.
    pub id: Option<u8>,
    /// Instance time the walk is relative to.
    pub ticks_current: u32,
    /// Accumulated ticks from `ticks_current` to the reported node's expiry.
    pub ticks_to_expire: u32,
}

impl SlotCursor {
    /// Start a walk at the list head.
    pub const START: Self = Self {
        id: None,
        ticks_current: 0,
        ticks_to_expire: 0,
    };
}

/// Data returned with a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    /// Nothing beyond the status.
    None,
    /// Answer to `next_slot_get`. `id` is `None` when the walk ran off
    /// the end of the list.
    NextSlot(SlotCursor),
    /// Answer to `idle_get`: `true` when no node is scheduled.
    Idle(bool),
}

/// Parameters of a `start` operation.
#[derive(Clone, Copy)]
pub struct StartParams {
    /// Absolute tick the first expiry is measured from.
    pub ticks_anchor: u32,
    /// Ticks from the anchor to the first expiry.
    pub ticks_first: u32,
    /// Whole ticks between expiries; zero for a one-shot node.
    pub ticks_periodic: u32,
    /// Sub-tick part of the period in picoseconds.
    pub remainder_periodic: u32,
    /// Periods to skip between callbacks.
    pub lazy: u16,
    /// Exclusive reservation following each expiry.
    pub ticks_slot: u32,
    pub timeout: Option<TimeoutFn>,
    pub context: usize,
}

impl StartParams {
    /// One-shot expiry `ticks_first` after `ticks_anchor`, no slot.
    pub fn new(ticks_anchor: u32, ticks_first: u32) -> Self {
        Self {
            ticks_anchor,
            ticks_first,
            ticks_periodic: 0,
            remainder_periodic: 0,
            lazy: 0,
            ticks_slot: 0,
            timeout: None,
            context: 0,
        }
    }

    pub fn periodic(mut self, ticks_periodic: u32, remainder_periodic: u32) -> Self {
        self.ticks_periodic = ticks_periodic;
        self.remainder_periodic = remainder_periodic;
        self
    }

    pub fn lazy(mut self, lazy: u16) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn slot(mut self, ticks_slot: u32) -> Self {
        self.ticks_slot = ticks_slot;
        self
    }

    pub fn timeout(mut self, timeout: TimeoutFn, context: usize) -> Self {
        self.timeout = Some(timeout);
        self.context = context;
        self
    }
}

/// Parameters of an `update` operation. All-zero is rejected as a no-op.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UpdateParams {
    /// Ticks to delay the next expiry by.
    pub ticks_drift_plus: u32,
    /// Ticks to advance the next expiry by.
    pub ticks_drift_minus: u32,
    /// Ticks to add to the slot reservation.
    pub ticks_slot_plus: u32,
    /// Ticks to remove from the slot reservation (saturating at zero).
    pub ticks_slot_minus: u32,
    /// 0: unchanged, 1: no latency, n > 1: latency of n - 1 periods.
    pub lazy: u16,
    /// Non-zero replaces the node's collision priority.
    pub force: u8,
}

impl UpdateParams {
    /// True if applying these parameters would change nothing.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Operation payload.
#[derive(Clone, Copy)]
pub(crate) enum OpKind {
    /// Completed or never used.
    None,
    IdleGet,
    SlotGet(SlotCursor),
    Start(StartParams),
    Update(UpdateParams),
    Stop,
}

/// One entry of a user's operation ring.
#[derive(Clone, Copy)]
pub(crate) struct UserOp {
    pub(crate) kind: OpKind,
    pub(crate) id: u8,
    pub(crate) status: Status,
    pub(crate) done: Option<Completion>,
}

impl UserOp {
    pub(crate) const EMPTY: Self = Self {
        kind: OpKind::None,
        id: 0,
        status: Status::Success,
        done: None,
    };

    /// Retire the operation and notify its submitter.
    pub(crate) fn complete(&mut self, status: Status, reply: Reply) {
        self.kind = OpKind::None;
        self.status = status;
        if let Some(done) = self.done {
            (done.func)(status, reply, done.context);
        }
    }
}

/// Operation ring of one user.
pub struct User<const OPS: usize> {
    pub(crate) ops: [UserOp; OPS],
    pub(crate) first: u8,
    pub(crate) middle: u8,
    pub(crate) last: u8,
}

impl<const OPS: usize> User<OPS> {
    const CAPACITY: u8 = {
        assert!(OPS >= 2, "a user ring needs at least two slots");
        assert!(OPS <= u8::MAX as usize, "user ring indices are u8");
        OPS as u8
    };

    pub const fn new() -> Self {
        let _ = Self::CAPACITY;
        Self {
            ops: [UserOp::EMPTY; OPS],
            first: 0,
            middle: 0,
            last: 0,
        }
    }

    /// Ring index following `index`.
    #[inline]
    pub(crate) fn next(index: u8) -> u8 {
        let index = index + 1;
        if index == Self::CAPACITY {
            0
        } else {
            index
        }
    }

    /// Queue an operation at `last`.
    pub(crate) fn push(
        &mut self,
        kind: OpKind,
        id: u8,
        done: Option<Completion>,
    ) -> Result<(), TickerError> {
        let last = Self::next(self.last);
        if last == self.first {
            return Err(TickerError::QueueFull);
        }

        self.ops[self.last as usize] = UserOp {
            kind,
            id,
            status: Status::Busy,
            done,
        };
        self.last = last;
        Ok(())
    }

    /// True if a `start` for `id` sits between `first` and `until` and has
    /// not been inserted yet.
    pub(crate) fn start_queued(&self, id: u8, until: u8) -> bool {
        let mut index = self.first;
        while index != until {
            let op = &self.ops[index as usize];
            if op.id == id && matches!(op.kind, OpKind::Start(_)) {
                return true;
            }
            index = Self::next(index);
        }
        false
    }

    /// Operations submitted and not yet retired by the Job.
    pub fn pending(&self) -> usize {
        (self.last as usize + OPS - self.first as usize) % OPS
    }

    /// True if no operation is outstanding.
    pub fn is_empty(&self) -> bool {
        self.first == self.last
    }
}

impl<const OPS: usize> Default for User<OPS> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
