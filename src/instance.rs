//! # Ticker Instance
//!
//! An [`Instance`] binds one node pool, one set of users and one hardware
//! counter together. Pool sizes are const generics:
//!
//! | Parameter | Meaning | Bounds |
//! |-----------|---------|--------|
//! | `NODES`   | schedulable nodes | 1..=255 |
//! | `USERS`   | calling contexts, each with a private op ring | 1..=255 |
//! | `OPS`     | ring slots per user (one is always free) | 2..=255 |
//!
//! Users never touch the node list. They queue operations into their own
//! ring and the Job, which is the only list mutator, applies them later.
//! Submission only returns whether the operation was queued; its outcome
//! arrives through the optional [`Completion`].

use crate::config::ELAPSED_QUEUE_SIZE;
use crate::error::TickerError;
use crate::hal::{CallId, Hal};
use crate::list::NodeList;
use crate::node::Node;
use crate::user::{Completion, OpKind, SlotCursor, StartParams, UpdateParams, User};

/// Operations a ticker user can submit.
///
/// Implemented by the handle passed to timeout callbacks, so a callback
/// can reschedule or stop nodes while the Worker holds the instance.
pub trait Requests {
    /// Schedule node `id`.
    fn start(
        &mut self,
        user: u8,
        id: u8,
        params: StartParams,
        done: Option<Completion>,
    ) -> Result<(), TickerError>;

    /// Adjust drift, slot, latency or force of a scheduled node.
    fn update(
        &mut self,
        user: u8,
        id: u8,
        params: UpdateParams,
        done: Option<Completion>,
    ) -> Result<(), TickerError>;

    /// Unschedule node `id`.
    fn stop(&mut self, user: u8, id: u8, done: Option<Completion>) -> Result<(), TickerError>;

    /// Report the slot-reserving node after `cursor`.
    fn next_slot_get(
        &mut self,
        user: u8,
        cursor: SlotCursor,
        done: Option<Completion>,
    ) -> Result<(), TickerError>;

    /// Report whether any node is scheduled.
    fn idle_get(&mut self, user: u8, done: Option<Completion>) -> Result<(), TickerError>;

    /// Ask for a Job pass without queueing anything.
    fn job_sched(&mut self, user: u8);

    /// Current counter value.
    fn ticks_now(&self) -> u32;
}

/// Submission handle over the user rings and the HAL, borrowed apart from
/// the node list.
pub(crate) struct Submitter<'a, H, const USERS: usize, const OPS: usize> {
    users: &'a mut [User<OPS>; USERS],
    hal: &'a mut H,
    nodes: usize,
}

impl<'a, H: Hal, const USERS: usize, const OPS: usize> Submitter<'a, H, USERS, OPS> {
    pub(crate) fn new(users: &'a mut [User<OPS>; USERS], hal: &'a mut H, nodes: usize) -> Self {
        Self { users, hal, nodes }
    }

    fn submit(
        &mut self,
        user: u8,
        id: u8,
        kind: OpKind,
        done: Option<Completion>,
    ) -> Result<(), TickerError> {
        let Some(ring) = self.users.get_mut(user as usize) else {
            warn!("rejected op from unknown user {}", user);
            return Err(TickerError::InvalidUser);
        };
        if id as usize >= self.nodes {
            warn!("rejected op on unknown node {}", id);
            return Err(TickerError::InvalidNode);
        }
        if let Err(err) = ring.push(kind, id, done) {
            warn!("user {} op queue full", user);
            return Err(err);
        }

        let caller = self.hal.caller_id(user);
        self.hal.schedule(caller, CallId::Job, false);
        Ok(())
    }
}

impl<'a, H: Hal, const USERS: usize, const OPS: usize> Requests for Submitter<'a, H, USERS, OPS> {
    fn start(
        &mut self,
        user: u8,
        id: u8,
        params: StartParams,
        done: Option<Completion>,
    ) -> Result<(), TickerError> {
        self.submit(user, id, OpKind::Start(params), done)
    }

    fn update(
        &mut self,
        user: u8,
        id: u8,
        params: UpdateParams,
        done: Option<Completion>,
    ) -> Result<(), TickerError> {
        self.submit(user, id, OpKind::Update(params), done)
    }

    fn stop(&mut self, user: u8, id: u8, done: Option<Completion>) -> Result<(), TickerError> {
        self.submit(user, id, OpKind::Stop, done)
    }

    fn next_slot_get(
        &mut self,
        user: u8,
        cursor: SlotCursor,
        done: Option<Completion>,
    ) -> Result<(), TickerError> {
        self.submit(user, 0, OpKind::SlotGet(cursor), done)
    }

    fn idle_get(&mut self, user: u8, done: Option<Completion>) -> Result<(), TickerError> {
        self.submit(user, 0, OpKind::IdleGet, done)
    }

    fn job_sched(&mut self, user: u8) {
        let caller = self.hal.caller_id(user);
        self.hal.schedule(caller, CallId::Job, false);
    }

    fn ticks_now(&self) -> u32 {
        self.hal.ticks_now()
    }
}

/// One ticker: node pool, users, elapsed handoff and the counter HAL.
pub struct Instance<H: Hal, const NODES: usize, const USERS: usize, const OPS: usize> {
    pub(crate) list: NodeList<NODES>,
    pub(crate) users: [User<OPS>; USERS],

    /// Worker → Job handoff of expired ticks.
    pub(crate) elapsed: [u32; ELAPSED_QUEUE_SIZE],
    pub(crate) elapsed_first: u8,
    pub(crate) elapsed_last: u8,

    /// Counter value the head node's `ticks_to_expire` is relative to.
    pub(crate) ticks_current: u32,

    /// Set while the Job runs; a Worker firing meanwhile defers itself.
    pub(crate) job_guard: bool,

    /// Set while the Worker runs or is deferred; the Job yields to it.
    pub(crate) worker_trigger: bool,

    pub(crate) hal: H,
}

impl<H: Hal, const NODES: usize, const USERS: usize, const OPS: usize> Instance<H, NODES, USERS, OPS> {
    const USER_COUNT: usize = {
        assert!(USERS >= 1, "an instance needs at least one user");
        assert!(USERS <= u8::MAX as usize, "user ids are u8");
        USERS
    };

    /// Create an idle instance on top of `hal`.
    pub fn new(hal: H) -> Self {
        let _ = Self::USER_COUNT;
        let ticks_current = hal.ticks_now();
        Self {
            list: NodeList::new(),
            users: core::array::from_fn(|_| User::new()),
            elapsed: [0; ELAPSED_QUEUE_SIZE],
            elapsed_first: 0,
            elapsed_last: 0,
            ticks_current,
            job_guard: false,
            worker_trigger: false,
            hal,
        }
    }

    pub(crate) fn submitter(&mut self) -> Submitter<'_, H, USERS, OPS> {
        Submitter::new(&mut self.users, &mut self.hal, NODES)
    }

    /// Queue a `start` of node `id`. See [`Requests::start`].
    pub fn start(
        &mut self,
        user: u8,
        id: u8,
        params: StartParams,
        done: Option<Completion>,
    ) -> Result<(), TickerError> {
        self.submitter().start(user, id, params, done)
    }

    /// Queue an `update` of node `id`. See [`Requests::update`].
    pub fn update(
        &mut self,
        user: u8,
        id: u8,
        params: UpdateParams,
        done: Option<Completion>,
    ) -> Result<(), TickerError> {
        self.submitter().update(user, id, params, done)
    }

    /// Queue a `stop` of node `id`. See [`Requests::stop`].
    pub fn stop(&mut self, user: u8, id: u8, done: Option<Completion>) -> Result<(), TickerError> {
        self.submitter().stop(user, id, done)
    }

    /// Queue a next-slot inquiry. See [`Requests::next_slot_get`].
    pub fn next_slot_get(
        &mut self,
        user: u8,
        cursor: SlotCursor,
        done: Option<Completion>,
    ) -> Result<(), TickerError> {
        self.submitter().next_slot_get(user, cursor, done)
    }

    /// Queue an idle inquiry. See [`Requests::idle_get`].
    pub fn idle_get(&mut self, user: u8, done: Option<Completion>) -> Result<(), TickerError> {
        self.submitter().idle_get(user, done)
    }

    /// Schedule a Job pass on behalf of `user`.
    pub fn job_sched(&mut self, user: u8) {
        self.submitter().job_sched(user);
    }

    /// Compare-match entry point. Schedules the Worker.
    pub fn trigger(&mut self) {
        self.hal.schedule(CallId::Trigger, CallId::Worker, true);
    }

    /// Current counter value.
    pub fn ticks_now(&self) -> u32 {
        self.hal.ticks_now()
    }

    /// Counter value the list is relative to.
    pub fn ticks_current(&self) -> u32 {
        self.ticks_current
    }

    /// True when no node is linked.
    pub fn is_idle(&self) -> bool {
        self.list.head.is_none()
    }

    pub fn node(&self, id: u8) -> Option<&Node> {
        self.list.node(id)
    }

    pub fn list(&self) -> &NodeList<NODES> {
        &self.list
    }

    pub fn user(&self, user: u8) -> Option<&User<OPS>> {
        self.users.get(user as usize)
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    #[inline]
    fn elapsed_next(index: u8) -> u8 {
        let index = index + 1;
        if index as usize == ELAPSED_QUEUE_SIZE {
            0
        } else {
            index
        }
    }

    /// Hand expired ticks to the Job. A value the Job has not taken yet
    /// is replaced, since the Worker recounts from `ticks_current`.
    pub(crate) fn elapsed_push(&mut self, ticks: u32) {
        if self.elapsed_first == self.elapsed_last {
            self.elapsed_last = Self::elapsed_next(self.elapsed_last);
        }
        self.elapsed[self.elapsed_last as usize] = ticks;
    }

    /// Take the expired ticks queued by the Worker.
    pub(crate) fn elapsed_pop(&mut self) -> Option<u32> {
        if self.elapsed_first == self.elapsed_last {
            return None;
        }
        self.elapsed_first = Self::elapsed_next(self.elapsed_first);
        Some(self.elapsed[self.elapsed_first as usize])
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
