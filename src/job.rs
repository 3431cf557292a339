//! # Job
//!
//! The only context that mutates the node list. One pass runs these
//! steps in order:
//!
//! 1. Take the elapsed ticks queued by the Worker and advance
//!    `ticks_current` (or rebase an idle list on the counter).
//! 2. **Manage**: apply queued `update` and `stop` ops. Nodes the Worker
//!    fired but the Job has not requeued yet are left for the next pass.
//! 3. **Bottom half**: unlink expired nodes and reload periodic ones.
//! 4. **Insert**: link reloaded and updated nodes, then queued `start`
//!    ops, resolving slot collisions.
//! 5. **Inquire**: answer `next_slot_get` and `idle_get`, retiring ops.
//! 6. Re-arm the compare channel if the head changed.

use crate::config::COMPARE_RETRY_MAX;
use crate::error::Status;
use crate::hal::{CallId, Hal};
use crate::instance::Instance;
use crate::list::Collision;
use crate::node::{Node, NodeState};
use crate::ticks::{ticks_add, ticks_diff};
use crate::user::{OpKind, Reply, StartParams, UpdateParams, User};

impl<H: Hal, const NODES: usize, const USERS: usize, const OPS: usize> Instance<H, NODES, USERS, OPS> {
    /// Job bottom half.
    pub fn job(&mut self) {
        if self.worker_trigger {
            trace!("job deferred behind worker");
            return;
        }
        self.job_guard = true;

        let ticks_previous = self.ticks_current;
        let elapsed = self.elapsed_pop();
        let ticks_elapsed = match elapsed {
            Some(ticks) => {
                self.ticks_current = ticks_add(self.ticks_current, ticks);
                ticks
            }
            None => {
                if self.list.head.is_none() {
                    self.rebase_idle();
                }
                0
            }
        };

        let head_old = self.list.head;
        let mut head_changed = false;
        let mut insert_head = None;

        let pending = self.list_manage(ticks_elapsed, &mut insert_head);
        head_changed |= self.list.head != head_old;

        if elapsed.is_some() {
            self.worker_bh(ticks_previous, ticks_elapsed, &mut insert_head);
            head_changed |= self.list.head != head_old;
        }

        self.list_insert(insert_head);
        head_changed |= self.list.head != head_old;

        if !pending {
            self.list_inquire();
        }

        self.job_guard = false;

        if head_changed {
            self.compare_update(head_old);
        }

        if self.worker_trigger {
            self.hal.schedule(CallId::Job, CallId::Worker, true);
        }
    }

    /// Move an idle list's time base to the counter, consuming the
    /// previous slot by the time skipped.
    fn rebase_idle(&mut self) {
        let ticks_now = self.hal.ticks_now();
        let shift = ticks_diff(ticks_now, self.ticks_current);
        self.ticks_current = ticks_now;

        let list = &mut self.list;
        list.ticks_slot_previous = list.ticks_slot_previous.saturating_sub(shift);
        if list.ticks_slot_previous == 0 {
            list.slot_previous = None;
        }
    }

    /// Apply `update` and `stop` ops. Returns `true` if an op had to wait
    /// for a node in flight, in which case another pass is scheduled.
    fn list_manage(&mut self, ticks_elapsed: u32, insert_head: &mut Option<u8>) -> bool {
        let mut pending = false;

        for user in (0..USERS).rev() {
            while self.users[user].middle != self.users[user].last {
                let prev = self.users[user].middle;
                self.users[user].middle = User::<OPS>::next(prev);

                let op = self.users[user].ops[prev as usize];
                let update = match op.kind {
                    OpKind::Update(params) => Some(params),
                    OpKind::Stop => None,
                    _ => continue,
                };

                if update.is_some_and(|params| params.is_noop()) {
                    self.users[user].ops[prev as usize].complete(Status::Failure, Reply::None);
                    continue;
                }

                let state = self.list.nodes[op.id as usize].state();
                let defer = match state {
                    NodeState::Idle => self.users[user].start_queued(op.id, prev),
                    NodeState::Scheduled => false,
                    NodeState::Pending => true,
                };

                if defer {
                    debug!("node {} busy, op deferred", op.id);
                    self.hal.schedule(CallId::Job, CallId::Job, true);
                    self.users[user].middle = prev;
                    pending = true;
                    break;
                }

                let status = match state {
                    NodeState::Scheduled => {
                        self.node_manage(op.id, update, ticks_elapsed, insert_head);
                        if update.is_some() {
                            // Completed by list_insert with the relink outcome
                            self.list.nodes[op.id as usize].op_pending = Some((user as u8, prev));
                            continue;
                        }
                        Status::Success
                    }
                    _ if update.is_some() => Status::Failure,
                    _ => Status::Success,
                };
                self.users[user].ops[prev as usize].complete(status, Reply::None);
            }
        }

        pending
    }

    /// Unlink a scheduled node; re-queue it for insertion if updated.
    fn node_manage(
        &mut self,
        id: u8,
        update: Option<UpdateParams>,
        ticks_elapsed: u32,
        insert_head: &mut Option<u8>,
    ) {
        let ticks_to_expire = self.list.dequeue(id);
        self.list.nodes[id as usize].ticks_to_expire = ticks_to_expire;

        match update {
            Some(params) => {
                let ticks_now = self.hal.ticks_now();
                let node = &mut self.list.nodes[id as usize];
                node_update(node, &params, self.ticks_current, ticks_elapsed, ticks_now);

                node.next = *insert_head;
                *insert_head = Some(id);
                node.req = node.req.wrapping_add(1);
            }
            None => {
                self.list.nodes[id as usize].mark_idle();

                if self.list.slot_previous == Some(id) {
                    let ticks_used = ticks_diff(self.hal.ticks_now(), self.ticks_current);
                    let list = &mut self.list;
                    list.slot_previous = None;
                    list.ticks_slot_previous = list.ticks_slot_previous.min(ticks_used);
                }
            }
        }
    }

    /// Unlink expired nodes. Periodic nodes are reloaded with the next
    /// `1 + lazy_periodic` periods and queued for insertion; one-shot
    /// nodes go idle.
    fn worker_bh(&mut self, ticks_previous: u32, mut ticks_elapsed: u32, insert_head: &mut Option<u8>) {
        let ticks_current = self.ticks_current;
        let list = &mut self.list;
        let mut ticks_expired = 0u32;

        while let Some(id) = list.head {
            let node = &mut list.nodes[id as usize];
            let ticks_to_expire = node.ticks_to_expire;
            if ticks_elapsed < ticks_to_expire {
                node.ticks_to_expire -= ticks_elapsed;
                break;
            }

            ticks_elapsed -= ticks_to_expire;
            ticks_expired += ticks_to_expire;

            if list.ticks_slot_previous > ticks_to_expire {
                list.ticks_slot_previous -= ticks_to_expire;
            } else {
                list.slot_previous = None;
                list.ticks_slot_previous = 0;
            }

            if node.ticks_slot != 0 {
                list.slot_previous = Some(id);
                list.ticks_slot_previous = node.ticks_slot;
            }

            node.ticks_to_expire = 0;
            list.head = node.next;

            if node.ticks_periodic == 0 {
                node.mark_idle();
                continue;
            }

            let mut ticks_to_expire = 0;
            for _ in 0..=node.lazy_periodic {
                let extra = node.remainder_inc();
                ticks_to_expire += node.ticks_periodic + extra;
            }
            node.ticks_to_expire = ticks_to_expire;
            node.expire_prep(ticks_current, ticks_add(ticks_previous, ticks_expired));
            node.lazy_current = node.lazy_periodic;
            node.force = 0;

            node.next = *insert_head;
            *insert_head = Some(id);
            node.req = node.req.wrapping_add(1);
        }
    }

    /// Link re-queued nodes and queued `start` ops.
    fn list_insert(&mut self, mut insert_head: Option<u8>) {
        for user in (0..USERS).rev() {
            let mut first = self.users[user].first;

            loop {
                if let Some(id) = insert_head {
                    insert_head = self.list.nodes[id as usize].next;
                    let status = self.insert(id, &mut insert_head);
                    if status == Status::Failure {
                        warn!("node {} dropped, no free slot", id);
                        self.list.nodes[id as usize].mark_idle();
                    }
                    if let Some((op_user, index)) = self.list.nodes[id as usize].op_pending.take() {
                        self.users[op_user as usize].ops[index as usize].complete(status, Reply::None);
                    }
                    continue;
                }

                if first == self.users[user].middle {
                    break;
                }
                let index = first as usize;
                first = User::<OPS>::next(first);

                let op = self.users[user].ops[index];
                let OpKind::Start(params) = op.kind else {
                    continue;
                };

                let node = &mut self.list.nodes[op.id as usize];
                let status = if node.state() != NodeState::Idle {
                    Status::Failure
                } else {
                    node_start(node, &params, self.ticks_current);
                    self.insert(op.id, &mut insert_head)
                };
                self.users[user].ops[index].complete(status, Reply::None);
            }
        }
    }

    /// Link node `id`, resolving slot collisions.
    ///
    /// A periodic incumbent that has skipped no more intervals than the
    /// newcomer and has a lower `force` is unlinked and queued for
    /// reinsertion. Otherwise a periodic newcomer slips by one period and
    /// retries; a one-shot newcomer fails.
    fn insert(&mut self, id: u8, insert_head: &mut Option<u8>) -> Status {
        let list = &mut self.list;
        list.nodes[id as usize].next = None;
        let mut skip = list.nodes[id as usize].skipped();

        loop {
            let collision = match list.enqueue(id) {
                Ok(()) => break,
                Err(collision) => collision,
            };

            if let Collision::Node(id_collide) = collision {
                let node = &list.nodes[id as usize];
                let collide = &list.nodes[id_collide as usize];

                if collide.ticks_periodic != 0 && collide.skipped() <= skip && collide.force < node.force {
                    debug!("node {} preempts node {}", id, id_collide);
                    let ticks_to_expire = list.dequeue(id_collide);
                    let collide = &mut list.nodes[id_collide as usize];
                    collide.ticks_to_expire = ticks_to_expire;
                    collide.mark_idle();
                    collide.next = *insert_head;
                    *insert_head = Some(id_collide);
                    continue;
                }
            }

            let node = &mut list.nodes[id as usize];
            if node.ticks_periodic == 0 {
                debug!("node {} collides, not periodic", id);
                return Status::Failure;
            }

            let extra = node.remainder_inc();
            node.ticks_to_expire += node.ticks_periodic + extra;
            node.lazy_current = node.lazy_current.wrapping_add(1);
            skip = node.skipped();
            node.drain_minus();
            trace!("node {} slips to lazy {}", id, node.lazy_current);
        }

        list.nodes[id as usize].mark_scheduled();
        Status::Success
    }

    /// Answer inquiries and retire every processed op.
    fn list_inquire(&mut self) {
        let idle = self.list.head.is_none();
        let ticks_current = self.ticks_current;

        for user in (0..USERS).rev() {
            let ring = &mut self.users[user];
            while ring.first != ring.last {
                let op = &mut ring.ops[ring.first as usize];
                match op.kind {
                    OpKind::SlotGet(cursor) => {
                        let cursor = self.list.next_slot_get(cursor, ticks_current);
                        op.complete(Status::Success, Reply::NextSlot(cursor));
                    }
                    OpKind::IdleGet => op.complete(Status::Success, Reply::Idle(idle)),
                    _ => {}
                }
                ring.first = User::<OPS>::next(ring.first);
            }
        }
    }

    /// Arm the compare channel for the new head, or release the counter
    /// when the list emptied.
    fn compare_update(&mut self, head_old: Option<u8>) {
        let Some(head) = self.list.head else {
            if self.hal.counter_stop() {
                debug!("counter stopped");
                self.list.slot_previous = None;
                self.list.ticks_slot_previous = 0;
            }
            return;
        };

        if head_old.is_none() && self.hal.counter_start() {
            debug!("counter started");
        }

        let ticks_to_expire = self.list.nodes[head as usize].ticks_to_expire;
        let mut retry = COMPARE_RETRY_MAX;
        loop {
            if retry == 0 {
                error!("compare retries exhausted");
                panic!("compare value kept falling behind the counter");
            }
            retry -= 1;

            let ctr = self.hal.ticks_now();
            let ticks_elapsed = ticks_diff(ctr, self.ticks_current) + H::CMP_OFFSET_MIN + H::SET_LATENCY;
            let cc = ticks_add(self.ticks_current, ticks_elapsed.max(ticks_to_expire));
            self.hal.compare_set(cc);

            let ctr_post = self.hal.ticks_now();
            if ticks_diff(ctr_post, ctr) + H::CMP_OFFSET_MIN <= ticks_diff(cc, ctr) {
                trace!("compare set to {}", cc);
                break;
            }
            debug!("compare {} overtaken by counter, retrying", cc);
        }
    }
}

/// Load a `start` op into an idle node.
fn node_start(node: &mut Node, params: &StartParams, ticks_current: u32) {
    node.ticks_periodic = params.ticks_periodic;
    node.remainder_periodic = params.remainder_periodic;
    node.lazy_periodic = params.lazy;
    node.ticks_slot = params.ticks_slot;
    node.timeout = params.timeout;
    node.context = params.context;
    node.ticks_to_expire = params.ticks_first;
    node.ticks_to_expire_minus = 0;
    node.expire_prep(ticks_current, params.ticks_anchor);
    node.remainder_current = 0;
    node.lazy_current = 0;
    node.force = 0;
}

/// Apply an `update` to a node just unlinked from the list.
///
/// `ticks_to_expire` arrives relative to the list's time base before
/// `ticks_elapsed` was consumed and leaves relative to `ticks_current`.
fn node_update(
    node: &mut Node,
    params: &UpdateParams,
    ticks_current: u32,
    ticks_elapsed: u32,
    ticks_now: u32,
) {
    let mut ticks_to_expire = node.ticks_to_expire;
    let ticks_elapsed = ticks_elapsed + ticks_diff(ticks_now, ticks_current);
    if ticks_to_expire > ticks_elapsed {
        ticks_to_expire -= ticks_elapsed;
    } else {
        node.ticks_to_expire_minus += ticks_elapsed - ticks_to_expire;
        ticks_to_expire = 0;
    }

    // 0: unchanged, otherwise the new latency plus one
    if node.ticks_periodic != 0 && params.lazy != 0 {
        let lazy = params.lazy - 1;

        while ticks_to_expire > node.ticks_periodic && node.lazy_current > lazy {
            let extra = node.remainder_dec();
            ticks_to_expire -= node.ticks_periodic + extra;
            node.lazy_current -= 1;
        }

        while node.lazy_current < lazy {
            let extra = node.remainder_inc();
            ticks_to_expire += node.ticks_periodic + extra;
            node.lazy_current += 1;
        }

        node.lazy_periodic = lazy;
    }

    node.ticks_to_expire = ticks_to_expire + params.ticks_drift_plus;
    node.ticks_to_expire_minus += params.ticks_drift_minus;
    node.expire_prep(ticks_current, ticks_now);

    node.ticks_slot = node
        .ticks_slot
        .saturating_add(params.ticks_slot_plus)
        .saturating_sub(params.ticks_slot_minus);

    if params.force != 0 {
        node.force = params.force;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
