//! # Worker
//!
//! Runs on compare match. Walks the list from the head, acknowledges and
//! calls back every scheduled node that has expired, then hands the
//! expired tick count to the Job. The Worker never links or unlinks nodes;
//! it only decrements `ack`, which moves fired nodes to `Pending` until
//! the Job's bottom-half requeue picks them up.

use crate::config::CNTR_MASK;
use crate::hal::{CallId, Hal};
use crate::instance::{Instance, Submitter};
use crate::node::{Expiry, NodeState};
use crate::ticks::ticks_diff;

impl<H: Hal, const NODES: usize, const USERS: usize, const OPS: usize> Instance<H, NODES, USERS, OPS> {
    /// Worker bottom half.
    pub fn worker(&mut self) {
        self.worker_trigger = true;
        if self.job_guard {
            trace!("worker deferred behind job");
            return;
        }

        if self.list.head.is_none() {
            self.worker_trigger = false;
            return;
        }

        let mut ticks_elapsed = ticks_diff(self.hal.ticks_now(), self.ticks_current);
        let mut ticks_expired = 0u32;

        let Self {
            list,
            users,
            hal,
            ticks_current,
            ..
        } = self;

        let mut current = list.head;
        while let Some(id) = current {
            let node = &mut list.nodes[id as usize];
            let ticks_to_expire = node.ticks_to_expire;
            if ticks_elapsed < ticks_to_expire {
                break;
            }

            ticks_elapsed -= ticks_to_expire;
            ticks_expired += ticks_to_expire;
            current = node.next;

            // Already fired, waiting for the Job
            if node.state() != NodeState::Scheduled {
                continue;
            }

            node.ack = node.ack.wrapping_sub(1);

            if let Some(timeout) = node.timeout {
                let expiry = Expiry {
                    ticks_at_expire: ticks_current
                        .wrapping_add(ticks_expired)
                        .wrapping_sub(node.ticks_to_expire_minus)
                        & CNTR_MASK,
                    remainder: node.remainder_current,
                    lazy: node.lazy_current,
                };
                let context = node.context;

                trace!("node {} expired at {}", id, expiry.ticks_at_expire);
                let mut requests = Submitter::new(&mut *users, &mut *hal, NODES);
                timeout(expiry, &mut requests, context);
            }
        }

        self.elapsed_push(ticks_expired);
        self.worker_trigger = false;
        self.hal.schedule(CallId::Worker, CallId::Job, true);
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
