//! Host simulation harness.
//!
//! [`MockHal`] stands in for the counter peripheral and the interrupt
//! controller: the counter is a settable value, compare writes are
//! recorded, and scheduled bottom halves wait in a FIFO until [`pump`]
//! runs them. [`advance`] moves time forward one compare match at a time,
//! running trigger → Worker → Job at each, the way the hardware would.
//!
//! Timeout and completion callbacks log into thread-locals, so each test
//! sees only its own events.

use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::vec::Vec;

use crate::error::Status;
use crate::hal::{CallId, Hal};
use crate::instance::{Instance, Requests};
use crate::node::Expiry;
use crate::ticks::{ticks_add, ticks_diff};
use crate::user::Reply;

/// Instance shape used by most tests.
pub type TestTicker = Instance<MockHal, 8, 2, 8>;

/// Bottom-half runs after which [`pump`] gives up.
const PUMP_LIMIT: usize = 1_000;

pub struct MockHal {
    now: Cell<u32>,
    /// Ticks the counter moves on every read.
    pub drift_per_read: u32,
    /// Armed compare value, cleared once it fires.
    pub compare: Option<u32>,
    pub compare_writes: usize,
    pub running: bool,
    /// Every `schedule` request, in order.
    pub calls: Vec<(CallId, CallId, bool)>,
    queue: VecDeque<CallId>,
}

impl MockHal {
    pub fn new(now: u32) -> Self {
        Self {
            now: Cell::new(now),
            drift_per_read: 0,
            compare: None,
            compare_writes: 0,
            running: false,
            calls: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    /// Counter value without the read side effect.
    pub fn now(&self) -> u32 {
        self.now.get()
    }

    pub fn set_now(&mut self, ticks: u32) {
        self.now.set(ticks);
    }

    /// Forget pending bottom halves, as if their interrupts were lost.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }
}

impl Hal for MockHal {
    fn ticks_now(&self) -> u32 {
        let now = self.now.get();
        self.now.set(ticks_add(now, self.drift_per_read));
        now
    }

    fn compare_set(&mut self, value: u32) {
        self.compare = Some(value);
        self.compare_writes += 1;
    }

    fn counter_start(&mut self) -> bool {
        let started = !self.running;
        self.running = true;
        started
    }

    fn counter_stop(&mut self) -> bool {
        let stopped = self.running;
        self.running = false;
        stopped
    }

    fn schedule(&mut self, caller: CallId, callee: CallId, chain: bool) {
        self.calls.push((caller, callee, chain));
        // A pended interrupt is pended once
        if !self.queue.contains(&callee) {
            self.queue.push_back(callee);
        }
    }
}

/// Run scheduled bottom halves until none is left.
pub fn pump<const N: usize, const U: usize, const O: usize>(ticker: &mut Instance<MockHal, N, U, O>) {
    for _ in 0..PUMP_LIMIT {
        match ticker.hal_mut().queue.pop_front() {
            Some(CallId::Worker) => ticker.worker(),
            Some(CallId::Job) => ticker.job(),
            Some(_) => {}
            None => return,
        }
    }
    panic!("bottom halves did not settle");
}

/// Let `ticks` pass, firing every compare match on the way.
pub fn advance<const N: usize, const U: usize, const O: usize>(
    ticker: &mut Instance<MockHal, N, U, O>,
    ticks: u32,
) {
    let mut remaining = ticks;
    loop {
        let hal = ticker.hal_mut();
        let (Some(cc), true) = (hal.compare, hal.running) else {
            break;
        };
        let due = ticks_diff(cc, hal.now());
        if due > remaining {
            break;
        }

        remaining -= due;
        hal.set_now(cc);
        hal.compare = None;
        ticker.trigger();
        pump(ticker);
    }

    let hal = ticker.hal_mut();
    let now = hal.now();
    hal.set_now(ticks_add(now, remaining));
}

/// Check that no two slot reservations in the list overlap, including
/// the one still held by the last expired node.
pub fn assert_slots_disjoint<const N: usize, const U: usize, const O: usize>(
    ticker: &Instance<MockHal, N, U, O>,
) {
    let list = ticker.list();
    let mut reserved_until = list.ticks_slot_previous;
    let mut holder = list.slot_previous;

    for (id, ticks) in list.iter() {
        let Some(node) = list.node(id) else { continue };
        if node.ticks_slot() == 0 {
            continue;
        }
        assert!(
            ticks >= reserved_until,
            "node {id} at {ticks} inside reservation of {holder:?} until {reserved_until}"
        );
        reserved_until = ticks + node.ticks_slot();
        holder = Some(id);
    }
}

/// One timeout callback, as seen by [`record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fired {
    /// Callback context; tests pass the node id.
    pub node: usize,
    pub ticks: u32,
    pub lazy: u16,
}

std::thread_local! {
    static FIRED: RefCell<Vec<Fired>> = RefCell::new(Vec::new());
    static DONE: RefCell<Vec<(usize, Status, Reply)>> = RefCell::new(Vec::new());
}

/// Timeout callback that logs the expiry.
pub fn record(expiry: Expiry, _requests: &mut dyn Requests, context: usize) {
    log_fired(expiry, context);
}

pub fn log_fired(expiry: Expiry, context: usize) {
    FIRED.with(|fired| {
        fired.borrow_mut().push(Fired {
            node: context,
            ticks: expiry.ticks_at_expire,
            lazy: expiry.lazy,
        })
    });
}

/// Completion callback that logs the outcome.
pub fn op_done(status: Status, reply: Reply, context: usize) {
    DONE.with(|done| done.borrow_mut().push((context, status, reply)));
}

pub fn take_fired() -> Vec<Fired> {
    FIRED.with(|fired| fired.take())
}

pub fn take_done() -> Vec<(usize, Status, Reply)> {
    DONE.with(|done| done.take())
}

pub fn fired_count() -> usize {
    FIRED.with(|fired| fired.borrow().len())
}
