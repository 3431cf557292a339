//! End-to-end scheduling scenarios on the simulated counter.

use std::vec::Vec;

use crate::config::CNTR_MASK;
use crate::error::{Status, TickerError};
use crate::instance::{Instance, Requests};
use crate::node::{Expiry, NodeState};
use crate::sim::{self, Fired, MockHal, TestTicker};
use crate::ticks::{remainder_from_us, us_to_ticks};
use crate::user::{Completion, Reply, SlotCursor, StartParams, UpdateParams};

fn done(context: usize) -> Option<Completion> {
    Some(Completion::new(sim::op_done, context))
}

fn periodic(anchor: u32, first: u32, period: u32, slot: u32, id: u8) -> StartParams {
    StartParams::new(anchor, first)
        .periodic(period, 0)
        .slot(slot)
        .timeout(sim::record, id as usize)
}

fn fired(node: usize, ticks: u32, lazy: u16) -> Fired {
    Fired { node, ticks, lazy }
}

// ---------------------------------------------------------------------------
// Slot collisions
// ---------------------------------------------------------------------------

#[test]
fn test_colliding_periodic_nodes_slip_in_phase() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    ticker.start(0, 0, periodic(0, 100, 100, 10, 0), done(0)).unwrap();
    sim::pump(&mut ticker);

    sim::advance(&mut ticker, 250);
    // Lands on A's 300 slot: B slips one period
    ticker.start(0, 1, periodic(150, 150, 150, 10, 1), done(1)).unwrap();
    sim::pump(&mut ticker);
    assert_eq!(
        sim::take_done(),
        [(0, Status::Success, Reply::None), (1, Status::Success, Reply::None)]
    );
    assert_eq!(ticker.node(1).map(|n| n.lazy_current()), Some(1));

    sim::advance(&mut ticker, 750);
    assert_eq!(
        sim::take_fired(),
        [
            fired(0, 100, 0),
            fired(0, 200, 0),
            fired(0, 300, 0),
            fired(0, 400, 0),
            fired(1, 450, 1),
            fired(0, 500, 0),
            fired(1, 600, 0),
            fired(0, 700, 1),
            fired(1, 750, 0),
            fired(0, 800, 0),
            fired(1, 900, 0),
            fired(0, 1_000, 1),
        ]
    );
}

#[test]
fn test_slots_never_overlap() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    let shapes = [(0, 37, 12), (1, 53, 9), (2, 71, 15), (3, 97, 20), (4, 29, 0)];
    for (id, period, slot) in shapes {
        ticker
            .start(0, id, periodic(0, period, period, slot, id), None)
            .unwrap();
    }
    sim::pump(&mut ticker);

    for _ in 0..400 {
        sim::advance(&mut ticker, 7);
        sim::assert_slots_disjoint(&ticker);

        let ticks: Vec<u32> = ticker.list().iter().map(|(_, t)| t).collect();
        assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
    }

    // Every node keeps firing on its own grid
    for f in sim::take_fired() {
        let period = shapes[f.node].1;
        assert_eq!(f.ticks % period, 0, "{f:?} off grid");
    }
}

#[test]
fn test_one_shot_collision_fails() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    ticker.start(0, 0, periodic(0, 100, 100, 10, 0), None).unwrap();
    let one_shot = StartParams::new(0, 105).slot(5).timeout(sim::record, 1);
    ticker.start(0, 1, one_shot, done(1)).unwrap();
    sim::pump(&mut ticker);

    assert_eq!(sim::take_done(), [(1, Status::Failure, Reply::None)]);
    assert_eq!(ticker.node(1).map(|n| n.state()), Some(NodeState::Idle));
}

#[test]
fn test_update_onto_taken_slot_fails_one_shot() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    ticker.start(0, 0, periodic(0, 200, 200, 10, 0), None).unwrap();
    let one_shot = StartParams::new(0, 100).slot(10).timeout(sim::record, 1);
    ticker.start(0, 1, one_shot, None).unwrap();
    sim::pump(&mut ticker);

    let update = UpdateParams {
        ticks_drift_plus: 100,
        ..Default::default()
    };
    ticker.update(0, 1, update, done(5)).unwrap();
    sim::pump(&mut ticker);

    assert_eq!(sim::take_done(), [(5, Status::Failure, Reply::None)]);
    assert_eq!(ticker.node(1).map(|n| n.state()), Some(NodeState::Idle));

    sim::advance(&mut ticker, 300);
    assert_eq!(sim::take_fired(), [fired(0, 200, 0)]);
}

#[test]
fn test_forced_update_preempts_incumbent() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    ticker.start(0, 0, periodic(0, 100, 100, 10, 0), None).unwrap();
    ticker.start(0, 1, periodic(0, 300, 300, 10, 1), None).unwrap();
    sim::pump(&mut ticker);
    sim::advance(&mut ticker, 150);

    // Move A onto B's expiry with a higher force
    let update = UpdateParams {
        ticks_drift_plus: 100,
        force: 5,
        ..Default::default()
    };
    ticker.update(0, 0, update, done(0)).unwrap();
    sim::pump(&mut ticker);

    assert_eq!(sim::take_done(), [(0, Status::Success, Reply::None)]);
    assert_eq!(ticker.ticks_current(), 100);
    let order: Vec<(u8, u32)> = ticker.list().iter().collect();
    assert_eq!(order, [(0, 200), (1, 500)]);
    assert_eq!(ticker.node(0).map(|n| n.force()), Some(5));
    assert_eq!(ticker.node(1).map(|n| n.lazy_current()), Some(1));

    // Force lasts one insertion only
    sim::advance(&mut ticker, 150);
    assert_eq!(ticker.node(0).map(|n| n.force()), Some(0));
}

#[test]
fn test_equal_force_never_preempts() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    ticker.start(0, 0, periodic(0, 100, 100, 10, 0), None).unwrap();
    sim::pump(&mut ticker);

    ticker.start(0, 1, periodic(0, 100, 100, 10, 1), None).unwrap();
    sim::pump(&mut ticker);

    let order: Vec<(u8, u32)> = ticker.list().iter().collect();
    assert_eq!(order, [(0, 100), (1, 200)]);
}

// ---------------------------------------------------------------------------
// Operation lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_start_then_stop_returns_to_idle() {
    let mut ticker = TestTicker::new(MockHal::new(500));
    ticker.start(0, 3, periodic(500, 100, 100, 10, 3), done(1)).unwrap();
    sim::pump(&mut ticker);
    assert!(!ticker.is_idle());
    assert!(ticker.hal().running);

    ticker.stop(0, 3, done(2)).unwrap();
    sim::pump(&mut ticker);

    assert!(ticker.is_idle());
    assert!(!ticker.hal().running);
    assert_eq!(ticker.node(3).map(|n| n.state()), Some(NodeState::Idle));
    assert_eq!(
        sim::take_done(),
        [(1, Status::Success, Reply::None), (2, Status::Success, Reply::None)]
    );

    sim::advance(&mut ticker, 1_000);
    assert!(sim::take_fired().is_empty());
}

#[test]
fn test_start_then_stop_restores_populated_list() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    ticker.start(0, 0, periodic(0, 40, 400, 10, 0), None).unwrap();
    ticker.start(0, 2, periodic(0, 90, 400, 10, 2), None).unwrap();
    sim::pump(&mut ticker);
    let before: Vec<(u8, u32)> = ticker.list().iter().collect();
    let compare = ticker.hal().compare;

    ticker.start(0, 1, periodic(0, 60, 400, 0, 1), None).unwrap();
    sim::pump(&mut ticker);
    let during: Vec<(u8, u32)> = ticker.list().iter().collect();
    assert_eq!(during, [(0, 40), (1, 60), (2, 90)]);

    ticker.stop(0, 1, done(1)).unwrap();
    sim::pump(&mut ticker);

    let after: Vec<(u8, u32)> = ticker.list().iter().collect();
    assert_eq!(after, before);
    assert_eq!(before, [(0, 40), (2, 90)]);
    assert_eq!(ticker.hal().compare, compare);
    assert_eq!(sim::take_done(), [(1, Status::Success, Reply::None)]);
}

#[test]
fn test_stop_queued_behind_start_waits_for_it() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    ticker.start(0, 0, periodic(0, 100, 100, 0, 0), done(1)).unwrap();
    ticker.stop(0, 0, done(2)).unwrap();
    sim::pump(&mut ticker);

    assert_eq!(
        sim::take_done(),
        [(1, Status::Success, Reply::None), (2, Status::Success, Reply::None)]
    );
    assert!(ticker.is_idle());
    assert_eq!(ticker.node(0).map(|n| n.state()), Some(NodeState::Idle));
}

#[test]
fn test_ops_on_idle_node() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    let update = UpdateParams {
        ticks_drift_plus: 1,
        ..Default::default()
    };
    ticker.update(0, 2, update, done(1)).unwrap();
    ticker.stop(0, 2, done(2)).unwrap();
    ticker.update(0, 2, UpdateParams::default(), done(3)).unwrap();
    sim::pump(&mut ticker);

    assert_eq!(
        sim::take_done(),
        [
            (1, Status::Failure, Reply::None),
            (2, Status::Success, Reply::None),
            (3, Status::Failure, Reply::None),
        ]
    );
}

#[test]
fn test_start_twice_fails() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    ticker.start(0, 0, periodic(0, 100, 100, 0, 0), done(1)).unwrap();
    sim::pump(&mut ticker);
    ticker.start(1, 0, periodic(0, 100, 100, 0, 0), done(2)).unwrap();
    sim::pump(&mut ticker);

    assert_eq!(
        sim::take_done(),
        [(1, Status::Success, Reply::None), (2, Status::Failure, Reply::None)]
    );
}

#[test]
fn test_queue_full_until_job_runs() {
    let mut ticker: Instance<MockHal, 2, 1, 4> = Instance::new(MockHal::new(0));
    for _ in 0..3 {
        ticker.idle_get(0, None).unwrap();
    }
    assert_eq!(ticker.idle_get(0, None), Err(TickerError::QueueFull));

    sim::pump(&mut ticker);
    assert_eq!(ticker.idle_get(0, None), Ok(()));
}

#[test]
fn test_update_is_drift_neutral() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    ticker.start(0, 0, periodic(0, 100, 100, 0, 0), None).unwrap();
    sim::pump(&mut ticker);
    sim::advance(&mut ticker, 50);

    let plus = UpdateParams {
        ticks_drift_plus: 20,
        ..Default::default()
    };
    ticker.update(0, 0, plus, None).unwrap();
    sim::pump(&mut ticker);
    assert_eq!(ticker.list().iter().next(), Some((0, 120)));
    assert_eq!(ticker.hal().compare, Some(120));

    let minus = UpdateParams {
        ticks_drift_minus: 20,
        ..Default::default()
    };
    ticker.update(0, 0, minus, None).unwrap();
    sim::pump(&mut ticker);
    assert_eq!(ticker.hal().compare, Some(100));

    sim::advance(&mut ticker, 150);
    assert_eq!(sim::take_fired(), [fired(0, 100, 0), fired(0, 200, 0)]);
}

#[test]
fn test_back_to_back_updates_apply_in_order() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    ticker.start(0, 0, periodic(0, 100, 100, 0, 0), None).unwrap();
    sim::pump(&mut ticker);
    sim::advance(&mut ticker, 50);

    let plus = UpdateParams {
        ticks_drift_plus: 20,
        ..Default::default()
    };
    let minus = UpdateParams {
        ticks_drift_minus: 5,
        ..Default::default()
    };
    ticker.update(0, 0, plus, done(1)).unwrap();
    ticker.update(0, 0, minus, done(2)).unwrap();
    sim::pump(&mut ticker);

    assert_eq!(sim::take_done().len(), 2);
    assert_eq!(ticker.hal().compare, Some(115));
}

#[test]
fn test_lazy_update_skips_callbacks() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    ticker.start(0, 0, periodic(0, 100, 100, 0, 0), None).unwrap();
    sim::pump(&mut ticker);
    sim::advance(&mut ticker, 150);

    // Latency of two periods
    let lazy = UpdateParams {
        lazy: 3,
        ..Default::default()
    };
    ticker.update(0, 0, lazy, None).unwrap();
    sim::pump(&mut ticker);
    sim::advance(&mut ticker, 650);
    assert_eq!(
        sim::take_fired(),
        [fired(0, 100, 0), fired(0, 400, 2), fired(0, 700, 2)]
    );

    // Back to every period: rewinding stops one period ahead of now
    let eager = UpdateParams {
        lazy: 1,
        ..Default::default()
    };
    ticker.update(0, 0, eager, None).unwrap();
    sim::pump(&mut ticker);
    sim::advance(&mut ticker, 300);
    assert_eq!(
        sim::take_fired(),
        [fired(0, 900, 1), fired(0, 1_000, 0), fired(0, 1_100, 0)]
    );
}

// ---------------------------------------------------------------------------
// Callbacks submitting operations
// ---------------------------------------------------------------------------

fn nudge_once(expiry: Expiry, requests: &mut dyn Requests, context: usize) {
    sim::log_fired(expiry, context);
    if expiry.lazy == 0 && expiry.ticks_at_expire == 100 {
        let update = UpdateParams {
            ticks_drift_plus: 5,
            ..Default::default()
        };
        requests.update(1, context as u8, update, done(7)).unwrap();
    }
}

fn stop_self(expiry: Expiry, requests: &mut dyn Requests, context: usize) {
    sim::log_fired(expiry, context);
    requests.stop(1, context as u8, done(8)).unwrap();
}

#[test]
fn test_update_from_timeout_lands_after_requeue() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    let params = StartParams::new(0, 100)
        .periodic(100, 0)
        .timeout(nudge_once, 0);
    ticker.start(0, 0, params, None).unwrap();
    sim::pump(&mut ticker);

    sim::advance(&mut ticker, 305);
    assert_eq!(
        sim::take_fired(),
        [fired(0, 100, 0), fired(0, 205, 0), fired(0, 305, 0)]
    );
    assert_eq!(sim::take_done(), [(7, Status::Success, Reply::None)]);
}

#[test]
fn test_stop_from_timeout() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    let params = StartParams::new(0, 100).periodic(100, 0).timeout(stop_self, 4);
    ticker.start(0, 4, params, None).unwrap();
    sim::pump(&mut ticker);

    sim::advance(&mut ticker, 500);
    assert_eq!(sim::take_fired(), [fired(4, 100, 0)]);
    assert_eq!(sim::take_done(), [(8, Status::Success, Reply::None)]);
    assert!(ticker.is_idle());
    assert!(!ticker.hal().running);
}

// ---------------------------------------------------------------------------
// Inquiries
// ---------------------------------------------------------------------------

#[test]
fn test_idle_get() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    ticker.idle_get(1, done(1)).unwrap();
    sim::pump(&mut ticker);

    ticker.start(0, 0, periodic(0, 100, 100, 0, 0), None).unwrap();
    ticker.idle_get(1, done(2)).unwrap();
    sim::pump(&mut ticker);

    assert_eq!(
        sim::take_done(),
        [(1, Status::Success, Reply::Idle(true)), (2, Status::Success, Reply::Idle(false))]
    );
}

#[test]
fn test_next_slot_walk() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    ticker.start(0, 0, periodic(0, 40, 400, 10, 0), None).unwrap();
    ticker.start(0, 1, periodic(0, 60, 400, 0, 1), None).unwrap();
    ticker.start(0, 2, periodic(0, 90, 400, 10, 2), None).unwrap();
    sim::pump(&mut ticker);

    let mut cursor = SlotCursor::START;
    let mut seen = Vec::new();
    for context in 0..3 {
        ticker.next_slot_get(0, cursor, done(context)).unwrap();
        sim::pump(&mut ticker);
        let Some((_, Status::Success, Reply::NextSlot(next))) = sim::take_done().pop() else {
            panic!("no slot reply");
        };
        seen.push((next.id, next.ticks_to_expire));
        cursor = next;
    }

    assert_eq!(seen[0], (Some(0), 40));
    assert_eq!(seen[1], (Some(2), 90));
    assert_eq!(seen[2].0, None);
}

// ---------------------------------------------------------------------------
// Time base
// ---------------------------------------------------------------------------

#[test]
fn test_fractional_period_stays_exact() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    let ticks = us_to_ticks(1_250);
    let params = StartParams::new(0, ticks)
        .periodic(ticks, remainder_from_us(1_250))
        .timeout(sim::record, 0);
    ticker.start(0, 0, params, None).unwrap();
    sim::pump(&mut ticker);

    sim::advance(&mut ticker, 33_000);
    let fired = sim::take_fired();
    // 800 intervals of 1.25 ms make one second
    let last = fired[799].ticks;
    assert!(last.abs_diff(32_768) <= 2, "800th expiry at {last}");
}

#[test]
fn test_counter_wraps() {
    let start = CNTR_MASK - 50;
    let mut ticker = TestTicker::new(MockHal::new(start));
    ticker.start(0, 0, periodic(start, 100, 100, 10, 0), None).unwrap();
    sim::pump(&mut ticker);

    sim::advance(&mut ticker, 250);
    assert_eq!(sim::take_fired(), [fired(0, 49, 0), fired(0, 149, 0)]);
}

#[test]
fn test_late_start_fires_immediately() {
    let mut ticker = TestTicker::new(MockHal::new(1_000));
    // Anchor 200 ticks back with a 150 tick delay: already late
    let params = StartParams::new(800, 150).timeout(sim::record, 0);
    ticker.start(0, 0, params, None).unwrap();
    sim::pump(&mut ticker);

    assert_eq!(ticker.hal().compare, Some(1_002));
    sim::advance(&mut ticker, 2);
    assert_eq!(sim::take_fired(), [fired(0, 950, 0)]);
}

#[test]
fn test_idle_list_rebases_on_counter() {
    let mut ticker = TestTicker::new(MockHal::new(0));
    sim::advance(&mut ticker, 5_000);

    let params = StartParams::new(ticker.ticks_now(), 100).timeout(sim::record, 0);
    ticker.start(0, 0, params, None).unwrap();
    sim::pump(&mut ticker);
    assert_eq!(ticker.ticks_current(), 5_000);

    sim::advance(&mut ticker, 100);
    assert_eq!(sim::take_fired(), [fired(0, 5_100, 0)]);
}
