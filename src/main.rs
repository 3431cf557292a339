//! # Ticker Demo Firmware
//!
//! Runs two slot-reserving periodic nodes on an nRF52's RTC0, shaped like
//! a BLE advertiser sharing the radio with a connection:
//!
//! | Node | Period | Slot | Behaviour |
//! |------|--------|------|-----------|
//! | `NODE_ADV`  | 100 ms   | 2.5 ms | counts events |
//! | `NODE_CONN` | 7.5 ms   | 1.25 ms | counts events, nudges its anchor every 64 events |
//!
//! 100 ms is not a multiple of 7.5 ms, so the two reservations regularly
//! land on each other. The node inserted later slips one period and its
//! next callback reports `lazy = 1`; the slip counter tracks how often.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::{entry, exception};
use panic_halt as _;

use ticker::arch::cortex_m4;
use ticker::config::{USER_ID_THREAD, USER_ID_WORKER};
use ticker::kernel;
use ticker::ticks::{remainder_from_us, us_to_ticks};
use ticker::{Expiry, Requests, StartParams, UpdateParams};

const NODE_ADV: u8 = 0;
const NODE_CONN: u8 = 1;

const ADV_INTERVAL_US: u32 = 100_000;
const ADV_SLOT_US: u32 = 2_500;
const CONN_INTERVAL_US: u32 = 7_500;
const CONN_SLOT_US: u32 = 1_250;

static ADV_EVENTS: AtomicU32 = AtomicU32::new(0);
static CONN_EVENTS: AtomicU32 = AtomicU32::new(0);
static SLIPS: AtomicU32 = AtomicU32::new(0);

// ---------------------------------------------------------------------------
// Timeout callbacks (Worker context)
// ---------------------------------------------------------------------------

fn on_adv(expiry: Expiry, _requests: &mut dyn Requests, _context: usize) {
    ADV_EVENTS.fetch_add(1, Ordering::Relaxed);
    if expiry.lazy != 0 {
        SLIPS.fetch_add(1, Ordering::Relaxed);
    }
}

fn on_conn(expiry: Expiry, requests: &mut dyn Requests, context: usize) {
    let count = CONN_EVENTS.fetch_add(1, Ordering::Relaxed) + 1;
    if expiry.lazy != 0 {
        SLIPS.fetch_add(1, Ordering::Relaxed);
    }

    // Stand-in for a peer clock correction
    if count % 64 == 0 {
        let nudge = UpdateParams {
            ticks_drift_plus: 1,
            ..Default::default()
        };
        let _ = requests.update(USER_ID_WORKER, context as u8, nudge, None);
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().expect("core peripherals taken twice");

    kernel::init(&mut cp.NVIC);

    let now = kernel::ticks_now();

    let adv = StartParams::new(now, us_to_ticks(ADV_INTERVAL_US))
        .periodic(us_to_ticks(ADV_INTERVAL_US), remainder_from_us(ADV_INTERVAL_US))
        .slot(us_to_ticks(ADV_SLOT_US))
        .timeout(on_adv, NODE_ADV as usize);
    kernel::start(USER_ID_THREAD, NODE_ADV, adv, None).expect("Failed to start advertiser");

    let conn = StartParams::new(now, us_to_ticks(CONN_INTERVAL_US))
        .periodic(us_to_ticks(CONN_INTERVAL_US), remainder_from_us(CONN_INTERVAL_US))
        .slot(us_to_ticks(CONN_SLOT_US))
        .timeout(on_conn, NODE_CONN as usize);
    kernel::start(USER_ID_THREAD, NODE_CONN, conn, None).expect("Failed to start connection");

    loop {
        cortex_m::asm::wfi();
    }
}

/// Device interrupts land here without a PAC vector table.
#[exception]
unsafe fn DefaultHandler(irqn: i16) {
    cortex_m4::dispatch(irqn);
}
