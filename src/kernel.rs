//! # Kernel
//!
//! Global ticker instance for the nRF52 port and its public API.
//!
//! The instance lives behind a critical-section mutex. Thread-mode code
//! and the interrupt handlers in [`arch::cortex_m4`](crate::arch::cortex_m4)
//! reach it through [`with`], so submissions and bottom halves are
//! serialised.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()   ← LFCLK, RTC0, NVIC priorities
//!         └─► kernel::start()  ← queue nodes (×N); SWI1 runs the Job
//!                                 which starts RTC0 and arms CC[0]
//! ```
//!
//! Timeout callbacks must use the [`Requests`](crate::Requests) handle they are given
//! rather than these functions: the Worker already holds the instance,
//! and a nested call returns [`TickerError::NotReady`].

use core::cell::RefCell;

use cortex_m::peripheral::NVIC;

use crate::arch::cortex_m4::{self, RtcHal};
use crate::config::{TICKER_NODES, TICKER_USERS, TICKER_USER_OPS};
use crate::error::TickerError;
use crate::instance::Instance;
use crate::sync::{self, Shared};
use crate::user::{Completion, SlotCursor, StartParams, UpdateParams};

/// Instance type of the port.
pub type Ticker = Instance<RtcHal, TICKER_NODES, TICKER_USERS, TICKER_USER_OPS>;

// ---------------------------------------------------------------------------
// Global ticker instance
// ---------------------------------------------------------------------------

static TICKER: Shared<Ticker> = Shared::<Ticker>::new(RefCell::new(None));

/// Run `f` on the global instance inside a critical section.
///
/// Returns `None` before [`init`] or when called from inside `f`.
pub fn with<R>(f: impl FnOnce(&mut Ticker) -> R) -> Option<R> {
    sync::with_shared(&TICKER, f)
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Bring up RTC0 and the global instance, then enable the ticker's
/// interrupts.
///
/// Must be called once from thread mode before any other function here.
pub fn init(nvic: &mut NVIC) {
    let ticker = Ticker::new(RtcHal::new());
    if sync::install(&TICKER, ticker).is_some() {
        warn!("ticker re-initialised");
    }
    cortex_m4::configure_interrupts(nvic);
}

/// Queue a `start`. See [`Requests::start`](crate::Requests::start).
pub fn start(
    user: u8,
    id: u8,
    params: StartParams,
    done: Option<Completion>,
) -> Result<(), TickerError> {
    with(|ticker| ticker.start(user, id, params, done)).unwrap_or(Err(TickerError::NotReady))
}

/// Queue an `update`. See [`Requests::update`](crate::Requests::update).
pub fn update(
    user: u8,
    id: u8,
    params: UpdateParams,
    done: Option<Completion>,
) -> Result<(), TickerError> {
    with(|ticker| ticker.update(user, id, params, done)).unwrap_or(Err(TickerError::NotReady))
}

/// Queue a `stop`. See [`Requests::stop`](crate::Requests::stop).
pub fn stop(user: u8, id: u8, done: Option<Completion>) -> Result<(), TickerError> {
    with(|ticker| ticker.stop(user, id, done)).unwrap_or(Err(TickerError::NotReady))
}

/// Queue a next-slot inquiry. See [`Requests::next_slot_get`](crate::Requests::next_slot_get).
pub fn next_slot_get(
    user: u8,
    cursor: SlotCursor,
    done: Option<Completion>,
) -> Result<(), TickerError> {
    with(|ticker| ticker.next_slot_get(user, cursor, done)).unwrap_or(Err(TickerError::NotReady))
}

/// Queue an idle inquiry. See [`Requests::idle_get`](crate::Requests::idle_get).
pub fn idle_get(user: u8, done: Option<Completion>) -> Result<(), TickerError> {
    with(|ticker| ticker.idle_get(user, done)).unwrap_or(Err(TickerError::NotReady))
}

/// Pend a Job pass on behalf of `user`.
pub fn job_sched(user: u8) {
    with(|ticker| ticker.job_sched(user));
}

/// Current RTC0 counter value. Usable before [`init`] and from callbacks.
pub fn ticks_now() -> u32 {
    cortex_m4::counter()
}
