//! # nRF52 Port Layer
//!
//! Register-level [`Hal`] for the nRF52 RTC0 running off the 32.768 kHz
//! LFCLK, plus the interrupt wiring of the ticker's three entry points:
//!
//! | Interrupt | IRQ | Runs |
//! |-----------|-----|------|
//! | RTC0      | 11  | [`Instance::trigger`](crate::Instance::trigger) on compare match |
//! | SWI0      | 20  | Worker |
//! | SWI1      | 21  | Job |
//!
//! Bottom halves are always pended, never run inline: the caller holds
//! the global instance and a nested call could not borrow it.
//!
//! Each handler runs its whole pass inside [`kernel::with`], i.e. with
//! interrupts disabled. The Worker therefore never preempts a Job pass on
//! this port and the `job_guard` / `worker_trigger` handoff stays unused
//! here. A compare match arriving during a Job pass waits for that pass
//! to finish, so worst-case expiry latency is one Job pass plus the
//! Worker.

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::NVIC;

use crate::config::{CNTR_MASK, JOB_PRIORITY, USER_ID_JOB, USER_ID_WORKER, WORKER_PRIORITY};
use crate::hal::{CallId, Hal};
use crate::kernel;

// ---------------------------------------------------------------------------
// Registers
// ---------------------------------------------------------------------------

const CLOCK_BASE: usize = 0x4000_0000;
const CLOCK_TASKS_LFCLKSTART: usize = 0x008;
const CLOCK_EVENTS_LFCLKSTARTED: usize = 0x104;
const CLOCK_LFCLKSRC: usize = 0x518;

/// LFCLKSRC value selecting the 32.768 kHz crystal.
const LFCLKSRC_XTAL: u32 = 1;

const RTC0_BASE: usize = 0x4000_B000;
const RTC_TASKS_START: usize = 0x000;
const RTC_TASKS_STOP: usize = 0x004;
const RTC_TASKS_CLEAR: usize = 0x008;
const RTC_EVENTS_COMPARE0: usize = 0x140;
const RTC_INTENSET: usize = 0x304;
const RTC_EVTENSET: usize = 0x344;
const RTC_COUNTER: usize = 0x504;
const RTC_PRESCALER: usize = 0x508;
const RTC_CC0: usize = 0x540;

/// COMPARE[0] bit in INTENSET / EVTENSET.
const RTC_COMPARE0_MASK: u32 = 1 << 16;

#[inline]
fn reg_read(base: usize, offset: usize) -> u32 {
    // SAFETY: fixed, aligned peripheral register address
    unsafe { core::ptr::read_volatile((base + offset) as *const u32) }
}

#[inline]
fn reg_write(base: usize, offset: usize, value: u32) {
    // SAFETY: fixed, aligned peripheral register address
    unsafe { core::ptr::write_volatile((base + offset) as *mut u32, value) }
}

// ---------------------------------------------------------------------------
// Interrupt numbers
// ---------------------------------------------------------------------------

/// nRF52 device interrupts used by the ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Irq {
    Rtc0 = 11,
    /// Worker bottom half.
    Swi0 = 20,
    /// Job bottom half.
    Swi1 = 21,
}

// SAFETY: the discriminants are valid nRF52 IRQ numbers
unsafe impl InterruptNumber for Irq {
    #[inline]
    fn number(self) -> u16 {
        self as u16
    }
}

// ---------------------------------------------------------------------------
// Counter HAL
// ---------------------------------------------------------------------------

/// RTC0 as the ticker's counter and compare channel.
pub struct RtcHal {
    running: bool,
}

impl RtcHal {
    /// Start the LFCLK and configure RTC0 at 32.768 kHz with the compare
    /// interrupt enabled. The counter is left stopped and cleared.
    pub fn new() -> Self {
        reg_write(CLOCK_BASE, CLOCK_LFCLKSRC, LFCLKSRC_XTAL);
        reg_write(CLOCK_BASE, CLOCK_EVENTS_LFCLKSTARTED, 0);
        reg_write(CLOCK_BASE, CLOCK_TASKS_LFCLKSTART, 1);
        while reg_read(CLOCK_BASE, CLOCK_EVENTS_LFCLKSTARTED) == 0 {}

        reg_write(RTC0_BASE, RTC_TASKS_STOP, 1);
        reg_write(RTC0_BASE, RTC_TASKS_CLEAR, 1);
        reg_write(RTC0_BASE, RTC_PRESCALER, 0);
        reg_write(RTC0_BASE, RTC_EVTENSET, RTC_COMPARE0_MASK);
        reg_write(RTC0_BASE, RTC_INTENSET, RTC_COMPARE0_MASK);

        Self { running: false }
    }
}

impl Default for RtcHal {
    fn default() -> Self {
        Self::new()
    }
}

impl Hal for RtcHal {
    fn ticks_now(&self) -> u32 {
        counter()
    }

    fn compare_set(&mut self, value: u32) {
        reg_write(RTC0_BASE, RTC_CC0, value & CNTR_MASK);
    }

    fn counter_start(&mut self) -> bool {
        if self.running {
            return false;
        }
        reg_write(RTC0_BASE, RTC_TASKS_START, 1);
        self.running = true;
        true
    }

    fn counter_stop(&mut self) -> bool {
        if !self.running {
            return false;
        }
        reg_write(RTC0_BASE, RTC_TASKS_STOP, 1);
        self.running = false;
        true
    }

    fn schedule(&mut self, _caller: CallId, callee: CallId, _chain: bool) {
        match callee {
            CallId::Worker => NVIC::pend(Irq::Swi0),
            CallId::Job => NVIC::pend(Irq::Swi1),
            CallId::Trigger | CallId::User(_) => {}
        }
    }

    fn caller_id(&self, user: u8) -> CallId {
        match user {
            USER_ID_WORKER => CallId::Worker,
            USER_ID_JOB => CallId::Job,
            _ => CallId::User(user),
        }
    }
}

/// Current RTC0 counter value.
#[inline]
pub fn counter() -> u32 {
    reg_read(RTC0_BASE, RTC_COUNTER) & CNTR_MASK
}

// ---------------------------------------------------------------------------
// Interrupt configuration
// ---------------------------------------------------------------------------

/// Set priorities and unmask RTC0 and the two bottom-half SWIs.
///
/// RTC0 and the Worker share a priority level; the Job runs below them.
pub fn configure_interrupts(nvic: &mut NVIC) {
    // SAFETY: called once during init, before the ticker has any node
    unsafe {
        nvic.set_priority(Irq::Rtc0, WORKER_PRIORITY);
        nvic.set_priority(Irq::Swi0, WORKER_PRIORITY);
        nvic.set_priority(Irq::Swi1, JOB_PRIORITY);
        NVIC::unmask(Irq::Rtc0);
        NVIC::unmask(Irq::Swi0);
        NVIC::unmask(Irq::Swi1);
    }
}

// ---------------------------------------------------------------------------
// Interrupt handlers
// ---------------------------------------------------------------------------

/// RTC0 compare match.
pub fn on_rtc_compare() {
    reg_write(RTC0_BASE, RTC_EVENTS_COMPARE0, 0);
    // Read back so the event clear lands before the handler returns
    let _ = reg_read(RTC0_BASE, RTC_EVENTS_COMPARE0);
    kernel::with(|ticker| ticker.trigger());
}

/// Worker SWI.
pub fn on_worker() {
    kernel::with(|ticker| ticker.worker());
}

/// Job SWI.
pub fn on_job() {
    kernel::with(|ticker| ticker.job());
}

/// Route a device interrupt to its ticker handler. Call from the
/// runtime's default handler with the IRQ number.
pub fn dispatch(irqn: i16) {
    match irqn {
        n if n == Irq::Rtc0 as i16 => on_rtc_compare(),
        n if n == Irq::Swi0 as i16 => on_worker(),
        n if n == Irq::Swi1 as i16 => on_job(),
        _ => {}
    }
}
