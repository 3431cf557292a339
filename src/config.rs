//! # Ticker Configuration
//!
//! Compile-time constants describing the hardware counter and bounding
//! the scheduler's internal work. Pool sizes (nodes, users, operations per
//! user) are const generics on [`Instance`](crate::Instance) so that
//! several differently-sized instances can coexist; the `TICKER_*` sizes
//! below only shape the global instance of the Cortex-M port.

/// Width of the hardware tick counter in bits. The nRF RTC is 24 bits.
pub const CNTR_BITS: u32 = 24;

/// Mask applied after every tick addition or subtraction.
pub const CNTR_MASK: u32 = (1 << CNTR_BITS) - 1;

/// Most significant bit of the counter. A set MSB in a masked difference
/// means "behind" rather than "ahead".
pub const CNTR_MSBIT: u32 = CNTR_BITS - 1;

/// Counter input clock (LFCLK) in Hz.
pub const CNTR_CLK_FREQ_HZ: u32 = 32_768;

/// Duration of one counter tick in femtoseconds (1 / 32768 Hz).
pub const CNTR_CLK_UNIT_FSEC: u64 = 30_517_578_125;

/// Femtoseconds per microsecond.
pub const FSEC_PER_USEC: u64 = 1_000_000_000;

/// Picoseconds per microsecond. Remainders are kept in picoseconds.
pub const PSEC_PER_USEC: u64 = 1_000_000;

/// Fixed-point scale of the sub-tick remainder: one whole tick expressed
/// in picoseconds. An accumulated remainder above half of this is folded
/// into one extra tick.
pub const REMAINDER_RANGE: u32 = (CNTR_CLK_UNIT_FSEC / 1_000) as u32;

/// Minimum number of ticks a compare value must lie ahead of the counter
/// for the match to be guaranteed to fire.
pub const CNTR_CMP_OFFSET_MIN: u32 = 2;

/// Ticks between writing the compare register and the write taking effect.
pub const CNTR_SET_LATENCY: u32 = 0;

/// Upper bound on compare-register write attempts in one Job pass.
/// Exceeding it means the Job is being starved and the timer can no
/// longer be armed reliably.
pub const COMPARE_RETRY_MAX: u32 = 10;

/// Depth of the Worker → Job elapsed-ticks handoff queue.
pub const ELAPSED_QUEUE_SIZE: usize = 2;

// ---------------------------------------------------------------------------
// Cortex-M port
// ---------------------------------------------------------------------------

/// Nodes in the global instance.
pub const TICKER_NODES: usize = 8;

/// Users of the global instance, one per execution context.
pub const TICKER_USERS: usize = 3;

/// Operation ring slots per user.
pub const TICKER_USER_OPS: usize = 4;

/// User id for thread mode (application code).
pub const USER_ID_THREAD: u8 = 0;

/// User id for timeout callbacks running in the Worker.
pub const USER_ID_WORKER: u8 = 1;

/// User id for code running in the Job's context.
pub const USER_ID_JOB: u8 = 2;

/// NVIC priority of the RTC compare interrupt and the Worker SWI.
/// The nRF52 implements 3 priority bits (7:5).
pub const WORKER_PRIORITY: u8 = 0 << 5;

/// NVIC priority of the Job SWI. Lower than the Worker.
pub const JOB_PRIORITY: u8 = 1 << 5;
