//! # Tick Arithmetic
//!
//! The hardware counter is a 24-bit wrapping up-counter. Every difference
//! and sum of tick values is masked to the counter width, so ordering
//! questions are answered with wraparound-safe subtraction and never with a
//! plain `<` on absolute values.
//!
//! Also provides microsecond conversions for the 32.768 kHz counter. A
//! period that is not a whole number of ticks is expressed as whole ticks
//! plus a remainder in picoseconds; see [`remainder_from_us`].

use crate::config::{CNTR_CLK_UNIT_FSEC, CNTR_MASK, CNTR_MSBIT, FSEC_PER_USEC};

/// Ticks from `ticks_old` to `ticks_now`, modulo the counter width.
#[inline]
pub const fn ticks_diff(ticks_now: u32, ticks_old: u32) -> u32 {
    ticks_now.wrapping_sub(ticks_old) & CNTR_MASK
}

/// Wrapping sum of two tick values.
#[inline]
pub const fn ticks_add(ticks: u32, delta: u32) -> u32 {
    ticks.wrapping_add(delta) & CNTR_MASK
}

/// True if `ticks` lies behind `reference` (within half the counter range).
#[inline]
pub const fn is_behind(ticks: u32, reference: u32) -> bool {
    (ticks.wrapping_sub(reference) & (1 << CNTR_MSBIT)) != 0
}

/// Whole ticks in `us` microseconds (truncated).
pub const fn us_to_ticks(us: u32) -> u32 {
    ((us as u64 * FSEC_PER_USEC / CNTR_CLK_UNIT_FSEC) as u32) & CNTR_MASK
}

/// Picoseconds left over after converting `us` to whole ticks. Pass it as
/// the periodic remainder alongside [`us_to_ticks`] to keep a period exact.
pub const fn remainder_from_us(us: u32) -> u32 {
    let fsec = us as u64 * FSEC_PER_USEC;
    let whole = (us_to_ticks(us) as u64) * CNTR_CLK_UNIT_FSEC;
    ((fsec - whole) / 1_000) as u32
}

/// Microseconds in `ticks` (truncated).
pub const fn ticks_to_us(ticks: u32) -> u32 {
    (ticks as u64 * CNTR_CLK_UNIT_FSEC / FSEC_PER_USEC) as u32
}
