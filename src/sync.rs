//! # Synchronization Primitives
//!
//! Interrupt-safe access to state shared between thread mode and the
//! ticker's interrupt handlers. The global instance lives in a
//! [`Shared`] cell; every access goes through a critical section, so the
//! compare ISR, the Worker SWI and the Job SWI never observe each other
//! half-way.

use core::cell::RefCell;

use cortex_m::interrupt::{self, Mutex};

/// A lazily initialised value guarded by a critical section.
pub type Shared<T> = Mutex<RefCell<Option<T>>>;

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and restored on exit. Keep the
/// closure short: a Job pass is the longest thing run under it.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&interrupt::CriticalSection) -> R,
{
    interrupt::free(f)
}

/// Run `f` on the value in `shared`.
///
/// Returns `None` if the value is not initialised yet or is already
/// borrowed further up the current call stack.
///
/// `f` runs with interrupts disabled for its whole duration, so callers
/// holding the value are never preempted by each other.
pub fn with_shared<T, R>(shared: &Shared<T>, f: impl FnOnce(&mut T) -> R) -> Option<R> {
    critical_section(|cs| {
        let mut slot = shared.borrow(cs).try_borrow_mut().ok()?;
        slot.as_mut().map(f)
    })
}

/// Store `value` in `shared`, returning the previous value.
pub fn install<T>(shared: &Shared<T>, value: T) -> Option<T> {
    critical_section(|cs| shared.borrow(cs).replace(Some(value)))
}
