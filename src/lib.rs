//! # Ticker — Slot-Reserving Event Scheduler
//!
//! A software event scheduler for time-critical radio work on
//! microcontrollers, driven by a single 24-bit hardware tick counter and
//! its compare channel.
//!
//! ## Overview
//!
//! Nodes are one-shot or periodic events. Each expiry calls the node's
//! timeout callback and may reserve an exclusive *slot* of airtime
//! following it. The ticker guarantees:
//!
//! - **Ordered expiry**: nodes fire in expiry order, on the counter tick
//!   they were scheduled for (sub-tick periods are tracked exactly).
//! - **No overlapping slots**: a node whose slot would overlap another
//!   is moved to its next period (and reports the skip), preempts a
//!   lower-`force` incumbent, or fails if it is one-shot.
//! - **Lock-free submission**: every caller context owns a private
//!   operation ring; only the Job touches the list.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                Users (thread, callbacks)               │
//! │     start · update · stop · next_slot_get · idle_get   │
//! ├────────────────────────────────────────────────────────┤
//! │             Instance API (instance.rs)                 │
//! │      one op ring per user (user.rs) · Requests         │
//! ├──────────────────────────┬─────────────────────────────┤
//! │  Worker (worker.rs)      │  Job (job.rs)               │
//! │  ─ fire due callbacks    │  ─ apply update / stop      │
//! │  ─ hand off elapsed      │  ─ requeue periodic nodes   │
//! │                          │  ─ insert, resolve slots    │
//! │                          │  ─ answer inquiries         │
//! │                          │  ─ arm compare              │
//! ├──────────────────────────┴─────────────────────────────┤
//! │   Node store (list.rs, node.rs) · tick math (ticks.rs) │
//! ├────────────────────────────────────────────────────────┤
//! │   Hal trait (hal.rs) ◄── nRF52 RTC0 port (arch/)       │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Execution Model
//!
//! The compare-match interrupt calls [`Instance::trigger`], which asks the
//! [`Hal`] to run [`Instance::worker`]. The Worker fires expired nodes and
//! asks for [`Instance::job`], which re-links them and re-arms the
//! compare. A `req`/`ack` counter pair per node lets the two run at
//! different interrupt priorities without a lock.
//!
//! ## Memory Model
//!
//! - **No heap**: all state is inline in the [`Instance`]
//! - **Fixed pools**: node, user and op counts are const generics
//! - **Critical sections**: the Cortex-M port keeps the global instance
//!   in a `cortex_m::interrupt::Mutex`

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod error;
pub mod hal;
pub mod instance;
pub mod job;
pub mod list;
pub mod node;
pub mod ticks;
pub mod user;
pub mod worker;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod arch;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod kernel;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod sync;

#[cfg(test)]
mod sim;
#[cfg(test)]
mod tests;

pub use error::{Status, TickerError};
pub use hal::{CallId, Hal};
pub use instance::{Instance, Requests};
pub use list::{Collision, NodeList};
pub use node::{Expiry, Node, NodeState, TimeoutFn};
pub use user::{Completion, OpFn, Reply, SlotCursor, StartParams, UpdateParams, User};
