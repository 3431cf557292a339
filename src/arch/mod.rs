//! # Architecture Abstraction Layer
//!
//! Platform ports implementing [`Hal`](crate::Hal). Currently the nRF52
//! (Cortex-M4F) RTC0 port; other counters plug in as sibling modules.

pub mod cortex_m4;
