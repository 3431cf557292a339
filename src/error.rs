//! # Status and Errors
//!
//! Every public operation is asynchronous. Submission either rejects the
//! request synchronously with a [`TickerError`], or accepts it (the
//! operation is then *busy*) and later delivers exactly one [`Status`]
//! through the operation's completion callback.

use core::fmt;

/// Outcome of a queued user operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    /// Operation carried out.
    Success,
    /// Operation rejected by the Job: node in an incompatible state, a
    /// no-op update, or an unresolved slot collision.
    Failure,
    /// Accepted and queued, not yet processed by the Job.
    Busy,
}

/// Reasons a request is rejected before it is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickerError {
    /// The user's operation ring has no free slot (`last + 1 == first`).
    QueueFull,
    /// User id outside the instance's user table.
    InvalidUser,
    /// Node id outside the instance's node pool.
    InvalidNode,
    /// The global instance is not initialised, or the calling context
    /// already holds it.
    NotReady,
}

impl fmt::Display for TickerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickerError::QueueFull => f.write_str("user operation queue full"),
            TickerError::InvalidUser => f.write_str("invalid ticker user id"),
            TickerError::InvalidNode => f.write_str("invalid ticker node id"),
            TickerError::NotReady => f.write_str("ticker instance not available"),
        }
    }
}

impl From<TickerError> for Status {
    fn from(_: TickerError) -> Self {
        Status::Failure
    }
}
