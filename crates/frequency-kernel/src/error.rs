//! Error types reported by the pool and by actor calls.

use thiserror::Error;

use crate::pool::Frequency;

/// Typed failures of pool operations.
///
/// None of these are fatal: the allocator reports them to the caller and
/// keeps serving.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Every frequency is currently assigned
    #[error("no frequency available")]
    NoResource,

    /// Release of a frequency the caller does not hold
    #[error("frequency {0} is not allocated to the caller")]
    NotAllocated(Frequency),

    /// The configured universe lists a frequency twice
    #[error("frequency {0} listed more than once")]
    DuplicateFrequency(Frequency),
}

/// Failure to complete a call against another actor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The well-known name did not resolve, or the callee dropped the request
    #[error("{name} is unreachable")]
    Unreachable { name: String },
}
