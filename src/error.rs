//! Error kinds produced by the flow engine.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Errors the dispatcher can surface to a caller.
///
/// Short reads and partial deferred-writes are *not* represented here —
/// they are normal `Ok` results carrying a byte count, per spec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// `open` was called with an endpoint id that doesn't exist.
    #[error("no such endpoint: {0}")]
    NoSuchDevice(usize),

    /// `open` was called on a disabled endpoint.
    #[error("endpoint {0} is disabled")]
    Disabled(usize),

    /// A non-blocking operation found its resource unavailable.
    #[error("operation would block")]
    WouldBlock,

    /// A write could not reserve capacity within the session timeout.
    #[error("no space available within timeout")]
    NoSpace,

    /// A wait was interrupted by an external cancellation signal.
    #[error("operation interrupted")]
    Interrupted,

    /// A page, staging buffer, or deferred-write job allocation failed.
    #[error("out of memory")]
    OutOfMemory,

    /// The deferred-write scheduler refused to accept a job.
    #[error("deferred-write scheduler unavailable")]
    Unavailable,

    /// An unknown control command, or an argument out of range for a known one.
    #[error("invalid control argument")]
    InvalidArgument,
}
