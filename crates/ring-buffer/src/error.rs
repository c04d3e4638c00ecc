//! Ring Buffer Error Types

use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`crate::FramedRingBuffer`] operations.
///
/// Every failing call leaves the buffer exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Capacity too small to hold any byte
    #[error("Invalid capacity {0}: at least 2 bytes are required")]
    InvalidArgument(usize),

    /// Extending would fill the reserved slot
    #[error("Extending by {requested} bytes would exceed capacity ({size} of {capacity} occupied)")]
    Overflow {
        requested: usize,
        size: usize,
        capacity: usize,
    },

    /// Peek past the occupied range
    #[error("Index {pos} out of range for buffer of size {size}")]
    OutOfRange { pos: usize, size: usize },

    /// No complete frame arrived in time
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),
}
