//! Framed Ring Buffer
//!
//! Fixed-capacity circular byte buffer shared between a producer that
//! appends raw bytes and consumers that block until a complete
//! delimiter-terminated frame is available.
//!
//! One slot of the storage is always kept free so that an empty buffer
//! (`start == end`) can be told apart from a full one.

mod buffer;
mod config;
mod error;

pub use buffer::{BufferState, BufferStats, FramedRingBuffer, DEFAULT_READ_TIMEOUT, DELIMITER};
pub use config::BufferConfig;
pub use error::BufferError;
