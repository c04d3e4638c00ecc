//! Buffer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::buffer::DELIMITER;

/// Framed ring buffer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Storage size in bytes, including the reserved slot
    pub capacity: usize,

    /// Byte value that terminates a frame
    pub delimiter: u8,

    /// Timeout used by `read_default` and the link consumer poll (milliseconds)
    pub read_timeout_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            delimiter: DELIMITER,
            read_timeout_ms: 100,
        }
    }
}

impl BufferConfig {
    /// Small buffer for short command/response links
    pub fn compact() -> Self {
        Self {
            capacity: 256,
            ..Default::default()
        }
    }

    /// Large buffer for bursty high-baud sources
    pub fn bulk() -> Self {
        Self {
            capacity: 64 * 1024,
            read_timeout_ms: 500,
            ..Default::default()
        }
    }

    /// Read timeout as a `Duration`
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
