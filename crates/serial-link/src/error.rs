//! Serial Link Error Types

use ring_buffer::BufferError;
use thiserror::Error;

/// Errors that can occur while moving frames across a serial link
#[derive(Debug, Error)]
pub enum LinkError {
    /// Framed ring buffer rejected an operation
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Reading from the byte source failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Frame payload is not valid COBS
    #[error("Frame decode error: {0}")]
    Decode(String),

    /// Background worker panicked
    #[error("Worker panicked: {0}")]
    WorkerPanicked(&'static str),
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}

impl From<tokio_serial::Error> for LinkError {
    fn from(err: tokio_serial::Error) -> Self {
        LinkError::Serial(err.to_string())
    }
}

impl From<config::ConfigError> for LinkError {
    fn from(err: config::ConfigError) -> Self {
        LinkError::Config(err.to_string())
    }
}
