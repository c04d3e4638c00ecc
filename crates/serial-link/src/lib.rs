//! Serial Frame Link
//!
//! Bridges a raw byte source (a serial port, in production) and
//! consumers that want whole delimiter-terminated frames. Bytes are
//! pumped into a [`FramedRingBuffer`] as they arrive; a dedicated thread
//! pulls complete frames out and hands them over a bounded channel.

mod config;
mod consumer;
mod error;
mod link;
mod pump;
mod stuffing;

pub use self::config::{LinkConfig, ENV_PREFIX};
pub use consumer::{FrameConsumer, SourceClosed};
pub use error::LinkError;
pub use link::{FrameLink, LinkReport};
pub use pump::{BytePump, PumpReport};
pub use ring_buffer::{BufferConfig, BufferError, BufferStats, FramedRingBuffer};
pub use stuffing::{decode_frame, encode_frame};

use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging; `RUST_LOG` overrides the default `info` level
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// Open the configured serial port for async reads
pub fn open_port(config: &LinkConfig) -> Result<SerialStream, LinkError> {
    info!(
        "Opening serial port {} at {} baud",
        config.device, config.baud_rate
    );
    let port = tokio_serial::new(&config.device, config.baud_rate).open_native_async()?;
    Ok(port)
}
