//! Byte pump: moves raw bytes from a source into the ring buffer

use crate::config::LinkConfig;
use crate::error::LinkError;
use ring_buffer::{BufferError, FramedRingBuffer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Upper bound on a single read from the byte source
const MAX_CHUNK: usize = 4096;

/// Totals reported when the pump stops
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpReport {
    /// Bytes read from the source
    pub bytes_read: u64,
    /// Bytes discarded because the buffer stayed full
    pub bytes_dropped: u64,
    /// Chunks discarded because the buffer stayed full
    pub chunks_dropped: u64,
}

/// Resynchronization state carried between chunks
#[derive(Debug, Default)]
struct PumpState {
    report: PumpReport,
    /// Input is mid-frame after a drop; skip through the next delimiter
    resyncing: bool,
    /// Last accepted byte was not a delimiter
    tail_open: bool,
    /// A frame left open in the buffer by a drop still needs terminating
    close_tail: bool,
}

/// Reads a byte source in order and appends everything to the buffer.
///
/// `extend` never blocks, so a full buffer is handled here: the chunk is
/// retried a few times to give consumers a chance to drain, then dropped.
///
/// After a drop the pump skips input up to and including the next
/// delimiter, so the remainder of a torn frame is never glued onto the
/// following one. Skipped bytes count as dropped. If the buffer already
/// held the start of the torn frame, that start is terminated with a
/// delimiter and delivered as a truncated frame.
pub struct BytePump {
    buffer: Arc<FramedRingBuffer>,
    max_retries: u8,
    retry_backoff: Duration,
}

impl BytePump {
    /// Create a new byte pump
    pub fn new(buffer: Arc<FramedRingBuffer>, max_retries: u8, retry_backoff: Duration) -> Self {
        Self {
            buffer,
            max_retries,
            retry_backoff,
        }
    }

    /// Create a byte pump with retry settings from `config`
    pub fn from_config(buffer: Arc<FramedRingBuffer>, config: &LinkConfig) -> Self {
        Self::new(buffer, config.max_retries, config.retry_backoff())
    }

    /// Run until the source reaches EOF or `shutdown` changes
    pub async fn run<R>(
        &self,
        mut reader: R,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<PumpReport, LinkError>
    where
        R: AsyncRead + Unpin,
    {
        info!("Starting byte pump");
        let mut state = PumpState::default();
        let mut chunk = vec![0u8; self.buffer.usable_capacity().min(MAX_CHUNK)];

        while !*shutdown.borrow() {
            let n = tokio::select! {
                read = reader.read(&mut chunk) => read?,
                _ = shutdown.changed() => {
                    debug!("Byte pump shutdown requested");
                    break;
                }
            };

            if n == 0 {
                info!("Byte source closed");
                break;
            }

            state.report.bytes_read += n as u64;
            self.push_chunk(&chunk[..n], &mut state).await;
        }

        let report = state.report;
        info!(
            "Byte pump stopped: read={}, dropped={}",
            report.bytes_read, report.bytes_dropped
        );
        Ok(report)
    }

    async fn push_chunk(&self, mut bytes: &[u8], state: &mut PumpState) {
        let delimiter = self.buffer.delimiter();

        if state.resyncing {
            match bytes.iter().position(|&b| b == delimiter) {
                Some(pos) => {
                    debug!("Resynchronized after skipping {} bytes", pos + 1);
                    state.report.bytes_dropped += (pos + 1) as u64;
                    state.resyncing = false;
                    bytes = &bytes[pos + 1..];
                }
                None => {
                    state.report.bytes_dropped += bytes.len() as u64;
                    return;
                }
            }
        }

        if state.close_tail && self.extend_with_retry(&[delimiter]).await.is_ok() {
            state.close_tail = false;
            state.tail_open = false;
        }

        if bytes.is_empty() {
            return;
        }

        match self.extend_with_retry(bytes).await {
            Ok(()) => state.tail_open = bytes.last() != Some(&delimiter),
            Err(e) => {
                warn!("Dropping {} bytes: {}", bytes.len(), e);
                state.report.bytes_dropped += bytes.len() as u64;
                state.report.chunks_dropped += 1;
                state.resyncing = bytes.last() != Some(&delimiter);
                state.close_tail |= state.tail_open;
            }
        }
    }

    async fn extend_with_retry(&self, bytes: &[u8]) -> Result<(), BufferError> {
        let mut attempts = 0;
        loop {
            match self.buffer.extend(bytes) {
                Ok(()) => return Ok(()),
                Err(BufferError::Overflow { size, capacity, .. })
                    if attempts < self.max_retries =>
                {
                    attempts += 1;
                    debug!(
                        "Buffer full ({}/{}), retry {} in {:?}",
                        size, capacity, attempts, self.retry_backoff
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pump_copies_source() {
        let buffer = Arc::new(FramedRingBuffer::new(64).unwrap());
        let pump = BytePump::new(Arc::clone(&buffer), 0, Duration::ZERO);
        let (_tx, rx) = watch::channel(false);

        let report = pump.run(&b"one\0two\0thr"[..], rx).await.unwrap();

        assert_eq!(report.bytes_read, 11);
        assert_eq!(report.bytes_dropped, 0);
        assert_eq!(buffer.try_read().unwrap(), b"one");
        assert_eq!(buffer.try_read().unwrap(), b"two");
        assert_eq!(buffer.size(), 3);
    }

    #[tokio::test]
    async fn test_pump_drops_chunks_that_never_fit() {
        let buffer = Arc::new(FramedRingBuffer::new(8).unwrap());
        let pump = BytePump::new(Arc::clone(&buffer), 0, Duration::ZERO);
        let (_tx, rx) = watch::channel(false);

        // Reads in 7-byte chunks: the first fits, the second overflows and
        // the undelimited tail is skipped while resynchronizing
        let report = pump.run(&b"0123456789abcdef"[..], rx).await.unwrap();

        assert_eq!(report.bytes_read, 16);
        assert_eq!(report.bytes_dropped, 9);
        assert_eq!(report.chunks_dropped, 1);
        assert_eq!(buffer.size(), 7);
        assert_eq!(buffer.index(0).unwrap(), b'0');
    }

    #[tokio::test]
    async fn test_dropped_chunk_does_not_merge_frames() {
        let buffer = Arc::new(FramedRingBuffer::new(8).unwrap());
        let pump = BytePump::new(Arc::clone(&buffer), 0, Duration::ZERO);
        let mut state = PumpState::default();

        pump.push_chunk(b"abcd\0ef", &mut state).await;
        // Overflows and tears the frame that started with "ef"
        pump.push_chunk(b"ghij\0kl", &mut state).await;
        assert_eq!(buffer.try_read().unwrap(), b"abcd");

        pump.push_chunk(b"mn\0op\0", &mut state).await;

        // "ef" is closed as a truncated frame and "mn" is skipped
        assert_eq!(buffer.try_read().unwrap(), b"ef");
        assert_eq!(buffer.try_read().unwrap(), b"op");
        assert!(buffer.is_empty());
        assert_eq!(state.report.bytes_dropped, 10);
        assert_eq!(state.report.chunks_dropped, 1);
    }

    #[tokio::test]
    async fn test_drop_on_frame_boundary_needs_no_resync() {
        let buffer = Arc::new(FramedRingBuffer::new(8).unwrap());
        let pump = BytePump::new(Arc::clone(&buffer), 0, Duration::ZERO);
        let mut state = PumpState::default();

        pump.push_chunk(b"xyz\0", &mut state).await;
        pump.push_chunk(b"abcdef\0", &mut state).await;
        pump.push_chunk(b"gh\0", &mut state).await;

        assert_eq!(buffer.try_read().unwrap(), b"xyz");
        assert_eq!(buffer.try_read().unwrap(), b"gh");
        assert_eq!(state.report.bytes_dropped, 7);
        assert_eq!(state.report.chunks_dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pump_retries_while_consumer_drains() {
        let buffer = Arc::new(FramedRingBuffer::new(8).unwrap());
        buffer.extend(b"abc\0").unwrap();

        let drain = {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                buffer.try_read()
            })
        };

        let pump = BytePump::new(Arc::clone(&buffer), 3, Duration::from_millis(10));
        let (_tx, rx) = watch::channel(false);
        let report = pump.run(&b"defgh"[..], rx).await.unwrap();

        assert_eq!(drain.await.unwrap().unwrap(), b"abc");
        assert_eq!(report.bytes_dropped, 0);
        assert_eq!(buffer.size(), 5);
    }

    #[tokio::test]
    async fn test_pump_stops_on_shutdown() {
        let buffer = Arc::new(FramedRingBuffer::new(64).unwrap());
        let pump = BytePump::new(Arc::clone(&buffer), 0, Duration::ZERO);
        let (tx, rx) = watch::channel(false);

        // Source that never produces data nor closes
        let (_device, host) = tokio::io::duplex(16);
        let handle = tokio::spawn(async move { pump.run(host, rx).await });

        tx.send(true).unwrap();
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report, PumpReport::default());
    }
}
