//! Frame consumer: dedicated reader thread feeding a bounded channel

use crate::error::LinkError;
use ring_buffer::{BufferError, FramedRingBuffer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Tells a [`FrameConsumer`] that no more bytes will reach its buffer.
///
/// The consumer keeps delivering queued frames and exits on the first
/// read that times out afterwards.
#[derive(Debug, Clone)]
pub struct SourceClosed(Arc<AtomicBool>);

impl SourceClosed {
    /// Mark the byte source as finished
    pub fn signal(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Drains complete frames from a [`FramedRingBuffer`] on its own thread.
///
/// `read` has no external cancel, so the thread polls with a timeout and
/// checks its stop and source-closed flags between attempts.
pub struct FrameConsumer {
    stop: Arc<AtomicBool>,
    source_closed: SourceClosed,
    handle: Option<JoinHandle<u64>>,
}

impl FrameConsumer {
    /// Spawn the reader thread and return the receiving end of its frame channel
    pub fn spawn(
        buffer: Arc<FramedRingBuffer>,
        poll_timeout: Duration,
        channel_capacity: usize,
    ) -> Result<(mpsc::Receiver<Vec<u8>>, Self), LinkError> {
        let (tx, rx) = mpsc::channel(channel_capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let source_closed = SourceClosed(Arc::new(AtomicBool::new(false)));

        let handle = {
            let stop = Arc::clone(&stop);
            let closed = Arc::clone(&source_closed.0);
            thread::Builder::new()
                .name("frame-consumer".into())
                .spawn(move || consume(&buffer, &tx, &stop, &closed, poll_timeout))?
        };

        info!(
            "Frame consumer started: poll={:?}, channel={}",
            poll_timeout, channel_capacity
        );
        Ok((
            rx,
            Self {
                stop,
                source_closed,
                handle: Some(handle),
            },
        ))
    }

    /// Ask the thread to exit after its current read attempt
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Handle for the producer side to report end of input
    pub fn source_closed(&self) -> SourceClosed {
        self.source_closed.clone()
    }

    /// Check if the reader thread is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread, wait for it, and return the number of frames delivered
    pub fn join(mut self) -> Result<u64, LinkError> {
        self.stop();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| LinkError::WorkerPanicked("frame-consumer")),
            None => Ok(0),
        }
    }
}

impl Drop for FrameConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn consume(
    buffer: &FramedRingBuffer,
    tx: &mpsc::Sender<Vec<u8>>,
    stop: &AtomicBool,
    source_closed: &AtomicBool,
    poll_timeout: Duration,
) -> u64 {
    let mut delivered = 0;

    while !stop.load(Ordering::Acquire) {
        match buffer.read(Some(poll_timeout)) {
            Ok(frame) => {
                debug!("Delivering {}-byte frame", frame.len());
                if tx.blocking_send(frame).is_err() {
                    debug!("Frame receiver dropped");
                    break;
                }
                delivered += 1;
            }
            Err(BufferError::Timeout(_)) => {
                // Queued frames are returned without waiting, so a timeout
                // after the source closed means nothing complete is left
                if source_closed.load(Ordering::Acquire) {
                    debug!("Byte source closed and no frames pending");
                    break;
                }
            }
            Err(e) => {
                warn!("Frame consumer stopping: {}", e);
                break;
            }
        }
    }

    info!("Frame consumer stopped after {} frames", delivered);
    delivered
}
