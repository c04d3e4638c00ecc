//! Frame link: byte pump + ring buffer + frame consumer wired together

use crate::config::LinkConfig;
use crate::consumer::FrameConsumer;
use crate::error::LinkError;
use crate::pump::{BytePump, PumpReport};
use crate::stuffing::decode_frame;
use ring_buffer::{BufferStats, FramedRingBuffer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Final totals of a link after shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReport {
    /// Byte pump totals; zeroed after a pump error seen via `next_frame`
    pub pump: PumpReport,
    /// Frames handed to the channel by the consumer thread
    pub frames_delivered: u64,
    /// Counters of the shared ring buffer
    pub buffer: BufferStats,
}

/// A running link from a byte source to a stream of frames
pub struct FrameLink {
    buffer: Arc<FramedRingBuffer>,
    frames: mpsc::Receiver<Vec<u8>>,
    consumer: FrameConsumer,
    /// Taken once the pump finishes and its outcome has been observed
    pump: Option<JoinHandle<Result<PumpReport, LinkError>>>,
    pump_report: Option<PumpReport>,
    shutdown: watch::Sender<bool>,
    cobs: bool,
}

impl FrameLink {
    /// Start pumping `source` into a new buffer and consuming frames from it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<R>(source: R, config: &LinkConfig) -> Result<Self, LinkError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        config.validate()?;
        let buffer = Arc::new(FramedRingBuffer::from_config(&config.buffer)?);

        let (frames, consumer) = FrameConsumer::spawn(
            Arc::clone(&buffer),
            config.buffer.read_timeout(),
            config.channel_capacity,
        )?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let pump = BytePump::from_config(Arc::clone(&buffer), config);
        let closed = consumer.source_closed();
        let pump = tokio::spawn(async move {
            let result = pump.run(source, shutdown_rx).await;
            closed.signal();
            result
        });

        info!(
            "Frame link started: capacity={}, cobs={}",
            config.buffer.capacity, config.cobs
        );
        Ok(Self {
            buffer,
            frames,
            consumer,
            pump: Some(pump),
            pump_report: None,
            shutdown,
            cobs: config.cobs,
        })
    }

    /// Shared buffer between the pump and the consumer
    pub fn buffer(&self) -> &Arc<FramedRingBuffer> {
        &self.buffer
    }

    /// Wait for the next frame, COBS-decoded if the link is configured for it.
    ///
    /// When the byte source ends, the frames still in the buffer are
    /// delivered first. After that a read error from the source is
    /// returned once, then every call yields `None`. A trailing partial
    /// frame is never delivered.
    pub async fn next_frame(&mut self) -> Option<Result<Vec<u8>, LinkError>> {
        if let Some(frame) = self.frames.recv().await {
            return Some(if self.cobs {
                decode_frame(&frame)
            } else {
                Ok(frame)
            });
        }

        // Consumer is gone; the pump has finished or is about to
        match self.pump.take()?.await {
            Ok(Ok(report)) => {
                debug!("Link drained after {} bytes", report.bytes_read);
                self.pump_report = Some(report);
                None
            }
            Ok(Err(e)) => {
                warn!("Byte source failed: {}", e);
                Some(Err(e))
            }
            Err(_) => Some(Err(LinkError::WorkerPanicked("byte-pump"))),
        }
    }

    /// Stop the pump and the consumer and collect their totals.
    ///
    /// Frames still queued in the channel are discarded. A pump error
    /// already returned by [`next_frame`](Self::next_frame) is not
    /// reported again.
    pub async fn shutdown(self) -> Result<LinkReport, LinkError> {
        let Self {
            buffer,
            frames,
            consumer,
            pump,
            pump_report,
            shutdown,
            ..
        } = self;

        // The pump may already have hit EOF and dropped its receiver
        let _ = shutdown.send(true);
        let pump = match pump {
            Some(handle) => handle
                .await
                .map_err(|_| LinkError::WorkerPanicked("byte-pump"))??,
            None => pump_report.unwrap_or_default(),
        };

        // Unblocks a consumer stuck on a full channel
        drop(frames);
        let frames_delivered = tokio::task::spawn_blocking(move || consumer.join())
            .await
            .map_err(|_| LinkError::WorkerPanicked("frame-consumer"))??;

        let report = LinkReport {
            pump,
            frames_delivered,
            buffer: buffer.stats(),
        };
        info!("Frame link shut down: {:?}", report);
        Ok(report)
    }
}
