//! Framed Ring Buffer Implementation

use crate::config::BufferConfig;
use crate::error::BufferError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, trace};

/// Default frame delimiter (the all-zero byte)
pub const DELIMITER: u8 = 0x00;

/// Timeout used by [`FramedRingBuffer::read_default`] unless configured (0.1s)
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Logical state of the buffer, derived from size and pending boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferState {
    /// No bytes stored
    Empty,
    /// Bytes stored but no complete frame yet
    Partial,
    /// At least one complete frame queued
    Ready,
}

/// Snapshot of buffer activity counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferStats {
    /// Bytes accepted by `extend`
    pub bytes_written: u64,
    /// Frames handed out by `read`/`try_read`
    pub frames_read: u64,
    /// `extend` calls rejected for lack of space
    pub overflows: u64,
    /// `read` calls that gave up waiting
    pub timeouts: u64,
}

/// Activity counters, kept outside the lock
#[derive(Default)]
struct Counters {
    bytes_written: AtomicU64,
    frames_read: AtomicU64,
    overflows: AtomicU64,
    timeouts: AtomicU64,
}

/// Storage, cursors and boundary queue; only touched under the lock
struct Inner {
    storage: Box<[u8]>,
    start: usize,
    end: usize,
    /// Absolute offsets of unread delimiters, oldest first
    boundaries: VecDeque<usize>,
}

impl Inner {
    fn capacity(&self) -> usize {
        self.storage.len()
    }

    fn wrap(&self, base: usize, pos: usize) -> usize {
        (base + pos) % self.capacity()
    }

    fn distance(&self, from: usize, to: usize) -> usize {
        if from <= to {
            to - from
        } else {
            to + self.capacity() - from
        }
    }

    fn size(&self) -> usize {
        self.distance(self.start, self.end)
    }

    /// Pop the oldest complete frame, consuming its delimiter
    fn pop_frame(&mut self) -> Option<Vec<u8>> {
        let boundary = self.boundaries.pop_front()?;
        let frame_len = self.distance(self.start, boundary);

        let mut frame = Vec::with_capacity(frame_len);
        let head = (self.capacity() - self.start).min(frame_len);
        frame.extend_from_slice(&self.storage[self.start..self.start + head]);
        frame.extend_from_slice(&self.storage[..frame_len - head]);

        self.start = self.wrap(self.start, frame_len + 1);
        Some(frame)
    }
}

/// Fixed-capacity byte ring buffer that hands out delimiter-terminated frames.
///
/// Producers append with [`extend`](Self::extend), which never blocks and
/// rejects writes that do not fit. Consumers call [`read`](Self::read),
/// which blocks until a delimiter has been written and returns the bytes
/// before it. Frames come out in the order their delimiters went in.
///
/// The delimiter is not escaped: a payload byte equal to it ends the frame.
/// Senders that need arbitrary payloads must stuff them (e.g. COBS) first.
pub struct FramedRingBuffer {
    inner: Mutex<Inner>,
    /// Signalled when the boundary queue gains entries
    frame_ready: Condvar,
    capacity: usize,
    delimiter: u8,
    read_timeout: Duration,
    counters: Counters,
}

impl FramedRingBuffer {
    /// Create a buffer of `capacity` bytes using the default delimiter.
    ///
    /// One byte is reserved, so at most `capacity - 1` bytes can be stored.
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        Self::with_delimiter(capacity, DELIMITER)
    }

    /// Create a buffer that terminates frames on `delimiter`
    pub fn with_delimiter(capacity: usize, delimiter: u8) -> Result<Self, BufferError> {
        if capacity < 2 {
            return Err(BufferError::InvalidArgument(capacity));
        }
        debug!(
            "Creating framed ring buffer: capacity={}, delimiter={:#04x}",
            capacity, delimiter
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                storage: vec![0; capacity].into_boxed_slice(),
                start: 0,
                end: 0,
                boundaries: VecDeque::new(),
            }),
            frame_ready: Condvar::new(),
            capacity,
            delimiter,
            read_timeout: DEFAULT_READ_TIMEOUT,
            counters: Counters::default(),
        })
    }

    /// Create a buffer from configuration
    pub fn from_config(config: &BufferConfig) -> Result<Self, BufferError> {
        let mut buffer = Self::with_delimiter(config.capacity, config.delimiter)?;
        buffer.read_timeout = config.read_timeout();
        Ok(buffer)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Critical sections never leave Inner half-updated, so a poisoned
        // lock still guards consistent data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Total storage size, including the reserved slot
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Maximum number of bytes that can be stored at once
    pub fn usable_capacity(&self) -> usize {
        self.capacity() - 1
    }

    /// Frame delimiter byte
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Timeout applied by [`read_default`](Self::read_default)
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Number of stored, unread bytes
    pub fn size(&self) -> usize {
        self.lock().size()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of complete frames waiting to be read
    pub fn pending_frames(&self) -> usize {
        self.lock().boundaries.len()
    }

    /// Current logical state
    pub fn state(&self) -> BufferState {
        let inner = self.lock();
        if !inner.boundaries.is_empty() {
            BufferState::Ready
        } else if inner.size() > 0 {
            BufferState::Partial
        } else {
            BufferState::Empty
        }
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        let inner = self.lock();
        inner.size() as f64 / inner.capacity() as f64
    }

    /// Byte at logical offset `pos` from the oldest unread byte, without consuming it
    pub fn index(&self, pos: usize) -> Result<u8, BufferError> {
        let inner = self.lock();
        let size = inner.size();
        if pos >= size {
            return Err(BufferError::OutOfRange { pos, size });
        }
        Ok(inner.storage[inner.wrap(inner.start, pos)])
    }

    /// Append raw bytes, recording the position of every delimiter.
    ///
    /// Fails with [`BufferError::Overflow`] without writing anything if the
    /// bytes would not fit. Never blocks.
    pub fn extend(&self, bytes: &[u8]) -> Result<(), BufferError> {
        let frames_added = {
            let mut inner = self.lock();
            let size = inner.size();
            let capacity = inner.capacity();
            if size.saturating_add(bytes.len()) >= capacity {
                self.counters.overflows.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Rejecting {} bytes: {} of {} occupied",
                    bytes.len(),
                    size,
                    capacity
                );
                return Err(BufferError::Overflow {
                    requested: bytes.len(),
                    size,
                    capacity,
                });
            }

            let end = inner.end;
            let mut frames_added = 0;
            for (i, &byte) in bytes.iter().enumerate() {
                let pos = inner.wrap(end, i);
                inner.storage[pos] = byte;
                if byte == self.delimiter {
                    inner.boundaries.push_back(pos);
                    frames_added += 1;
                }
            }
            inner.end = inner.wrap(end, bytes.len());
            frames_added
        };

        self.counters
            .bytes_written
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);

        if frames_added > 0 {
            trace!("Queued {} frame(s)", frames_added);
            self.frame_ready.notify_one();
        }
        Ok(())
    }

    /// Block until a complete frame is available and return it without its delimiter.
    ///
    /// `None` waits indefinitely. With a timeout, fails with
    /// [`BufferError::Timeout`] and leaves the buffer untouched if no frame
    /// arrives in time.
    pub fn read(&self, timeout: Option<Duration>) -> Result<Vec<u8>, BufferError> {
        let guard = self.lock();
        let mut inner = match timeout {
            None => self
                .frame_ready
                .wait_while(guard, |inner| inner.boundaries.is_empty())
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                let (inner, result) = self
                    .frame_ready
                    .wait_timeout_while(guard, timeout, |inner| inner.boundaries.is_empty())
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() {
                    self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                    return Err(BufferError::Timeout(timeout));
                }
                inner
            }
        };

        match inner.pop_frame() {
            Some(frame) => {
                let more = !inner.boundaries.is_empty();
                drop(inner);
                self.finish_read(more);
                Ok(frame)
            }
            // The wait predicate guarantees a boundary is queued
            None => unreachable!("woke with an empty boundary queue"),
        }
    }

    /// [`read`](Self::read) with the configured timeout ([`DEFAULT_READ_TIMEOUT`] unless
    /// built with [`from_config`](Self::from_config))
    pub fn read_default(&self) -> Result<Vec<u8>, BufferError> {
        self.read(Some(self.read_timeout))
    }

    /// Pop a complete frame if one is queued, without waiting
    pub fn try_read(&self) -> Option<Vec<u8>> {
        let mut inner = self.lock();
        let frame = inner.pop_frame()?;
        let more = !inner.boundaries.is_empty();
        drop(inner);
        self.finish_read(more);
        Some(frame)
    }

    fn finish_read(&self, more: bool) {
        self.counters.frames_read.fetch_add(1, Ordering::Relaxed);
        // extend() wakes a single reader even when it queued several frames;
        // pass the wakeup on so other waiters are not left behind.
        if more {
            self.frame_ready.notify_one();
        }
    }

    /// Snapshot of activity counters
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            bytes_written: self.counters.bytes_written.load(Ordering::Relaxed),
            frames_read: self.counters.frames_read.load(Ordering::Relaxed),
            overflows: self.counters.overflows.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for FramedRingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("FramedRingBuffer")
            .field("capacity", &inner.capacity())
            .field("start", &inner.start)
            .field("end", &inner.end)
            .field("pending_frames", &inner.boundaries.len())
            .field("delimiter", &self.delimiter)
            .finish()
    }
}
