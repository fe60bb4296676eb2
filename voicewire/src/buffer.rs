//! Byte queue connecting the network-receive and audio-output timelines.
//!
//! [`FrameRingBuffer`] is a growable FIFO of PCM bytes. Producers append
//! without ever blocking; the single consumer blocks on a condition variable
//! until bytes are available and then takes a prefix. The buffer is a pure
//! byte stream: frame boundaries are not preserved, so a sink that needs a
//! fixed-size block may have to read more than once.
//!
//! ```rust,ignore
//! let buffer = Arc::new(FrameRingBuffer::new());
//! buffer.write(&pcm_bytes);
//! let chunk = buffer.read(1920); // 1..=1920 bytes
//! ```

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

/// Bytes in one PCM16 sample; the drop-oldest limit never splits one.
const SAMPLE_BYTES: usize = 2;

#[derive(Debug, Default)]
struct State {
    data: VecDeque<u8>,
    /// Maximum bytes held before the oldest are discarded. `None` never drops.
    limit: Option<usize>,
    dropped: u64,
}

/// Thread-safe byte queue with blocking read and non-blocking write.
#[derive(Debug, Default)]
pub struct FrameRingBuffer {
    state: Mutex<State>,
    readable: Condvar,
}

impl FrameRingBuffer {
    /// Create an unbounded buffer. Writes never drop data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer that keeps at most `limit` bytes, discarding the oldest
    /// bytes when a write would exceed it.
    ///
    /// The limit is rounded down to whole 16-bit samples and bytes are always
    /// discarded in sample pairs, so surviving PCM stays aligned.
    pub fn with_limit(limit: usize) -> Self {
        let limit = (limit - limit % SAMPLE_BYTES).max(SAMPLE_BYTES);
        Self {
            state: Mutex::new(State { limit: Some(limit), ..State::default() }),
            readable: Condvar::new(),
        }
    }

    /// Append bytes to the tail and wake one blocked reader.
    pub fn write(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut state = self.state.lock();
        state.data.extend(bytes);
        if let Some(limit) = state.limit {
            let excess = state.data.len().saturating_sub(limit).next_multiple_of(SAMPLE_BYTES);
            if excess > 0 {
                state.data.drain(..excess);
                state.dropped += excess as u64;
            }
        }
        self.readable.notify_one();
    }

    /// Remove and return up to `max_len` bytes, blocking until at least one is available.
    ///
    /// Returns an empty `Bytes` only when `max_len` is zero.
    pub fn read(&self, max_len: usize) -> Bytes {
        if max_len == 0 {
            return Bytes::new();
        }
        let mut state = self.state.lock();
        while state.data.is_empty() {
            self.readable.wait(&mut state);
        }
        take_prefix(&mut state.data, max_len)
    }

    /// Like [`read`](Self::read), but gives up after `timeout` with `None`.
    pub fn read_timeout(&self, max_len: usize, timeout: Duration) -> Option<Bytes> {
        if max_len == 0 {
            return Some(Bytes::new());
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.data.is_empty() {
            if self.readable.wait_until(&mut state, deadline).timed_out() && state.data.is_empty()
            {
                return None;
            }
        }
        Some(take_prefix(&mut state.data, max_len))
    }

    /// Take up to `max_len` bytes if any are buffered, without waiting.
    pub fn try_read(&self, max_len: usize) -> Option<Bytes> {
        let mut state = self.state.lock();
        if state.data.is_empty() || max_len == 0 {
            return None;
        }
        Some(take_prefix(&mut state.data, max_len))
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.state.lock().data.len()
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.state.lock().data.is_empty()
    }

    /// Total bytes discarded by the size limit since creation.
    pub fn dropped_bytes(&self) -> u64 {
        self.state.lock().dropped
    }

    /// Get a [`std::io::Read`] handle over this buffer.
    pub fn reader(self: &Arc<Self>) -> RingBufferReader {
        RingBufferReader { buffer: Arc::clone(self) }
    }
}

fn take_prefix(data: &mut VecDeque<u8>, max_len: usize) -> Bytes {
    let n = max_len.min(data.len());
    data.drain(..n).collect::<Vec<u8>>().into()
}

/// Blocking reader over a shared [`FrameRingBuffer`].
///
/// Follows the partial-read contract of [`std::io::Read`]: each call blocks
/// until data is available and fills as much of `buf` as is buffered.
#[derive(Debug, Clone)]
pub struct RingBufferReader {
    buffer: Arc<FrameRingBuffer>,
}

impl RingBufferReader {
    /// The underlying buffer.
    pub fn buffer(&self) -> &Arc<FrameRingBuffer> {
        &self.buffer
    }
}

impl io::Read for RingBufferReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let chunk = self.buffer.read(buf.len());
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::thread;

    #[test]
    fn test_read_returns_prefix_in_order() {
        let buffer = FrameRingBuffer::new();
        buffer.write(&[1, 2, 3]);
        buffer.write(&[4, 5]);

        assert_eq!(&buffer.read(2)[..], &[1, 2]);
        assert_eq!(&buffer.read(10)[..], &[3, 4, 5]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_empty_write_is_ignored() {
        let buffer = FrameRingBuffer::new();
        buffer.write(&[]);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.try_read(4).is_none());
    }

    #[test]
    fn test_zero_length_read_does_not_block() {
        let buffer = FrameRingBuffer::new();
        assert!(buffer.read(0).is_empty());
    }

    #[test]
    fn test_read_blocks_until_write() {
        let buffer = Arc::new(FrameRingBuffer::new());
        let reader = Arc::clone(&buffer);
        let handle = thread::spawn(move || reader.read(16));

        thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());

        buffer.write(&[9, 9, 9]);
        let chunk = handle.join().unwrap();
        assert_eq!(&chunk[..], &[9, 9, 9]);
    }

    #[test]
    fn test_read_timeout_expires_on_empty_buffer() {
        let buffer = FrameRingBuffer::new();
        assert!(buffer.read_timeout(8, Duration::from_millis(20)).is_none());

        buffer.write(&[7]);
        assert_eq!(&buffer.read_timeout(8, Duration::from_millis(20)).unwrap()[..], &[7]);
    }

    #[test]
    fn test_limit_drops_oldest_bytes() {
        let buffer = FrameRingBuffer::with_limit(4);
        buffer.write(&[1, 2, 3]);
        buffer.write(&[4, 5, 6]);

        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.dropped_bytes(), 2);
        assert_eq!(&buffer.read(8)[..], &[3, 4, 5, 6]);
    }

    #[test]
    fn test_odd_limit_keeps_samples_aligned() {
        let buffer = FrameRingBuffer::with_limit(5);
        buffer.write(&crate::audio::pcm16_to_le_bytes(&[300, 300, 300]));

        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.dropped_bytes(), 2);
        let kept = crate::audio::le_bytes_to_pcm16(&buffer.read(16)).unwrap();
        assert_eq!(kept, vec![300, 300]);
    }

    #[test]
    fn test_odd_write_overflow_drops_whole_sample() {
        let buffer = FrameRingBuffer::with_limit(4);
        buffer.write(&[1, 2, 3, 4, 5]);

        assert_eq!(buffer.dropped_bytes(), 2);
        assert_eq!(&buffer.read(8)[..], &[3, 4, 5]);
    }

    #[test]
    fn test_unbounded_buffer_never_drops() {
        let buffer = FrameRingBuffer::new();
        for _ in 0..1000 {
            buffer.write(&[0u8; 1920]);
        }
        assert_eq!(buffer.len(), 1_920_000);
        assert_eq!(buffer.dropped_bytes(), 0);
    }

    #[test]
    fn test_io_reader_partial_read() {
        let buffer = Arc::new(FrameRingBuffer::new());
        buffer.write(&[1, 2, 3]);

        let mut reader = buffer.reader();
        let mut out = [0u8; 8];
        let n = reader.read(&mut out).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&out[..n], &[1, 2, 3]);
    }
}
