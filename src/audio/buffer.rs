//! Fixed-capacity circular (ring) buffer for PCM samples.
//!
//! Used as the jitter buffer between a hardware callback and the audio loop.
//! When the buffer is full, new samples **overwrite** the oldest data, so a
//! stalled reader loses stale audio rather than blocking the callback.
//!
//! # Example
//!
//! ```rust
//! use voice_device::audio::RingBuffer;
//!
//! let mut buf = RingBuffer::new(4);
//! buf.push_slice(&[1_i16, 2, 3, 4, 5]); // 5 items → capacity 4 → oldest dropped
//!
//! let mut out = [0_i16; 2];
//! assert_eq!(buf.pop_into(&mut out), 2);
//! assert_eq!(out, [2, 3]);
//! assert_eq!(buf.drain(), vec![4, 5]);
//! ```

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity FIFO over `T: Copy + Default`.
pub struct RingBuffer<T> {
    buf: Vec<T>,
    capacity: usize,
    /// Index of the *next* write position (wraps around `capacity`).
    write_pos: usize,
    /// Number of valid samples currently stored (≤ `capacity`).
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer with the given `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            buf: vec![T::default(); capacity],
            capacity,
            write_pos: 0,
            len: 0,
        }
    }

    /// Append `data`, overwriting the oldest samples on overflow.
    pub fn push_slice(&mut self, data: &[T]) {
        for &item in data {
            self.buf[self.write_pos] = item;
            self.write_pos = (self.write_pos + 1) % self.capacity;
            if self.len < self.capacity {
                self.len += 1;
            }
        }
    }

    fn read_pos(&self) -> usize {
        (self.write_pos + self.capacity - self.len) % self.capacity
    }

    /// Move up to `out.len()` of the oldest samples into `out`.  Returns how
    /// many were written; the rest of `out` is untouched.
    pub fn pop_into(&mut self, out: &mut [T]) -> usize {
        let n = out.len().min(self.len);
        let read_pos = self.read_pos();
        for (i, slot) in out.iter_mut().take(n).enumerate() {
            *slot = self.buf[(read_pos + i) % self.capacity];
        }
        self.len -= n;
        n
    }

    /// Drain all stored samples in chronological order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut result = vec![T::default(); self.len];
        self.pop_into(&mut result);
        self.clear();
        result
    }

    /// Discard all samples and reset the write position.
    pub fn clear(&mut self) {
        self.write_pos = 0;
        self.len = 0;
    }

    /// Number of valid samples currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Buffered duration in seconds, assuming `sample_rate` Hz mono.
    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.len as f32 / sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
