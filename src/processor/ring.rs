//! Bounded byte buffer sitting between the reader/writer callbacks and the
//! I/O adapters (spec.md §3 `ring_buffer`).

/// A simple growable byte queue. Not actually ring-backed (a `Vec` with a
/// drain-from-front is plenty for the volumes a single split moves), but
/// keeps the ring buffer's contract: bounded by `capacity`, FIFO.
#[derive(Debug, Default)]
pub struct RingBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl RingBuffer {
    /// Build an empty buffer with room for `capacity` bytes before `push`
    /// should back off.
    pub fn with_capacity(capacity: usize) -> Self {
        RingBuffer {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Bytes currently queued.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Room left before `capacity` is reached.
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    /// Append bytes, growing past `capacity` only if the caller ignores
    /// [`RingBuffer::available`] (never happens on the write path, which
    /// always checks first).
    pub fn push(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Remove and return up to `n` bytes from the front.
    pub fn take(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.data.len());
        self.data.drain(..n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_take_is_fifo() {
        let mut rb = RingBuffer::with_capacity(16);
        rb.push(b"abc");
        rb.push(b"def");
        assert_eq!(rb.len(), 6);
        assert_eq!(rb.take(4), b"abcd");
        assert_eq!(rb.take(10), b"ef");
        assert!(rb.is_empty());
    }

    #[test]
    fn available_reflects_capacity() {
        let mut rb = RingBuffer::with_capacity(8);
        rb.push(b"12345");
        assert_eq!(rb.available(), 3);
    }
}
