//! Fixed-capacity ring buffer for accumulating stream bytes.
//!
//! Storage is allocated once per capacity. Appends that do not fit are
//! rejected with [`StreamError::BufferOverflow`]; the buffer never grows
//! and never overwrites unread bytes.
//!
//! # Example
//!
//! ```
//! use streamframe::buffer::RingBuffer;
//!
//! let mut buffer = RingBuffer::new(8);
//! buffer.append(b"abcdef").unwrap();
//! assert_eq!(&buffer.read(4).unwrap()[..], b"abcd");
//!
//! // Wraps around the end of storage
//! buffer.append(b"ghij").unwrap();
//! assert_eq!(&buffer.peek(6)[..], b"efghij");
//! ```

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::Pattern;
use crate::error::{Result, StreamError};

/// Snapshot of buffer occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferStats {
    pub size: usize,
    pub capacity: usize,
    pub free_space: usize,
    pub utilization_percent: f64,
}

impl BufferStats {
    /// Derive free space and utilization from `size` bytes held of `capacity`.
    pub fn from_occupancy(size: usize, capacity: usize) -> Self {
        let utilization_percent = if capacity == 0 {
            0.0
        } else {
            size as f64 / capacity as f64 * 100.0
        };

        Self {
            size,
            capacity,
            free_space: capacity.saturating_sub(size),
            utilization_percent,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// Circular byte store with head/size bookkeeping.
pub struct RingBuffer {
    /// Backing storage; its length is the capacity.
    storage: Vec<u8>,
    /// Physical index of the first unread byte.
    head: usize,
    /// Number of unread bytes.
    size: usize,
}

impl RingBuffer {
    /// Create a buffer holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity],
            head: 0,
            size: 0,
        }
    }

    /// Maximum number of bytes the buffer can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of unread bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alias for [`size`](Self::size).
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn free_space(&self) -> usize {
        self.capacity() - self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    /// Copy `data` into the tail of the buffer.
    ///
    /// # Errors
    ///
    /// Returns `BufferOverflow` if `data` does not fit in the free space.
    /// Nothing is written in that case.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if data.len() > self.free_space() {
            return Err(StreamError::BufferOverflow {
                requested: data.len(),
                free: self.free_space(),
                capacity: self.capacity(),
            });
        }

        let capacity = self.capacity();
        let tail = (self.head + self.size) % capacity;
        let first = data.len().min(capacity - tail);

        self.storage[tail..tail + first].copy_from_slice(&data[..first]);
        if data.len() > first {
            self.storage[..data.len() - first].copy_from_slice(&data[first..]);
        }

        self.size += data.len();
        Ok(())
    }

    /// Consume and return exactly `n` bytes from the head.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` if fewer than `n` bytes are buffered.
    pub fn read(&mut self, n: usize) -> Result<Bytes> {
        if n > self.size {
            return Err(StreamError::InsufficientData {
                requested: n,
                available: self.size,
            });
        }
        let out = self.peek(n);
        self.advance(n);
        Ok(out)
    }

    /// Copy up to `n` bytes from the head without consuming them.
    pub fn peek(&self, n: usize) -> Bytes {
        self.peek_at(0, n)
    }

    /// Copy up to `n` bytes starting `offset` bytes after the head.
    pub fn peek_at(&self, offset: usize, n: usize) -> Bytes {
        if offset >= self.size {
            return Bytes::new();
        }
        let n = n.min(self.size - offset);
        let (front, back) = self.as_slices();

        let mut out = BytesMut::with_capacity(n);
        if offset < front.len() {
            let take = n.min(front.len() - offset);
            out.extend_from_slice(&front[offset..offset + take]);
            if take < n {
                out.extend_from_slice(&back[..n - take]);
            }
        } else {
            let start = offset - front.len();
            out.extend_from_slice(&back[start..start + n]);
        }
        out.freeze()
    }

    /// Drop `n` bytes from the head without copying them.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientData` if fewer than `n` bytes are buffered.
    pub fn discard(&mut self, n: usize) -> Result<()> {
        if n > self.size {
            return Err(StreamError::InsufficientData {
                requested: n,
                available: self.size,
            });
        }
        self.advance(n);
        Ok(())
    }

    fn advance(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.size -= n;
        if self.size == 0 {
            // Re-linearize for free whenever the buffer drains.
            self.head = 0;
        } else {
            self.head = (self.head + n) % self.capacity();
        }
    }

    /// Byte at logical `index` (0 = head), if buffered.
    pub fn at(&self, index: usize) -> Option<u8> {
        if index >= self.size {
            return None;
        }
        Some(self.storage[(self.head + index) % self.capacity()])
    }

    /// Buffered bytes as two slices in logical order (second may be empty).
    pub fn as_slices(&self) -> (&[u8], &[u8]) {
        if self.size == 0 {
            return (&[], &[]);
        }
        let end = self.head + self.size;
        if end <= self.capacity() {
            (&self.storage[self.head..end], &[])
        } else {
            (
                &self.storage[self.head..],
                &self.storage[..end - self.capacity()],
            )
        }
    }

    /// Offset of the first occurrence of `pattern`, relative to the head.
    pub fn find_pattern(&self, pattern: &Pattern) -> Option<usize> {
        self.find_pattern_from(pattern, 0)
    }

    /// Offset of the first occurrence of `pattern` starting at or after `pos`.
    ///
    /// Knuth-Morris-Pratt over the two storage slices; never re-reads a byte.
    pub fn find_pattern_from(&self, pattern: &Pattern, pos: usize) -> Option<usize> {
        let needle = pattern.as_bytes();
        if needle.is_empty() || pos >= self.size || self.size - pos < needle.len() {
            return None;
        }

        let failure = pattern.failure();
        let (front, back) = self.as_slices();
        let mut matched = 0;

        for (i, &byte) in front.iter().chain(back).enumerate().skip(pos) {
            while matched > 0 && byte != needle[matched] {
                matched = failure[matched - 1];
            }
            if byte == needle[matched] {
                matched += 1;
                if matched == needle.len() {
                    return Some(i + 1 - matched);
                }
            }
        }

        None
    }

    /// Offsets of every (possibly overlapping) occurrence of `pattern`.
    pub fn find_all(&self, pattern: &Pattern) -> Vec<usize> {
        let mut positions = Vec::new();
        let mut pos = 0;

        while let Some(found) = self.find_pattern_from(pattern, pos) {
            positions.push(found);
            pos = found + 1;
        }

        positions
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.head = 0;
        self.size = 0;
    }

    /// Resize storage, keeping unread bytes in order.
    ///
    /// # Errors
    ///
    /// Returns `CapacityTooSmall` if `capacity` is below the current size.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        if capacity < self.size {
            return Err(StreamError::CapacityTooSmall {
                requested: capacity,
                size: self.size,
            });
        }
        if capacity == self.capacity() {
            return Ok(());
        }

        let mut storage = vec![0u8; capacity];
        let (front, back) = self.as_slices();
        storage[..front.len()].copy_from_slice(front);
        storage[front.len()..front.len() + back.len()].copy_from_slice(back);

        self.storage = storage;
        self.head = 0;
        Ok(())
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> BufferStats {
        BufferStats::from_occupancy(self.size, self.capacity())
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("size", &self.size)
            .field("head", &self.head)
            .finish()
    }
}
