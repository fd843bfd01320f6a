//! Fixed-capacity circular byte queue
//!
//! Pure data structure with no locking of its own. Every call must happen
//! under the buffer-lock of the direction that owns the ring.
//!
//! Writes and reads are all-or-nothing: a request that does not fit is
//! rejected and leaves the ring untouched.

use crate::error::{Result, UartError};

/// Single-producer/single-consumer byte ring
pub struct RingBuffer {
    storage: Box<[u8]>,
    /// Occupied bytes, `0..=capacity`
    used: usize,
    /// Next slot to write, `0..capacity`
    write_idx: usize,
    /// Oldest unread byte, meaningful only while `used > 0`
    read_idx: usize,
}

impl RingBuffer {
    /// Create a ring holding up to `capacity` bytes
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 1 {
            return Err(UartError::InvalidArgument {
                reason: "ring capacity must be at least 1",
            });
        }

        Ok(Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            used: 0,
            write_idx: 0,
            read_idx: 0,
        })
    }

    /// Total capacity in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes that can still be written
    #[inline]
    pub fn available_free(&self) -> usize {
        self.capacity() - self.used
    }

    /// Bytes waiting to be read
    #[inline]
    pub fn available_used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Append all of `data`, or nothing
    ///
    /// Returns the number of bytes written, always `data.len()`.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Err(UartError::InvalidArgument {
                reason: "nothing to write",
            });
        }
        let free = self.available_free();
        if data.len() > free {
            return Err(UartError::BufferFull {
                requested: data.len(),
                free,
            });
        }

        if self.used == 0 {
            // First byte of this write becomes the oldest unread byte
            self.read_idx = self.write_idx;
        }

        let cap = self.capacity();
        let first = data.len().min(cap - self.write_idx);
        self.storage[self.write_idx..self.write_idx + first].copy_from_slice(&data[..first]);
        self.storage[..data.len() - first].copy_from_slice(&data[first..]);

        self.write_idx = (self.write_idx + data.len()) % cap;
        self.used += data.len();
        Ok(data.len())
    }

    /// Remove exactly `out.len()` bytes in FIFO order, or nothing
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        let n = self.peek(out)?;
        self.consume(n);
        Ok(n)
    }

    /// Copy exactly `out.len()` bytes in FIFO order without removing them
    pub fn peek(&self, out: &mut [u8]) -> Result<usize> {
        if out.len() > self.used {
            return Err(UartError::OutOfRange {
                requested: out.len(),
                available: self.used,
            });
        }

        let cap = self.capacity();
        let first = out.len().min(cap - self.read_idx);
        let second = out.len() - first;
        out[..first].copy_from_slice(&self.storage[self.read_idx..self.read_idx + first]);
        out[first..].copy_from_slice(&self.storage[..second]);
        Ok(out.len())
    }

    /// Drop the `n` oldest bytes
    pub fn discard(&mut self, n: usize) -> Result<()> {
        if n > self.used {
            return Err(UartError::OutOfRange {
                requested: n,
                available: self.used,
            });
        }
        self.consume(n);
        Ok(())
    }

    fn consume(&mut self, n: usize) {
        self.read_idx = (self.read_idx + n) % self.capacity();
        self.used -= n;
    }

    /// Drop every queued byte
    pub fn clear(&mut self) {
        self.used = 0;
        self.read_idx = self.write_idx;
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("used", &self.used)
            .field("write_idx", &self.write_idx)
            .field("read_idx", &self.read_idx)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(ring: &mut RingBuffer) -> Vec<u8> {
        let mut out = vec![0u8; ring.available_used()];
        ring.read(&mut out).unwrap();
        out
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            RingBuffer::new(0),
            Err(UartError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_empty_write_rejected() {
        let mut ring = RingBuffer::new(4).unwrap();
        assert!(matches!(
            ring.write(&[]),
            Err(UartError::InvalidArgument { .. })
        ));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let mut ring = RingBuffer::new(8).unwrap();
        assert_eq!(ring.write(b"hello").unwrap(), 5);
        assert_eq!(ring.available_used(), 5);
        assert_eq!(ring.available_free(), 3);

        let mut out = [0u8; 3];
        ring.read(&mut out).unwrap();
        assert_eq!(&out, b"hel");
        assert_eq!(drain(&mut ring), b"lo");
        assert!(ring.is_empty());
    }

    #[test]
    fn test_write_too_large_leaves_ring_untouched() {
        let mut ring = RingBuffer::new(6).unwrap();
        ring.write(b"abcd").unwrap();

        let err = ring.write(b"xyz").unwrap_err();
        assert!(matches!(
            err,
            UartError::BufferFull {
                requested: 3,
                free: 2
            }
        ));
        assert_eq!(ring.available_used(), 4);
        assert_eq!(drain(&mut ring), b"abcd");
    }

    #[test]
    fn test_read_too_large_leaves_ring_untouched() {
        let mut ring = RingBuffer::new(6).unwrap();
        ring.write(b"ab").unwrap();

        let mut out = [0u8; 3];
        assert!(matches!(
            ring.read(&mut out),
            Err(UartError::OutOfRange {
                requested: 3,
                available: 2
            })
        ));
        assert_eq!(drain(&mut ring), b"ab");
    }

    #[test]
    fn test_wraparound_cycles() {
        let mut ring = RingBuffer::new(16).unwrap();
        for cycle in 0..5u8 {
            let chunk: Vec<u8> = (0..10).map(|i| cycle * 10 + i).collect();
            ring.write(&chunk).unwrap();
            assert_eq!(ring.available_used(), 10);

            let mut out = [0u8; 10];
            ring.read(&mut out).unwrap();
            assert_eq!(out.as_slice(), chunk.as_slice());
            assert!(ring.is_empty());
        }
        // 50 bytes through a 16 byte ring: cursors wrapped three times
        assert_eq!(ring.write_idx, 50 % 16);
    }

    #[test]
    fn test_fill_to_capacity_across_boundary() {
        let mut ring = RingBuffer::new(5).unwrap();
        ring.write(b"123").unwrap();
        drain(&mut ring);

        ring.write(b"abcde").unwrap();
        assert_eq!(ring.available_free(), 0);
        assert_eq!(drain(&mut ring), b"abcde");
    }

    #[test]
    fn test_peek_and_discard() {
        let mut ring = RingBuffer::new(8).unwrap();
        ring.write(b"abcdef").unwrap();

        let mut out = [0u8; 4];
        ring.peek(&mut out).unwrap();
        assert_eq!(&out, b"abcd");
        assert_eq!(ring.available_used(), 6);

        ring.discard(2).unwrap();
        assert!(ring.discard(5).is_err());
        assert_eq!(drain(&mut ring), b"cdef");
    }

    #[derive(Debug, Clone)]
    enum Op {
        Write(Vec<u8>),
        Read(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            proptest::collection::vec(any::<u8>(), 0..24).prop_map(Op::Write),
            (0usize..24).prop_map(Op::Read),
        ]
    }

    proptest! {
        #[test]
        fn prop_matches_fifo_model(
            capacity in 1usize..32,
            ops in proptest::collection::vec(op(), 0..64),
        ) {
            let mut ring = RingBuffer::new(capacity).unwrap();
            let mut model = std::collections::VecDeque::new();

            for op in ops {
                match op {
                    Op::Write(data) => {
                        let fits = !data.is_empty() && data.len() <= capacity - model.len();
                        let result = ring.write(&data);
                        prop_assert_eq!(result.is_ok(), fits);
                        if fits {
                            model.extend(data);
                        }
                    }
                    Op::Read(n) => {
                        let mut out = vec![0u8; n];
                        let result = ring.read(&mut out);
                        prop_assert_eq!(result.is_ok(), n <= model.len());
                        if n <= model.len() {
                            let expected: Vec<u8> = model.drain(..n).collect();
                            prop_assert_eq!(out, expected);
                        }
                    }
                }
                prop_assert!(ring.available_used() <= capacity);
                prop_assert_eq!(ring.available_used(), model.len());
                prop_assert_eq!(ring.available_free(), capacity - model.len());
            }
        }

        #[test]
        fn prop_round_trip(data in proptest::collection::vec(any::<u8>(), 1..64), offset in 0usize..64) {
            let capacity = 64;
            let mut ring = RingBuffer::new(capacity).unwrap();
            // Shift the cursors so the payload may straddle the end of storage
            if offset > 0 {
                ring.write(&vec![0u8; offset]).unwrap();
                ring.discard(offset).unwrap();
            }
            ring.write(&data).unwrap();
            let mut out = vec![0u8; data.len()];
            ring.read(&mut out).unwrap();
            prop_assert_eq!(out, data);
        }
    }
}
