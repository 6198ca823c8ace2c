//! Free list of reusable outbound buffers.
//!
//! Buffers move by value: the pool hands one out with [`BufferPool::acquire`]
//! and takes it back with [`BufferPool::release`], so a buffer is owned by
//! exactly one of the pool, a producer, the outbound queue or the in-flight
//! write at any time. Steady-state allocation is bounded by the high-water
//! mark of buffers simultaneously outside the pool.

use bytes::BytesMut;

/// Snapshot of pool accounting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers currently in circulation, in or out of the pool.
    pub allocated: usize,
    /// Buffers sitting in the free list.
    pub available: usize,
}

impl PoolStats {
    /// Buffers held outside the pool.
    #[must_use]
    pub fn outstanding(&self) -> usize { self.allocated - self.available }
}

/// Reusable buffer free list with allocation accounting.
///
/// `available + outstanding == allocated` holds after every call. Buffers that
/// were not acquired from the pool are adopted on release.
#[derive(Debug)]
pub struct BufferPool {
    free: Vec<BytesMut>,
    buffer_capacity: usize,
    max_retained: Option<usize>,
    allocated: usize,
}

impl BufferPool {
    /// Create an empty pool whose fresh buffers have `buffer_capacity` bytes
    /// of capacity.
    #[must_use]
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            buffer_capacity,
            max_retained: None,
            allocated: 0,
        }
    }

    /// Cap the number of idle buffers kept; extra releases are dropped.
    #[must_use]
    pub fn with_max_retained(mut self, max_retained: Option<usize>) -> Self {
        self.max_retained = max_retained;
        self
    }

    /// Take a buffer from the free list, allocating only when it is empty.
    pub fn acquire(&mut self) -> BytesMut {
        if let Some(buf) = self.free.pop() {
            return buf;
        }
        self.allocated += 1;
        BytesMut::with_capacity(self.buffer_capacity)
    }

    /// Clear `buf`, keeping its capacity, and return it to the free list.
    pub fn release(&mut self, mut buf: BytesMut) {
        if self.outstanding() == 0 {
            self.allocated += 1;
        }
        if self.max_retained.is_some_and(|max| self.free.len() >= max) {
            self.allocated -= 1;
            return;
        }
        buf.clear();
        self.free.push(buf);
    }

    fn outstanding(&self) -> usize { self.allocated - self.free.len() }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.allocated,
            available: self.free.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;
    use rstest::rstest;

    use super::*;

    #[test]
    fn acquire_allocates_only_when_empty() {
        let mut pool = BufferPool::new(64);
        let buf = pool.acquire();
        assert!(buf.capacity() >= 64);
        pool.release(buf);
        let _again = pool.acquire();
        assert_eq!(pool.stats().allocated, 1);
    }

    #[test]
    fn release_clears_but_keeps_capacity() {
        let mut pool = BufferPool::new(8);
        let mut buf = pool.acquire();
        buf.put_slice(&[7u8; 512]);
        let capacity = buf.capacity();
        pool.release(buf);
        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), capacity);
    }

    #[rstest]
    #[case(1)]
    #[case(5)]
    #[case(32)]
    fn cycles_conserve_buffers(#[case] cycles: usize) {
        let mut pool = BufferPool::new(16);
        let held: Vec<_> = (0..3).map(|_| pool.acquire()).collect();
        for buf in held {
            pool.release(buf);
        }
        for _ in 0..cycles {
            let buf = pool.acquire();
            pool.release(buf);
        }
        assert_eq!(
            pool.stats(),
            PoolStats {
                allocated: 3,
                available: 3,
            }
        );
    }

    #[test]
    fn foreign_buffers_are_adopted() {
        let mut pool = BufferPool::new(16);
        pool.release(BytesMut::from(&b"outsider"[..]));
        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn retention_cap_drops_surplus() {
        let mut pool = BufferPool::new(16).with_max_retained(Some(1));
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(
            pool.stats(),
            PoolStats {
                allocated: 1,
                available: 1,
            }
        );
    }
}
